// CTFtime infra layer.
// - `ctftime_client.rs` talks to the CTFtime HTTP API.

#[path = "ctftime_client.rs"]
pub mod ctftime_client;
