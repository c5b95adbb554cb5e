pub mod ctf_models;
pub mod ctf_service;
pub mod ctf_store;

pub use ctf_models::{BoardItem, ChallengeBoard, GlobalData, ServerData, Workspace};
pub use ctf_service::{validate_name, CtfError, CtfService};
pub use ctf_store::{StateStore, StoreError};
