// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "embeds.rs"]
pub mod embeds;

#[path = "reactions.rs"]
pub mod reactions;

// Re-export command types for convenience
pub use commands::ctf::{Data, Error};
