pub mod action;
pub mod config;
pub mod errors;
mod handlers;
pub mod ipc;
pub mod protocols;
pub mod state;
pub mod toplevel;

pub use errors::{Result, ShellError};
pub use state::Shell;
