use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to connect to the compositor: {0}")]
    Connect(String),

    #[error("required global unavailable: {0}")]
    Global(String),

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("ipc error: {0}")]
    Ipc(String),

    #[error("toplevel handle {0} is already registered")]
    DuplicateHandle(String),

    #[error("no wl_seat bound; cannot activate toplevels")]
    MissingSeat,
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;
