use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteUiError {
    #[error("failed to start browser session: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element interaction failed: {0}")]
    Interaction(String),

    #[error("unknown element handle {0}")]
    StaleElement(u64),

    #[error("browser session is closed")]
    SessionClosed,
}
