use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Session unavailable: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
