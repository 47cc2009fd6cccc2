use thiserror::Error;

#[derive(Error, Debug)]
pub enum StormcheckError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation conflict: a {0} run is already in progress")]
    OperationInProgress(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
