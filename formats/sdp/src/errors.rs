use thiserror::Error;

#[derive(Debug, Error)]
pub enum SDPError {
    #[error("not a session description line: {0}")]
    InvalidLine(String),
    #[error("missing protocol version line")]
    MissingVersion,
    #[error("invalid protocol version: {0}")]
    InvalidVersion(String),
    #[error("missing origin line")]
    MissingOrigin,
    #[error("missing session name line")]
    MissingSessionName,
}

pub type SDPResult<T> = Result<T, SDPError>;
