use rtsp_formats::errors::RtspMessageError;
use sdp_formats::errors::SDPError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtspSessionError {
    #[error("host resolution failed: {0}")]
    Resolve(String),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("rtsp message error: {0}")]
    Parse(RtspMessageError),
    #[error("session description error: {0}")]
    Sdp(#[from] SDPError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("session expired")]
    SessionExpired,
    #[error("operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
    #[error("peer closed the session")]
    PeerClosed,
}

impl From<RtspMessageError> for RtspSessionError {
    fn from(err: RtspMessageError) -> Self {
        match err {
            RtspMessageError::Io(err) => Self::Transport(err),
            err => Self::Parse(err),
        }
    }
}

impl From<unified_io::UnifiedIOError> for RtspSessionError {
    fn from(err: unified_io::UnifiedIOError) -> Self {
        match err {
            unified_io::UnifiedIOError::Io(err) => Self::Transport(err),
        }
    }
}

impl From<url::ParseError> for RtspSessionError {
    fn from(err: url::ParseError) -> Self {
        Self::Parse(RtspMessageError::InvalidUrl(err))
    }
}

pub type RtspSessionResult<T> = Result<T, RtspSessionError>;
