use std::io;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RtspMessageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("format error: {0}")]
    FormatError(#[from] std::fmt::Error),
    #[error("Unknown method: {0:?}")]
    UnknownMethod(Option<String>),
    #[error("Unknown uri: {0:?}")]
    UnknownUri(Option<Url>),
    #[error("Unknown status code: {0:?}")]
    UnknownStatusCode(Option<u16>),
    #[error("Unknown rtsp version: {0:?}")]
    UnknownRtspVersion(Option<String>),
    #[error("Missing Content-Type header for a message with a body")]
    MissingContentType,
    #[error("Bad start line: {0}")]
    BadStartLine(String),
    #[error("Invalid message format: {0}")]
    InvalidRtspMessageFormat(String),
    #[error("Message exceeds the configured limit: {0} bytes")]
    MessageTooLarge(usize),
    #[error("Invalid Url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid interleaved $ sign: {0}")]
    InvalidInterleavedSign(u8),
    #[error("Invalid interleaved data length: {0}")]
    InvalidInterleavedDataLength(usize),
    #[error("Invalid NPT value: {0}")]
    InvalidNpt(String),
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
    #[error("Invalid transport header: {0}")]
    InvalidTransportHeader(String),
    #[error("Invalid session header: {0}")]
    InvalidSessionHeader(String),
    #[error("Invalid RTP-Info header: {0}")]
    InvalidRtpInfoHeader(String),
    #[error("Invalid authentication header: {0}")]
    InvalidAuthHeader(String),
}

pub type RtspMessageResult<T> = Result<T, RtspMessageError>;
