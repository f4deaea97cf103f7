pub mod auth;
pub mod header_names;
pub mod rtp_info;
pub mod session;
pub mod transport;
use std::{
    fmt,
    io::{self, Read},
};

use rtp_info::RtpInfo;
use session::SessionHeader;
use tokio_util::bytes::Buf;
use transport::TransportHeader;
use utils::traits::reader::{ReadFrom, TryReadFrom};

use crate::{
    consts::{common::CRLF_STR, methods::RtspMethod},
    errors::RtspMessageError,
    time::TimeRange,
    util::TextReader,
};

/// Header names from RFC 2326 Table 12 plus a passthrough for everything
/// else. Comparison is case-insensitive, the canonical spelling is kept for
/// emission.
#[derive(Debug, Clone)]
pub enum RtspHeader {
    Accept,
    AcceptEncoding,
    AcceptLanguage,
    AcceptRanges,
    Allow,
    Authorization,

    Bandwidth,
    Blocksize,

    CacheControl,
    Conference,
    Connection,
    ContentBase,
    ContentEncoding,
    ContentLanguage,
    ContentLength,
    ContentLocation,
    ContentType,
    CSeq,

    Date,

    Expires,

    From,

    IfModifiedSince,

    LastModified,
    Location,

    ProxyAuthenticate,
    ProxyRequire,
    Public,

    Range,
    Referrer,
    Require,
    RetryAfter,
    RtpInfo,

    Scale,
    Server,
    Session,
    Speed,

    Timestamp,
    Transport,

    Unsupported,
    UserAgent,

    Via,

    WWWAuthenticate,

    Other(String),
}

impl RtspHeader {
    pub fn as_str(&self) -> &str {
        match self {
            RtspHeader::Accept => header_names::ACCEPT,
            RtspHeader::AcceptEncoding => header_names::ACCEPT_ENCODING,
            RtspHeader::AcceptLanguage => header_names::ACCEPT_LANGUAGE,
            RtspHeader::AcceptRanges => header_names::ACCEPT_RANGES,
            RtspHeader::Allow => header_names::ALLOW,
            RtspHeader::Authorization => header_names::AUTHORIZATION,

            RtspHeader::Bandwidth => header_names::BANDWIDTH,
            RtspHeader::Blocksize => header_names::BLOCKSIZE,

            RtspHeader::CacheControl => header_names::CACHE_CONTROL,
            RtspHeader::Conference => header_names::CONFERENCE,
            RtspHeader::Connection => header_names::CONNECTION,
            RtspHeader::ContentBase => header_names::CONTENT_BASE,
            RtspHeader::ContentEncoding => header_names::CONTENT_ENCODING,
            RtspHeader::ContentLanguage => header_names::CONTENT_LANGUAGE,
            RtspHeader::ContentLength => header_names::CONTENT_LENGTH,
            RtspHeader::ContentLocation => header_names::CONTENT_LOCATION,
            RtspHeader::ContentType => header_names::CONTENT_TYPE,
            RtspHeader::CSeq => header_names::C_SEQ,

            RtspHeader::Date => header_names::DATE,

            RtspHeader::Expires => header_names::EXPIRES,

            RtspHeader::From => header_names::FROM,

            RtspHeader::IfModifiedSince => header_names::IF_MODIFIED_SINCE,

            RtspHeader::LastModified => header_names::LAST_MODIFIED,
            RtspHeader::Location => header_names::LOCATION,

            RtspHeader::ProxyAuthenticate => header_names::PROXY_AUTHENTICATE,
            RtspHeader::ProxyRequire => header_names::PROXY_REQUIRE,
            RtspHeader::Public => header_names::PUBLIC,

            RtspHeader::Range => header_names::RANGE,
            RtspHeader::Referrer => header_names::REFERRER,
            RtspHeader::Require => header_names::REQUIRE,
            RtspHeader::RetryAfter => header_names::RETRY_AFTER,
            RtspHeader::RtpInfo => header_names::RTP_INFO,

            RtspHeader::Scale => header_names::SCALE,
            RtspHeader::Server => header_names::SERVER,
            RtspHeader::Session => header_names::SESSION,
            RtspHeader::Speed => header_names::SPEED,

            RtspHeader::Timestamp => header_names::TIMESTAMP,
            RtspHeader::Transport => header_names::TRANSPORT,

            RtspHeader::Unsupported => header_names::UNSUPPORTED,
            RtspHeader::UserAgent => header_names::USER_AGENT,

            RtspHeader::Via => header_names::VIA,

            RtspHeader::WWWAuthenticate => header_names::WWW_AUTHENTICATE,

            RtspHeader::Other(name) => name.as_str(),
        }
    }
}

impl PartialEq for RtspHeader {
    fn eq(&self, other: &Self) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl Eq for RtspHeader {}

impl fmt::Display for RtspHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RtspHeader {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Self::Accept,
            "accept-encoding" => Self::AcceptEncoding,
            "accept-language" => Self::AcceptLanguage,
            "accept-ranges" => Self::AcceptRanges,
            "allow" => Self::Allow,
            "authorization" => Self::Authorization,

            "bandwidth" => Self::Bandwidth,
            "blocksize" => Self::Blocksize,

            "cache-control" => Self::CacheControl,
            "conference" => Self::Conference,
            "connection" => Self::Connection,
            "content-base" => Self::ContentBase,
            "content-encoding" => Self::ContentEncoding,
            "content-language" => Self::ContentLanguage,
            "content-length" => Self::ContentLength,
            "content-location" => Self::ContentLocation,
            "content-type" => Self::ContentType,
            "cseq" => Self::CSeq,

            "date" => Self::Date,

            "expires" => Self::Expires,

            "from" => Self::From,

            "if-modified-since" => Self::IfModifiedSince,

            "last-modified" => Self::LastModified,
            "location" => Self::Location,

            "proxy-authenticate" => Self::ProxyAuthenticate,
            "proxy-require" => Self::ProxyRequire,
            "public" => Self::Public,

            "range" => Self::Range,
            "referer" => Self::Referrer,
            "require" => Self::Require,
            "retry-after" => Self::RetryAfter,
            "rtp-info" => Self::RtpInfo,

            "scale" => Self::Scale,
            "server" => Self::Server,
            "session" => Self::Session,
            "speed" => Self::Speed,

            "timestamp" => Self::Timestamp,
            "transport" => Self::Transport,

            "unsupported" => Self::Unsupported,
            "user-agent" => Self::UserAgent,

            "via" => Self::Via,

            "www-authenticate" => Self::WWWAuthenticate,

            _ => Self::Other(s.to_owned()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RtspHeaders(Vec<(RtspHeader, String)>);

impl RtspHeaders {
    pub fn new(items: Vec<(RtspHeader, String)>) -> Self {
        Self(items)
    }

    pub fn push<S: Into<String>>(&mut self, key: RtspHeader, value: S) {
        self.0.push((key, value.into()));
    }

    pub fn append(&mut self, mut items: Vec<(RtspHeader, String)>) {
        self.0.append(&mut items);
    }

    pub fn get(&self, key: RtspHeader) -> Vec<&String> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq(&key))
            .map(|(_, value)| value)
            .collect()
    }

    pub fn get_unique(&self, key: RtspHeader) -> Option<&String> {
        self.get(key).first().copied()
    }

    pub fn contains(&self, key: RtspHeader) -> bool {
        self.0.iter().any(|(k, _)| k.eq(&key))
    }

    pub fn remove(&mut self, key: RtspHeader) {
        self.0.retain(|(k, _)| k.ne(&key));
    }

    pub fn entries(&self) -> &Vec<(RtspHeader, String)> {
        &self.0
    }

    pub fn set<S: Into<String>>(&mut self, key: RtspHeader, value: S) {
        self.remove(key.clone());
        self.push(key, value.into());
    }

    pub fn cseq(&self) -> Option<u32> {
        self.get_unique(RtspHeader::CSeq)
            .and_then(|cseq| cseq.trim().parse().ok())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_unique(RtspHeader::ContentLength)
            .and_then(|len| len.trim().parse().ok())
    }

    pub fn transport(&self) -> Option<TransportHeader> {
        self.get_unique(RtspHeader::Transport)
            .and_then(|trans| trans.parse().ok())
    }

    pub fn session(&self) -> Option<SessionHeader> {
        self.get_unique(RtspHeader::Session)
            .and_then(|session| session.parse().ok())
    }

    pub fn rtp_info(&self) -> Option<RtpInfo> {
        self.get_unique(RtspHeader::RtpInfo)
            .and_then(|info| info.parse().ok())
    }

    pub fn range(&self) -> Option<TimeRange> {
        self.get_unique(RtspHeader::Range)
            .and_then(|range| range.parse().ok())
    }

    /// Methods advertised in a `Public` header.
    pub fn public(&self) -> Vec<RtspMethod> {
        self.get_unique(RtspHeader::Public)
            .map(|methods| {
                methods
                    .split(',')
                    .filter_map(|method| method.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for RtspHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entries().iter().try_for_each(|(key, value)| {
            f.write_fmt(format_args!("{}: {}{}", key, value, CRLF_STR))
        })
    }
}

impl<R: io::BufRead> ReadFrom<R> for RtspHeaders {
    type Error = RtspMessageError;
    fn read_from(mut reader: R) -> Result<Self, Self::Error> {
        let buffer = reader.fill_buf()?.to_vec();
        let mut cursor = io::Cursor::new(&buffer);
        if let Some(headers) = Self::try_read_from(cursor.by_ref())? {
            reader.consume(cursor.position() as usize);
            return Ok(headers);
        }
        Err(RtspMessageError::InvalidRtspMessageFormat(format!(
            "the message is incomplete: {}",
            String::from_utf8_lossy(&buffer),
        )))
    }
}

impl<R: AsRef<[u8]>> TryReadFrom<R> for RtspHeaders {
    type Error = RtspMessageError;
    fn try_read_from(reader: &mut io::Cursor<R>) -> Result<Option<Self>, Self::Error> {
        if !reader.has_remaining() {
            return Ok(None);
        }
        let mut text_reader = TextReader::new(reader.by_ref());
        let mut headers = vec![];
        loop {
            let line = text_reader.try_read_line()?;
            let Some(line) = line else {
                // at least the terminating CRLF should be there
                return Ok(None);
            };

            let trimmed_line = line.trim();
            if trimmed_line.is_empty() {
                break;
            }
            let Some((key, value)) = trimmed_line.split_once(':') else {
                return Err(RtspMessageError::InvalidRtspMessageFormat(format!(
                    "invalid header line: {}",
                    line
                )));
            };

            headers.push((RtspHeader::from(key.trim()), value.trim().to_owned()));
        }

        Ok(Some(Self(headers)))
    }
}
