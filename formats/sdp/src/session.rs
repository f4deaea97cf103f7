//! @see: RFC 8866 SDP: Session Description Protocol
//!
//! Deliberately shallow model: the session engine only ever reads the
//! version, origin, session name, and per-media protocol/control fields, and
//! rewrites the origin and session name. Everything else is carried verbatim.
use std::{fmt, net::IpAddr, str::FromStr};

use crate::{CRLF, errors::SDPError};

#[derive(Debug, Clone)]
pub struct SessionDescription {
    version: u32,
    origin: String,
    session_name: String,
    session_lines: Vec<String>,
    media: Vec<MediaDescription>,
}

/// One `m=` section with every line that followed it, verbatim.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    media_line: String,
    lines: Vec<String>,
}

impl MediaDescription {
    pub fn media_line(&self) -> &str {
        &self.media_line
    }

    /// Media type token, e.g. `video` from `m=video 0 RTP/AVP 96`.
    pub fn media_type(&self) -> &str {
        self.media_line.split_whitespace().next().unwrap_or("")
    }

    /// Transport protocol token, e.g. `RTP/AVP`.
    pub fn protocol(&self) -> Option<&str> {
        self.media_line.split_whitespace().nth(2)
    }

    /// Value of the `a=control:` attribute, if present.
    pub fn control(&self) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|line| line.strip_prefix("a=control:"))
            .map(str::trim)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl SessionDescription {
    pub fn parse(input: &str) -> Result<Self, SDPError> {
        input.parse()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn media(&self) -> &[MediaDescription] {
        &self.media
    }

    pub fn session_lines(&self) -> &[String] {
        &self.session_lines
    }

    /// Replaces the origin with `- <session_id> <session_version> IN IP4 <ip>`.
    pub fn rewrite_origin(&mut self, session_id: u32, session_version: u32, local_ip: IpAddr) {
        self.origin = format!("- {} {} IN IP4 {}", session_id, session_version, local_ip);
    }

    pub fn set_session_name<S: Into<String>>(&mut self, name: S) {
        self.session_name = name.into();
    }
}

impl FromStr for SessionDescription {
    type Err = SDPError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty());

        let version = match lines.next() {
            Some(line) => match line.strip_prefix("v=") {
                Some(value) => value
                    .parse::<u32>()
                    .map_err(|_| SDPError::InvalidVersion(value.to_owned()))?,
                None => return Err(SDPError::MissingVersion),
            },
            None => return Err(SDPError::MissingVersion),
        };

        let mut origin = None;
        let mut session_name = None;
        let mut session_lines = Vec::new();
        let mut media: Vec<MediaDescription> = Vec::new();
        for line in lines {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SDPError::InvalidLine(line.to_owned()))?;
            if key.len() != 1 || !key.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(SDPError::InvalidLine(line.to_owned()));
            }
            if key == "m" {
                media.push(MediaDescription {
                    media_line: value.to_owned(),
                    lines: Vec::new(),
                });
            } else if let Some(section) = media.last_mut() {
                section.lines.push(line.to_owned());
            } else if key == "o" && origin.is_none() {
                origin = Some(value.to_owned());
            } else if key == "s" && session_name.is_none() {
                session_name = Some(value.to_owned());
            } else {
                session_lines.push(line.to_owned());
            }
        }

        Ok(Self {
            version,
            origin: origin.ok_or(SDPError::MissingOrigin)?,
            session_name: session_name.ok_or(SDPError::MissingSessionName)?,
            session_lines,
            media,
        })
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}{}", self.version, CRLF)?;
        write!(f, "o={}{}", self.origin, CRLF)?;
        write!(f, "s={}{}", self.session_name, CRLF)?;
        for line in &self.session_lines {
            write!(f, "{}{}", line, CRLF)?;
        }
        for section in &self.media {
            write!(f, "m={}{}", section.media_line, CRLF)?;
            for line in &section.lines {
                write!(f, "{}{}", line, CRLF)?;
            }
        }
        Ok(())
    }
}
