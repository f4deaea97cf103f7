use std::{fmt, str::FromStr};

use crate::errors::RtspMessageError;

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// `Session: id[;timeout=N]`, timeout defaulting to 60 seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub id: String,
    pub timeout_secs: u64,
}

impl SessionHeader {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

impl FromStr for SessionHeader {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';').map(str::trim);
        let id = parts
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RtspMessageError::InvalidSessionHeader(s.to_owned()))?;

        let mut timeout_secs = DEFAULT_SESSION_TIMEOUT_SECS;
        for param in parts {
            if let Some(value) = param.strip_prefix("timeout=") {
                timeout_secs = value.trim().parse().map_err(|err| {
                    RtspMessageError::InvalidSessionHeader(format!(
                        "parse timeout failed: {}, {}",
                        value, err
                    ))
                })?;
            }
        }

        Ok(Self {
            id: id.to_owned(),
            timeout_secs,
        })
    }
}

impl fmt::Display for SessionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
