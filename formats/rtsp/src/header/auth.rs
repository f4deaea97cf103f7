use std::{fmt, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::errors::RtspMessageError;

/// HTTP Basic credentials carried in an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredential {
    pub username: String,
    pub password: String,
}

impl BasicCredential {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn authorization_value(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }

    pub fn from_authorization_value(value: &str) -> Result<Self, RtspMessageError> {
        let encoded = value
            .trim()
            .strip_prefix("Basic ")
            .ok_or_else(|| RtspMessageError::InvalidAuthHeader(value.to_owned()))?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|err| RtspMessageError::InvalidAuthHeader(format!("{}: {}", value, err)))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|err| RtspMessageError::InvalidAuthHeader(format!("{}: {}", value, err)))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| RtspMessageError::InvalidAuthHeader(value.to_owned()))?;
        Ok(Self::new(username, password))
    }
}

/// A `WWW-Authenticate` challenge. Only the scheme and realm are read; this
/// engine answers Basic challenges exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: String,
    pub realm: Option<String>,
}

impl AuthChallenge {
    pub fn is_basic(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("Basic")
    }
}

impl FromStr for AuthChallenge {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(2, ' ');
        let scheme = parts
            .next()
            .filter(|scheme| !scheme.is_empty())
            .ok_or_else(|| RtspMessageError::InvalidAuthHeader(s.to_owned()))?;
        let realm = parts.next().and_then(|params| {
            params.split(',').map(str::trim).find_map(|param| {
                param
                    .strip_prefix("realm=")
                    .map(|value| value.trim_matches('"').to_owned())
            })
        });
        Ok(Self {
            scheme: scheme.to_owned(),
            realm,
        })
    }
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.realm {
            Some(realm) => write!(f, "{} realm=\"{}\"", self.scheme, realm),
            None => f.write_str(&self.scheme),
        }
    }
}
