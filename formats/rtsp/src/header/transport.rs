use std::{fmt, str::FromStr};

use num::Integer;

use crate::errors::RtspMessageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    RtpAvpUdp,
    RtpAvpTcp,
}

impl TransportProtocol {
    pub fn is_udp(&self) -> bool {
        matches!(self, Self::RtpAvpUdp)
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, Self::RtpAvpTcp)
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RtpAvpUdp => write!(f, "RTP/AVP"),
            Self::RtpAvpTcp => write!(f, "RTP/AVP/TCP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Play,
    Record,
    Other(String),
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "PLAY"),
            Self::Record => write!(f, "RECORD"),
            Self::Other(str) => write!(f, "{}", str),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCast {
    Unicast,
    Multicast,
}

impl fmt::Display for TransportCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicast => write!(f, "unicast"),
            Self::Multicast => write!(f, "multicast"),
        }
    }
}

fn parse_number_range<T: FromStr + Integer + Copy>(s: &str) -> Result<(T, T), T::Err> {
    if !s.contains('-') {
        let port: T = s.parse::<T>()?;
        return Ok((port, port));
    }

    let (first, second) = s.split_once('-').unwrap();
    Ok((first.parse()?, second.parse()?))
}

fn parse_ssrc(s: &str) -> Option<u32> {
    s.parse::<u32>()
        .or_else(|_| u32::from_str_radix(s, 16))
        .ok()
}

/// RFC 2326 Transport header. Unknown parameters are kept verbatim and
/// re-emitted, never rejected.
#[derive(Debug, Default, Clone)]
pub struct TransportHeader {
    pub protocol: Option<TransportProtocol>,
    pub cast: Option<TransportCast>,
    pub interleaved: Option<(u8, u8)>,
    pub ttl: Option<u8>,
    pub ssrc: Option<u32>,
    pub mode: Option<TransportMode>,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    /// `server_port=a` was given as a single value rather than a pair.
    pub server_port_single: bool,
    pub destination: Option<String>,
    pub source: Option<String>,
    pub append: bool,
    pub unknown: Vec<String>,
}

impl TransportHeader {
    /// A peer that answers with an `interleaved=` pair, or with a single
    /// `server_port` and no echoed `client_port`, is steering the session
    /// onto the control connection.
    pub fn signals_tcp_fallback(&self) -> bool {
        if self.protocol.is_some_and(|protocol| protocol.is_tcp()) || self.interleaved.is_some() {
            return true;
        }
        self.server_port_single && self.client_port.is_none()
    }
}

impl fmt::Display for TransportHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Vec::new();
        if let Some(protocol) = &self.protocol {
            result.push(format!("{}", protocol));
        }
        if let Some(cast) = &self.cast {
            result.push(format!("{}", cast));
        }
        if let Some(destination) = &self.destination {
            result.push(format!("destination={}", destination));
        }
        if let Some(source) = &self.source {
            result.push(format!("source={}", source));
        }
        if let Some(interleaved) = &self.interleaved {
            result.push(format!("interleaved={}-{}", interleaved.0, interleaved.1));
        }
        if let Some(ttl) = &self.ttl {
            result.push(format!("ttl={}", ttl));
        }
        if let Some(client_port) = &self.client_port {
            result.push(format!("client_port={}-{}", client_port.0, client_port.1));
        }
        if let Some(server_port) = &self.server_port {
            if self.server_port_single {
                result.push(format!("server_port={}", server_port.0));
            } else {
                result.push(format!("server_port={}-{}", server_port.0, server_port.1));
            }
        }
        if let Some(ssrc) = &self.ssrc {
            result.push(format!("ssrc={:08X}", ssrc));
        }
        if let Some(mode) = &self.mode {
            result.push(format!("mode={}", mode));
        }
        if self.append {
            result.push("append".to_string());
        }
        for unknown in &self.unknown {
            result.push(unknown.clone());
        }
        write!(f, "{}", result.join(";"))
    }
}

impl FromStr for TransportHeader {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result = Self::default();
        for param in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = param.split_once('=').unwrap_or((param, ""));
            match k {
                "RTP/AVP" | "RTP/AVP/UDP" => result.protocol = Some(TransportProtocol::RtpAvpUdp),
                "RTP/AVP/TCP" => result.protocol = Some(TransportProtocol::RtpAvpTcp),
                "unicast" => result.cast = Some(TransportCast::Unicast),
                "multicast" => result.cast = Some(TransportCast::Multicast),
                "interleaved" => {
                    result.interleaved = Some(parse_number_range::<u8>(v).map_err(|err| {
                        RtspMessageError::InvalidTransportHeader(format!(
                            "parse interleaved failed: {}, {}",
                            v, err
                        ))
                    })?)
                }
                "ttl" => {
                    result.ttl = Some(v.parse().map_err(|err| {
                        RtspMessageError::InvalidTransportHeader(format!(
                            "parse ttl failed: {}, {}",
                            v, err,
                        ))
                    })?);
                }
                "ssrc" => {
                    result.ssrc =
                        Some(parse_ssrc(v).ok_or(RtspMessageError::InvalidTransportHeader(
                            format!("parse ssrc failed: {}", v),
                        ))?);
                }
                "mode" => {
                    result.mode = Some(match v.trim_matches('"').to_uppercase().as_str() {
                        "PLAY" => TransportMode::Play,
                        "RECORD" => TransportMode::Record,
                        _ => TransportMode::Other(v.to_owned()),
                    });
                }
                "client_port" => {
                    result.client_port = Some(parse_number_range::<u16>(v).map_err(|err| {
                        RtspMessageError::InvalidTransportHeader(format!(
                            "parse port range for client_port failed: {}, {}",
                            v, err
                        ))
                    })?)
                }
                "server_port" => {
                    result.server_port = Some(parse_number_range::<u16>(v).map_err(|err| {
                        RtspMessageError::InvalidTransportHeader(format!(
                            "parse port range for server_port failed: {}, {}",
                            v, err
                        ))
                    })?);
                    result.server_port_single = !v.contains('-');
                }
                "destination" => {
                    if !v.is_empty() {
                        result.destination = Some(v.to_owned())
                    }
                }
                "source" => {
                    if !v.is_empty() {
                        result.source = Some(v.to_owned())
                    }
                }
                "append" => {
                    result.append = true;
                }
                _ => {
                    result.unknown.push(param.to_owned());
                }
            }
        }

        Ok(result)
    }
}
