use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use rtsp_formats::{DEFAULT_MAX_MESSAGE_BYTES, header::auth::BasicCredential};

use crate::{CLIENT_AGENT, SERVER_AGENT};

pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_UDP_PORT_SEARCH_START: u16 = 15000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredTransport {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveMethod {
    GetParameter,
    Options,
}

#[derive(Debug, Clone)]
pub struct RtspClientConfig {
    pub user_agent: String,
    pub credential: Option<BasicCredential>,
    pub preferred_transport: PreferredTransport,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_bytes: usize,
    pub keepalive_method: KeepaliveMethod,
    pub udp_port_search_start: u16,
}

impl Default for RtspClientConfig {
    fn default() -> Self {
        Self {
            user_agent: CLIENT_AGENT.to_owned(),
            credential: None,
            preferred_transport: PreferredTransport::Udp,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            keepalive_method: KeepaliveMethod::GetParameter,
            udp_port_search_start: DEFAULT_UDP_PORT_SEARCH_START,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RtspServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub server_agent: String,
    pub session_timeout_secs: u64,
    pub udp_port_search_start: u16,
    pub max_message_bytes: usize,
}

impl Default for RtspServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_RTSP_PORT,
            server_agent: SERVER_AGENT.to_owned(),
            session_timeout_secs: 60,
            udp_port_search_start: DEFAULT_UDP_PORT_SEARCH_START,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}
