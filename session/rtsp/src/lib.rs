use rtsp_formats::{consts::status::RtspStatus, response::RtspResponse};

pub mod client;
pub mod config;
pub mod errors;
pub mod keepalive;
pub mod rtp_channel;
pub mod server;
pub mod server_session;
pub mod source;
pub mod transport;

pub const CLIENT_AGENT: &str = "rtsp-session/0.1 (client)";
pub const SERVER_AGENT: &str = "rtsp-session/0.1 (server)";

#[inline(always)]
pub fn simple_response(status: RtspStatus) -> RtspResponse {
    RtspResponse::builder().status(status).build().unwrap()
}
