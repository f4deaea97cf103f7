use std::{
    io,
    net::{IpAddr, Ipv4Addr},
    pin::Pin,
    sync::Arc,
};

use chrono::TimeDelta;
use rtsp_formats::{
    RtspMessage,
    consts::{
        methods::{RTSP_METHODS, RtspMethod},
        status::RtspStatus,
    },
    header::{
        RtspHeader,
        rtp_info::{RtpInfo, RtpInfoEntry},
        transport::{TransportHeader, TransportMode},
    },
    request::RtspRequest,
    response::RtspResponse,
};
use sdp_formats::session::SessionDescription;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;
use unified_io::UnifiedIO;
use uuid::Uuid;

use crate::{
    config::RtspServerConfig,
    errors::{RtspSessionError, RtspSessionResult},
    rtp_channel::{RtpChannel, RtpChannelEvent, is_rtcp_bye},
    simple_response,
    source::{MediaSource, SourcePacket},
    transport::ControlTransport,
};

/// Synthetic receive bookkeeping for the forwarded stream, kept so sender
/// statistics stay consistent without parsing a single RTP header.
#[derive(Debug, Default, Clone, Copy)]
pub struct SenderStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Per-peer session handler on the server side. Owns the peer's control
/// connection, the session identity allocated at SETUP, and the RtpChannel
/// the upstream source is forwarded into.
pub struct RtspServerSession {
    config: RtspServerConfig,
    source: MediaSource,
    transport: Arc<ControlTransport>,
    session_id: Option<String>,
    last_cseq: u32,
    description: Option<SessionDescription>,
    negotiated: Option<TransportHeader>,
    channel: Option<RtpChannel>,
    pending_events: Option<mpsc::Receiver<RtpChannelEvent>>,
    playing: bool,
    stats: SenderStats,
}

impl RtspServerSession {
    pub fn new(
        config: RtspServerConfig,
        source: MediaSource,
        io: Pin<Box<dyn UnifiedIO + Send>>,
    ) -> Self {
        let max_message_bytes = config.max_message_bytes;
        Self {
            config,
            source,
            transport: Arc::new(ControlTransport::new(io, max_message_bytes)),
            session_id: None,
            last_cseq: 0,
            description: None,
            negotiated: None,
            channel: None,
            pending_events: None,
            playing: false,
            stats: SenderStats::default(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn negotiated_transport(&self) -> Option<&TransportHeader> {
        self.negotiated.as_ref()
    }

    pub fn sender_stats(&self) -> SenderStats {
        self.stats
    }

    pub async fn run(&mut self) -> RtspSessionResult<()> {
        tracing::info!("rtsp peer session is running");
        let transport = self.transport.clone();
        let mut feed = self.source.subscribe();
        let mut events: Option<mpsc::Receiver<RtpChannelEvent>> = None;
        loop {
            if let Some(rx) = self.pending_events.take() {
                events = Some(rx);
            }
            tokio::select! {
                message = transport.recv_control() => {
                    match message {
                        Ok(RtspMessage::Request(request)) => {
                            if self.on_request(&request).await? {
                                self.shutdown_channel();
                                return Ok(());
                            }
                        }
                        Ok(RtspMessage::Response(response)) => {
                            tracing::debug!("ignoring response from peer: {:?}", response.status());
                        }
                        Ok(RtspMessage::Interleaved(packet)) => {
                            tracing::debug!(
                                "interleaved packet on unbound channel {}",
                                packet.channel_id
                            );
                        }
                        Ok(RtspMessage::NotRtsp(bytes)) => {
                            tracing::warn!("ignoring {} non-rtsp bytes from peer", bytes.len());
                        }
                        Err(RtspSessionError::Transport(err))
                            if err.kind() == io::ErrorKind::UnexpectedEof =>
                        {
                            tracing::info!("peer closed the control connection");
                            self.shutdown_channel();
                            return Ok(());
                        }
                        Err(err) => {
                            tracing::error!("error while reading rtsp message: {}", err);
                            self.shutdown_channel();
                            return Err(err);
                        }
                    }
                }
                packet = feed.recv() => {
                    match packet {
                        Ok(packet) => {
                            if self.playing && self.on_source_packet(packet).await {
                                tracing::info!("upstream source said goodbye, terminating peer session");
                                self.shutdown_channel();
                                return Ok(());
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("source feed lagged, skipped {} packets", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("source feed closed, terminating peer session");
                            self.shutdown_channel();
                            return Ok(());
                        }
                    }
                }
                event = recv_or_pending(&mut events) => {
                    if event.is_bye() {
                        tracing::info!("peer sent RTCP BYE, terminating session");
                        self.shutdown_channel();
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns `true` once the session is over (a TEARDOWN was answered).
    async fn on_request(&mut self, request: &RtspRequest) -> RtspSessionResult<bool> {
        let span = tracing::debug_span!(
            "handle_request",
            method = %request.method(),
            uri = %request.uri(),
            cseq = request.headers().cseq(),
        );
        if let Some(cseq) = request.headers().cseq() {
            self.last_cseq = cseq;
        }
        let is_teardown = request.method() == RtspMethod::TearDown;
        let response = match self.handle_request(request).instrument(span).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!("error while processing request: {}", err);
                simple_response(RtspStatus::InternalServerError)
            }
        };
        let ended = is_teardown && response.status() == RtspStatus::OK;
        self.send_response(request, response).await?;
        Ok(ended)
    }

    /// Every response echoes the request CSeq (or the last one seen) and
    /// carries the Session header while an id is bound.
    async fn send_response(
        &self,
        request: &RtspRequest,
        mut response: RtspResponse,
    ) -> RtspSessionResult<()> {
        let cseq = request.headers().cseq().unwrap_or(self.last_cseq);
        response.headers_mut().set(RtspHeader::CSeq, cseq.to_string());
        if let Some(session_id) = self.session_id.as_ref()
            && !response.headers().contains(RtspHeader::Session)
        {
            response.headers_mut().push(
                RtspHeader::Session,
                format!("{};timeout={}", session_id, self.config.session_timeout_secs),
            );
        }
        response
            .headers_mut()
            .push(RtspHeader::Server, self.config.server_agent.clone());
        response
            .headers_mut()
            .push(RtspHeader::Date, chrono::Utc::now().to_rfc2822());
        tracing::debug!("sending rtsp response: {}", response);
        self.transport.send(RtspMessage::Response(response)).await
    }

    /// Forwards one upstream packet into the peer's channel; `true` when the
    /// source announced the end of the stream.
    async fn on_source_packet(&mut self, packet: SourcePacket) -> bool {
        match packet {
            SourcePacket::Rtp(payload) => {
                if let Some(channel) = &self.channel {
                    self.stats.packets += 1;
                    self.stats.bytes += payload.len() as u64;
                    if let Err(err) = channel.enqueue(payload) {
                        tracing::warn!("failed to forward rtp packet: {}", err);
                    }
                }
                false
            }
            SourcePacket::Rtcp(payload) => {
                let bye = is_rtcp_bye(&payload);
                if let Some(channel) = &self.channel {
                    // a goodbye must reach the peer before the channel is torn
                    // down, so it bypasses the outbound queue when it can
                    let result = match (bye, channel.interleaved_ids()) {
                        (true, Some((_, rtcp_id))) => {
                            self.transport.send_interleaved(rtcp_id, payload).await
                        }
                        _ => channel.enqueue_rtcp(payload),
                    };
                    if let Err(err) = result {
                        tracing::warn!("failed to forward rtcp packet: {}", err);
                    }
                }
                bye
            }
        }
    }

    fn shutdown_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
        self.pending_events = None;
        self.playing = false;
    }

    /// The parameters this session exposes, all read-only: the synthetic
    /// receive counters of the forwarded stream.
    fn parameter_value(&self, name: &str) -> Option<u64> {
        match name {
            "packets_sent" => Some(self.stats.packets),
            "bytes_sent" => Some(self.stats.bytes),
            _ => None,
        }
    }

    fn session_matches(&self, request: &RtspRequest) -> bool {
        match (&self.session_id, request.headers().session()) {
            (Some(ours), Some(theirs)) => *ours == theirs.id,
            _ => false,
        }
    }

    fn local_ip(&self) -> IpAddr {
        self.transport
            .underlying_io()
            .local_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn peer_ip(&self) -> Option<IpAddr> {
        self.transport
            .underlying_io()
            .peer_addr()
            .map(|addr| addr.ip())
    }

    /// Derives the per-peer answer to DESCRIBE: the upstream description
    /// with a fresh origin (NTP timestamp halves + the local address) and a
    /// fixed session name; every other line is carried verbatim.
    fn rewrite_session_description(&self) -> RtspSessionResult<SessionDescription> {
        let mut description = self.source.description().clone();
        let (upper, lower) = utils::system::time::ntp_timestamp_halves_now()
            .map_err(|err| RtspSessionError::Protocol(format!("system clock error: {}", err)))?;
        description.rewrite_origin(upper, lower, self.local_ip());
        description.set_session_name(self.config.server_agent.clone());
        Ok(description)
    }
}

async fn recv_or_pending(events: &mut Option<mpsc::Receiver<RtpChannelEvent>>) -> RtpChannelEvent {
    match events {
        Some(rx) => match rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

trait RtspRequestHandler {
    async fn handle_request(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        match request.method() {
            RtspMethod::Options => self.handle_options(request).await,
            RtspMethod::Describe => self.handle_describe(request).await,
            RtspMethod::Setup => self.handle_setup(request).await,
            RtspMethod::Play => self.handle_play(request).await,
            RtspMethod::Pause => self.handle_pause(request).await,
            RtspMethod::TearDown => self.handle_teardown(request).await,
            RtspMethod::GetParameter => self.handle_get_parameter(request).await,
            RtspMethod::SetParameter => self.handle_set_parameter(request).await,
            RtspMethod::Announce => self.handle_announce(request).await,
            RtspMethod::Record => self.handle_record(request).await,
            RtspMethod::Redirect => self.handle_redirect(request).await,
        }
    }
    async fn handle_options(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_describe(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_setup(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_play(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_pause(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_teardown(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_get_parameter(
        &mut self,
        request: &RtspRequest,
    ) -> RtspSessionResult<RtspResponse>;
    async fn handle_set_parameter(
        &mut self,
        request: &RtspRequest,
    ) -> RtspSessionResult<RtspResponse>;
    async fn handle_announce(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_record(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
    async fn handle_redirect(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse>;
}

impl RtspRequestHandler for RtspServerSession {
    async fn handle_options(&mut self, _request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .header(RtspHeader::Public, RTSP_METHODS.join(","))
            .build()?;
        Ok(response)
    }

    async fn handle_describe(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        let description = self.rewrite_session_description()?;
        let body = description.to_string();
        self.description = Some(description);
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .header(RtspHeader::ContentType, "application/sdp")
            .header(RtspHeader::ContentBase, request.uri().as_str())
            .header(
                RtspHeader::Expires,
                (chrono::Utc::now() + TimeDelta::minutes(1)).to_rfc2822(),
            )
            .body(body)
            .build()?;
        Ok(response)
    }

    async fn handle_setup(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        let Some(requested) = request.headers().transport() else {
            tracing::error!("SETUP without a Transport header");
            return Ok(simple_response(RtspStatus::UnsupportedTransport));
        };
        tracing::debug!("got SETUP request with transport: {:?}", requested);

        let mode = requested.mode.clone().unwrap_or(TransportMode::Play);
        if let TransportMode::Other(mode) = &mode {
            tracing::error!("unknown transport mode in SETUP: {}", mode);
            return Ok(simple_response(RtspStatus::UnsupportedTransport));
        }

        // once a description is out, the SETUP target must name one of its
        // media sections
        if let Some(description) = &self.description {
            let matches = description.media().iter().any(|media| {
                media.control().is_none_or(|control| {
                    control == "*" || request.uri().path().contains(control)
                })
            });
            if !matches {
                tracing::error!("SETUP uri {} names no known media control", request.uri());
                return Ok(simple_response(RtspStatus::NotFound));
            }
        }

        let mut echoed = requested.clone();
        let want_interleaved = requested
            .protocol
            .is_some_and(|protocol| protocol.is_tcp())
            || requested.interleaved.is_some();

        let mut channel = if want_interleaved {
            let (rtp_id, rtcp_id) = requested.interleaved.unwrap_or((0, 1));
            echoed.interleaved = Some((rtp_id, rtcp_id));
            RtpChannel::interleaved(self.transport.clone(), rtp_id, rtcp_id)
        } else {
            let Some((client_rtp, client_rtcp)) = requested.client_port else {
                tracing::error!("udp SETUP without client_port: {}", requested);
                return Ok(simple_response(RtspStatus::UnsupportedTransport));
            };
            let Some(peer_ip) = self.peer_ip() else {
                tracing::error!("control connection exposes no peer address for udp delivery");
                return Ok(simple_response(RtspStatus::DestinationUnreachable));
            };
            let channel = RtpChannel::udp_sender(
                peer_ip,
                client_rtp,
                client_rtcp,
                self.config.udp_port_search_start,
            )
            .await?;
            echoed.server_port = Some((channel.local_rtp_port(), channel.local_rtcp_port()));
            echoed.server_port_single = false;
            channel
        };

        let ssrc = utils::random::random_u32();
        channel.set_ssrc(ssrc);
        channel.connect()?;
        echoed.ssrc = Some(ssrc);
        self.pending_events = channel.take_events();
        if let Some(mut old) = self.channel.replace(channel) {
            old.disconnect();
        }

        let session_id = match &self.session_id {
            Some(session_id) => session_id.clone(),
            None => {
                let session_id = Uuid::now_v7().to_string();
                tracing::info!("allocated session id {}", session_id);
                self.session_id = Some(session_id.clone());
                session_id
            }
        };
        self.negotiated = Some(requested);

        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .header(RtspHeader::Transport, echoed.to_string())
            .header(
                RtspHeader::Session,
                format!("{};timeout={}", session_id, self.config.session_timeout_secs),
            )
            .build()?;
        Ok(response)
    }

    async fn handle_play(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        if !self.session_matches(request) {
            return Ok(simple_response(RtspStatus::SessionNotFound));
        }
        if self.channel.is_none() {
            return Ok(simple_response(RtspStatus::MethodNotValidInThisState));
        }
        self.playing = true;
        let range = request
            .headers()
            .get_unique(RtspHeader::Range)
            .cloned()
            .unwrap_or_else(|| "npt=0-".to_owned());
        let rtp_info = RtpInfo {
            entries: vec![RtpInfoEntry {
                url: Some(request.uri().to_string()),
                seq: None,
                rtptime: None,
            }],
        };
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .header(RtspHeader::Range, range)
            .header(RtspHeader::RtpInfo, rtp_info.to_string())
            .build()?;
        Ok(response)
    }

    async fn handle_pause(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        if !self.session_matches(request) {
            return Ok(simple_response(RtspStatus::SessionNotFound));
        }
        self.playing = false;
        Ok(simple_response(RtspStatus::OK))
    }

    async fn handle_teardown(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        if !self.session_matches(request) {
            return Ok(simple_response(RtspStatus::SessionNotFound));
        }
        tracing::info!("got teardown request, about to close session");
        self.shutdown_channel();
        self.session_id = None;
        self.description = None;
        self.negotiated = None;
        Ok(simple_response(RtspStatus::OK))
    }

    async fn handle_get_parameter(
        &mut self,
        request: &RtspRequest,
    ) -> RtspSessionResult<RtspResponse> {
        tracing::debug!("get parameter request: {}", request);
        let Some(body) = request.body().filter(|body| !body.trim().is_empty()) else {
            // an empty GET_PARAMETER is the peer's keep-alive
            return Ok(simple_response(RtspStatus::OK));
        };

        let mut reported = Vec::new();
        for name in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match self.parameter_value(name) {
                Some(value) => reported.push(format!("{}: {}", name, value)),
                None => {
                    tracing::warn!("peer asked for unknown parameter: {}", name);
                    return Ok(simple_response(RtspStatus::ParameterNotUnderstood));
                }
            }
        }
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .header(RtspHeader::ContentType, "text/parameters")
            .body(reported.join("\r\n"))
            .build()?;
        Ok(response)
    }

    async fn handle_set_parameter(
        &mut self,
        request: &RtspRequest,
    ) -> RtspSessionResult<RtspResponse> {
        let Some(body) = request.body().filter(|body| !body.trim().is_empty()) else {
            return Ok(simple_response(RtspStatus::OK));
        };

        for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let name = line.split(':').next().unwrap_or(line).trim();
            if self.parameter_value(name).is_some() {
                tracing::warn!("peer tried to assign read-only parameter: {}", name);
                return Ok(simple_response(RtspStatus::ParameterIsReadOnly));
            }
        }
        Ok(simple_response(RtspStatus::ParameterNotUnderstood))
    }

    async fn handle_announce(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        let content_type = request.headers().get_unique(RtspHeader::ContentType);
        if content_type.map(String::as_str) != Some("application/sdp") {
            tracing::warn!(
                "announce content type is not application/sdp, got: {:?}",
                content_type
            );
            return Ok(simple_response(RtspStatus::UnsupportedMediaType));
        }

        let body = request.body().map(|body| body.parse::<SessionDescription>());
        match body {
            Some(Ok(description)) => {
                tracing::debug!("received announced description: {:?}", description);
                self.description = Some(description);
                Ok(simple_response(RtspStatus::OK))
            }
            Some(Err(err)) => {
                tracing::warn!("announced description failed to parse: {}", err);
                Ok(simple_response(RtspStatus::BadRequest))
            }
            None => Ok(simple_response(RtspStatus::BadRequest)),
        }
    }

    async fn handle_record(&mut self, request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        if !self.session_matches(request) {
            return Ok(simple_response(RtspStatus::SessionNotFound));
        }
        let mut response = RtspResponse::builder().status(RtspStatus::OK);
        if let Some(range) = request.headers().get_unique(RtspHeader::Range) {
            response = response.header(RtspHeader::Range, range);
        }
        Ok(response.build()?)
    }

    async fn handle_redirect(&mut self, _request: &RtspRequest) -> RtspSessionResult<RtspResponse> {
        Ok(simple_response(RtspStatus::NotImplemented))
    }
}