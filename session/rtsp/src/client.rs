use std::{
    net::IpAddr,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use rtsp_formats::{
    RtspMessage,
    consts::{methods::RtspMethod, status::RtspStatus},
    header::{
        RtspHeader,
        session::SessionHeader,
        transport::{TransportCast, TransportHeader, TransportMode, TransportProtocol},
    },
    request::{RtspRequest, builder::RtspRequestBuilder},
    response::RtspResponse,
    time::{TimeRange, npt::Npt},
};
use sdp_formats::session::SessionDescription;
use tokio::{sync::mpsc, time::timeout};
use unified_io::{UnifiedIO, tcp::TcpIO};
use url::Url;

use crate::{
    config::{DEFAULT_RTSP_PORT, KeepaliveMethod, PreferredTransport, RtspClientConfig},
    errors::{RtspSessionError, RtspSessionResult},
    keepalive::{KeepAlive, bump_cseq, keepalive_period},
    rtp_channel::{RtpChannel, RtpChannelEvent, RtpChannelVariant},
    transport::ControlTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Idle,
    Connected,
    Described,
    Ready,
    Playing,
    Terminating,
    Closed,
}

/// What SETUP ended up agreeing on.
#[derive(Debug, Clone)]
pub struct NegotiatedTransport {
    pub protocol: TransportProtocol,
    pub multicast: bool,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u8, u8)>,
    pub ssrc: Option<u32>,
    pub mode: TransportMode,
}

enum SetupOutcome {
    Established,
    TcpFallback,
}

/// Drives one control connection through
/// OPTIONS → DESCRIBE → SETUP → PLAY → (keep-alive) → TEARDOWN.
pub struct RtspClient {
    config: RtspClientConfig,
    url: Url,
    state: ClientState,
    cseq: Arc<AtomicU32>,
    transport: Option<Arc<ControlTransport>>,
    supported: Vec<RtspMethod>,
    description: Option<SessionDescription>,
    session: Option<SessionHeader>,
    negotiated: Option<NegotiatedTransport>,
    channel: Option<RtpChannel>,
    events: Option<mpsc::Receiver<RtpChannelEvent>>,
    keepalive: Option<KeepAlive>,
    cursor: Npt,
    start_seq: Option<u16>,
    start_rtptime: Option<u32>,
}

impl RtspClient {
    pub fn new(url: Url, config: RtspClientConfig) -> Self {
        Self {
            config,
            url,
            state: ClientState::Idle,
            cseq: Arc::new(AtomicU32::new(0)),
            transport: None,
            supported: Vec::new(),
            description: None,
            session: None,
            negotiated: None,
            channel: None,
            events: None,
            keepalive: None,
            cursor: Npt::ZERO,
            start_seq: None,
            start_rtptime: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    pub fn session_timeout_secs(&self) -> Option<u64> {
        self.session.as_ref().map(|session| session.timeout_secs)
    }

    pub fn supported_methods(&self) -> &[RtspMethod] {
        &self.supported
    }

    pub fn description(&self) -> Option<&SessionDescription> {
        self.description.as_ref()
    }

    pub fn negotiated_transport(&self) -> Option<&NegotiatedTransport> {
        self.negotiated.as_ref()
    }

    pub fn channel_variant(&self) -> Option<RtpChannelVariant> {
        self.channel.as_ref().map(|channel| channel.variant())
    }

    pub fn ssrc(&self) -> Option<u32> {
        self.negotiated.as_ref().and_then(|negotiated| negotiated.ssrc)
    }

    /// First RTP sequence number announced by PLAY's `RTP-Info`.
    pub fn start_sequence(&self) -> Option<u16> {
        self.start_seq
    }

    pub fn start_rtptime(&self) -> Option<u32> {
        self.start_rtptime
    }

    pub fn resume_point(&self) -> Npt {
        self.cursor
    }

    pub fn keepalive_armed(&self) -> bool {
        self.keepalive.is_some()
    }

    /// Bytes exchanged on the control connection so far.
    pub fn control_stats(&self) -> Option<(u64, u64)> {
        self.transport
            .as_ref()
            .map(|transport| (transport.bytes_sent(), transport.bytes_received()))
    }

    /// Resolves the host and opens the control connection.
    pub async fn connect(&mut self) -> RtspSessionResult<()> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| RtspSessionError::Resolve(format!("no host in {}", self.url)))?
            .to_string();
        let port = self.url.port().unwrap_or(DEFAULT_RTSP_PORT);
        let mut addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|err| RtspSessionError::Resolve(format!("{}: {}", host, err)))?;
        let addr = addrs
            .next()
            .ok_or_else(|| RtspSessionError::Resolve(format!("{} resolved to no address", host)))?;
        let io = timeout(self.config.read_timeout, TcpIO::connect(addr)).await??;
        self.connect_io(Box::pin(io));
        Ok(())
    }

    /// Binds the client to an already-open control connection.
    pub fn connect_io(&mut self, io: Pin<Box<dyn UnifiedIO + Send>>) {
        self.transport = Some(Arc::new(ControlTransport::new(
            io,
            self.config.max_message_bytes,
        )));
        self.state = ClientState::Connected;
    }

    /// OPTIONS → DESCRIBE → SETUP → PLAY in one call.
    pub async fn start(&mut self) -> RtspSessionResult<()> {
        if self.state == ClientState::Idle {
            self.connect().await?;
        }
        self.options().await?;
        self.describe().await?;
        self.setup().await?;
        self.play().await
    }

    pub async fn options(&mut self) -> RtspSessionResult<()> {
        let (builder, cseq) = self.request(RtspMethod::Options, self.url.clone());
        let response = self.exchange(builder, cseq).await?;
        Self::expect_ok(&response)?;
        self.supported = response.headers().public();
        Ok(())
    }

    pub async fn describe(&mut self) -> RtspSessionResult<()> {
        let (builder, cseq) = self.request(RtspMethod::Describe, self.url.clone());
        let response = self
            .exchange(builder.header(RtspHeader::Accept, "application/sdp"), cseq)
            .await?;
        Self::expect_ok(&response)?;
        let body = response.body().ok_or_else(|| {
            RtspSessionError::Protocol("DESCRIBE response carries no body".to_owned())
        })?;
        let description = body.parse::<SessionDescription>().map_err(|err| {
            tracing::error!("DESCRIBE body is not a usable session description: {}", err);
            RtspSessionError::Protocol("invalid session description".to_owned())
        })?;
        self.description = Some(description);
        if self.state < ClientState::Described {
            self.state = ClientState::Described;
        }
        Ok(())
    }

    /// Negotiates the media transport. Two bounded retry edges, one use
    /// each: a 454 redoes DESCRIBE and SETUP, a TCP-fallback answer rebuilds
    /// the channel over the control connection.
    pub async fn setup(&mut self) -> RtspSessionResult<()> {
        let mut want_tcp = self.config.preferred_transport == PreferredTransport::Tcp;
        let mut fallback_done = false;
        let mut expiry_done = false;
        loop {
            match self.setup_once(want_tcp).await {
                Ok(SetupOutcome::Established) => return Ok(()),
                Ok(SetupOutcome::TcpFallback) if !fallback_done => {
                    tracing::info!("server steered the session onto tcp, re-issuing SETUP");
                    fallback_done = true;
                    want_tcp = true;
                }
                Ok(SetupOutcome::TcpFallback) => {
                    return Err(RtspSessionError::Protocol(
                        "server demanded a transport fallback twice".to_owned(),
                    ));
                }
                Err(RtspSessionError::SessionExpired) if !expiry_done => {
                    tracing::info!("session not found during SETUP, redoing DESCRIBE once");
                    expiry_done = true;
                    self.session = None;
                    self.describe().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn setup_once(&mut self, want_tcp: bool) -> RtspSessionResult<SetupOutcome> {
        let uri = self.setup_uri()?;
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
        self.events = None;

        if want_tcp {
            return self.setup_interleaved(uri).await;
        }
        self.setup_udp(uri).await
    }

    async fn setup_udp(&mut self, uri: Url) -> RtspSessionResult<SetupOutcome> {
        let mut channel = RtpChannel::udp_receiver(self.config.udp_port_search_start).await?;
        let client_port = (channel.local_rtp_port(), channel.local_rtcp_port());
        let transport_header = TransportHeader {
            protocol: Some(TransportProtocol::RtpAvpUdp),
            cast: Some(TransportCast::Unicast),
            client_port: Some(client_port),
            ..Default::default()
        };

        let (builder, cseq) = self.request(RtspMethod::Setup, uri);
        let response = self
            .exchange(
                builder.header(RtspHeader::Transport, transport_header.to_string()),
                cseq,
            )
            .await?;
        Self::expect_ok(&response)?;
        self.store_session(&response)?;
        let answered = response.headers().transport().ok_or_else(|| {
            RtspSessionError::Protocol("SETUP response carries no Transport header".to_owned())
        })?;

        if answered.signals_tcp_fallback() {
            channel.disconnect();
            return Ok(SetupOutcome::TcpFallback);
        }

        let (server_rtp, server_rtcp) = match answered.server_port {
            Some((rtp, rtcp)) if !answered.server_port_single => (rtp, rtcp),
            Some((rtp, _)) => (rtp, rtp + 1),
            None => {
                return Err(RtspSessionError::Protocol(
                    "SETUP response names neither server_port nor interleaved".to_owned(),
                ));
            }
        };
        let peer_ip = self.media_peer_ip(&answered)?;
        channel.arm_receiver(peer_ip, server_rtp, server_rtcp).await?;
        if let Some(ssrc) = answered.ssrc {
            channel.set_ssrc(ssrc);
        }
        channel.connect()?;
        self.events = channel.take_events();
        self.negotiated = Some(NegotiatedTransport {
            protocol: TransportProtocol::RtpAvpUdp,
            multicast: matches!(answered.cast, Some(TransportCast::Multicast)),
            client_port: Some(client_port),
            server_port: Some((server_rtp, server_rtcp)),
            interleaved: None,
            ssrc: answered.ssrc,
            mode: answered.mode.unwrap_or(TransportMode::Play),
        });
        self.channel = Some(channel);
        if self.state < ClientState::Ready {
            self.state = ClientState::Ready;
        }
        Ok(SetupOutcome::Established)
    }

    async fn setup_interleaved(&mut self, uri: Url) -> RtspSessionResult<SetupOutcome> {
        let transport_header = TransportHeader {
            protocol: Some(TransportProtocol::RtpAvpTcp),
            cast: Some(TransportCast::Unicast),
            interleaved: Some((0, 1)),
            ..Default::default()
        };
        let (builder, cseq) = self.request(RtspMethod::Setup, uri);
        let response = self
            .exchange(
                builder.header(RtspHeader::Transport, transport_header.to_string()),
                cseq,
            )
            .await?;
        Self::expect_ok(&response)?;
        self.store_session(&response)?;
        let answered = response.headers().transport().ok_or_else(|| {
            RtspSessionError::Protocol("SETUP response carries no Transport header".to_owned())
        })?;

        let interleaved = answered.interleaved.unwrap_or((0, 1));
        let mut channel =
            RtpChannel::interleaved(self.transport()?.clone(), interleaved.0, interleaved.1);
        if let Some(ssrc) = answered.ssrc {
            channel.set_ssrc(ssrc);
        }
        channel.connect()?;
        self.events = channel.take_events();
        self.negotiated = Some(NegotiatedTransport {
            protocol: TransportProtocol::RtpAvpTcp,
            multicast: false,
            client_port: None,
            server_port: None,
            interleaved: Some(interleaved),
            ssrc: answered.ssrc,
            mode: answered.mode.unwrap_or(TransportMode::Play),
        });
        self.channel = Some(channel);
        if self.state < ClientState::Ready {
            self.state = ClientState::Ready;
        }
        Ok(SetupOutcome::Established)
    }

    /// Starts delivery from the stored resume point. A 454 clears the
    /// session and redoes DESCRIBE + SETUP once before the intent is
    /// retried; a second 454 is fatal.
    pub async fn play(&mut self) -> RtspSessionResult<()> {
        let mut expiry_done = false;
        loop {
            let range = TimeRange::npt_from(self.cursor);
            let (builder, cseq) = self.request(RtspMethod::Play, self.url.clone());
            let response = self
                .exchange(builder.header(RtspHeader::Range, range.to_string()), cseq)
                .await?;
            match Self::expect_ok(&response) {
                Ok(()) => {
                    if let Some(rtp_info) = response.headers().rtp_info() {
                        self.start_seq = rtp_info.first_seq();
                        self.start_rtptime = rtp_info.first_rtptime();
                    }
                    if let Some(range) = response.headers().range() {
                        self.cursor = range.start_npt();
                    }
                    self.arm_keepalive();
                    self.state = ClientState::Playing;
                    return Ok(());
                }
                Err(RtspSessionError::SessionExpired) if !expiry_done => {
                    tracing::info!("session expired during PLAY, rebuilding it once");
                    expiry_done = true;
                    self.session = None;
                    self.keepalive = None;
                    self.describe().await?;
                    self.setup().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn pause(&mut self) -> RtspSessionResult<()> {
        let (builder, cseq) = self.request(RtspMethod::Pause, self.url.clone());
        let response = self.exchange(builder, cseq).await?;
        Self::expect_ok(&response)?;
        if let Some(range) = response.headers().range() {
            self.cursor = range.start_npt();
        }
        self.state = ClientState::Ready;
        Ok(())
    }

    /// A non-empty parameter name travels as a `text/parameters` body; with
    /// no name the empty request doubles as a session refresh.
    pub async fn get_parameter(
        &mut self,
        parameter: Option<&str>,
    ) -> RtspSessionResult<Option<String>> {
        let (mut builder, cseq) = self.request(RtspMethod::GetParameter, self.url.clone());
        if let Some(parameter) = parameter.filter(|parameter| !parameter.is_empty()) {
            builder = builder
                .header(RtspHeader::ContentType, "text/parameters")
                .body(parameter.to_owned());
        }
        let response = self.exchange(builder, cseq).await?;
        Self::expect_ok(&response)?;
        Ok(response.body().cloned())
    }

    /// Sends one `name: value` assignment. A server that rejects the
    /// parameter (read-only, or not understood) surfaces as `Protocol` with
    /// the answered status.
    pub async fn set_parameter(&mut self, name: &str, value: &str) -> RtspSessionResult<()> {
        let (builder, cseq) = self.request(RtspMethod::SetParameter, self.url.clone());
        let response = self
            .exchange(
                builder
                    .header(RtspHeader::ContentType, "text/parameters")
                    .body(format!("{}: {}", name, value)),
                cseq,
            )
            .await?;
        Self::expect_ok(&response)?;
        Ok(())
    }

    /// Best-effort termination: one attempt under a shortened timeout, every
    /// failure swallowed, local state reset on all paths. Safe to call from
    /// any state.
    pub async fn teardown(&mut self) -> RtspSessionResult<()> {
        self.keepalive = None;
        if self.state > ClientState::Idle && self.state < ClientState::Closed {
            self.state = ClientState::Terminating;
        }
        if self.transport.is_some() && self.session.is_some() {
            if let Err(err) = self.try_send_teardown().await {
                tracing::warn!("best-effort TEARDOWN failed: {}", err);
            }
        }
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
        self.events = None;
        self.session = None;
        self.negotiated = None;
        self.start_seq = None;
        self.start_rtptime = None;
        self.cursor = Npt::ZERO;
        // some servers keep the control socket for a fresh session
        self.cseq.store(0, Ordering::SeqCst);
        self.state = ClientState::Closed;
        Ok(())
    }

    async fn try_send_teardown(&mut self) -> RtspSessionResult<()> {
        let (builder, cseq) = self.request(RtspMethod::TearDown, self.url.clone());
        let request = builder.build()?;
        let transport = self.transport()?.clone();
        let short_timeout = self.config.read_timeout / 2;
        timeout(short_timeout, transport.send(RtspMessage::Request(request))).await??;
        self.await_response(&transport, cseq, short_timeout).await?;
        Ok(())
    }

    /// Next media event. The control connection is pumped while waiting so
    /// interleaved frames keep flowing and keep-alive responses drain; an
    /// RTCP BYE from the peer tears the session down and surfaces as
    /// [`RtspSessionError::PeerClosed`].
    pub async fn next_event(&mut self) -> RtspSessionResult<Option<RtpChannelEvent>> {
        let Some(transport) = self.transport.as_ref().map(Arc::clone) else {
            return Ok(None);
        };
        let event = loop {
            let Some(events) = self.events.as_mut() else {
                return Ok(None);
            };
            tokio::select! {
                event = events.recv() => break event,
                message = transport.recv_control() => {
                    match message {
                        Ok(RtspMessage::Response(response)) => {
                            tracing::debug!(
                                "draining response with cseq {:?} while streaming",
                                response.headers().cseq()
                            );
                        }
                        Ok(RtspMessage::Request(request)) => {
                            tracing::debug!(
                                "ignoring server-initiated {} request while streaming",
                                request.method()
                            );
                        }
                        Ok(RtspMessage::Interleaved(_)) | Ok(RtspMessage::NotRtsp(_)) => {}
                        Err(err) => {
                            // surface already-demultiplexed events before the error
                            match events.try_recv() {
                                Ok(event) => break Some(event),
                                Err(_) => return Err(err),
                            }
                        }
                    }
                }
            }
        };
        match event {
            Some(event) if event.is_bye() => {
                tracing::info!("peer sent RTCP BYE, terminating the session");
                self.state = ClientState::Terminating;
                self.teardown().await?;
                Err(RtspSessionError::PeerClosed)
            }
            Some(event) => Ok(Some(event)),
            None => Ok(None),
        }
    }

    fn transport(&self) -> RtspSessionResult<&Arc<ControlTransport>> {
        self.transport.as_ref().ok_or_else(|| {
            RtspSessionError::Protocol("control connection is not open".to_owned())
        })
    }

    fn request(&self, method: RtspMethod, uri: Url) -> (RtspRequestBuilder, u32) {
        let cseq = bump_cseq(&self.cseq);
        let mut builder = RtspRequest::builder()
            .method(method)
            .uri(uri)
            .header(RtspHeader::CSeq, cseq.to_string())
            .header(RtspHeader::UserAgent, self.config.user_agent.clone());
        if let Some(session) = &self.session {
            builder = builder.header(RtspHeader::Session, session.id.clone());
        }
        if let Some(credential) = &self.config.credential {
            builder = builder.header(RtspHeader::Authorization, credential.authorization_value());
        }
        (builder, cseq)
    }

    async fn exchange(
        &mut self,
        builder: RtspRequestBuilder,
        cseq: u32,
    ) -> RtspSessionResult<RtspResponse> {
        let request = builder.build()?;
        let transport = self.transport()?.clone();
        tracing::debug!("sending rtsp request: {}", request);
        timeout(
            self.config.write_timeout,
            transport.send(RtspMessage::Request(request)),
        )
        .await??;
        self.await_response(&transport, cseq, self.config.read_timeout)
            .await
    }

    /// One outstanding request per connection: everything that is not the
    /// awaited response (stale responses, server-initiated requests) is
    /// logged and skipped.
    async fn await_response(
        &self,
        transport: &ControlTransport,
        cseq: u32,
        read_timeout: Duration,
    ) -> RtspSessionResult<RtspResponse> {
        loop {
            let message = timeout(read_timeout, transport.recv_control()).await??;
            match message {
                RtspMessage::Response(response) => {
                    if response.headers().cseq() == Some(cseq) {
                        tracing::debug!("received rtsp response: {}", response);
                        return Ok(response);
                    }
                    tracing::debug!(
                        "skipping response with cseq {:?} while waiting for {}",
                        response.headers().cseq(),
                        cseq
                    );
                }
                RtspMessage::Request(request) => {
                    tracing::debug!("ignoring server-initiated {} request", request.method());
                }
                RtspMessage::Interleaved(packet) => {
                    tracing::warn!(
                        "interleaved packet for channel {} escaped the demultiplexer",
                        packet.channel_id
                    );
                }
                RtspMessage::NotRtsp(bytes) => {
                    tracing::warn!("{} non-rtsp bytes escaped the transport", bytes.len());
                }
            }
        }
    }

    fn expect_ok(response: &RtspResponse) -> RtspSessionResult<()> {
        match response.status() {
            RtspStatus::OK => Ok(()),
            RtspStatus::SessionNotFound => Err(RtspSessionError::SessionExpired),
            status => Err(RtspSessionError::Protocol(format!(
                "unexpected status: {}",
                status
            ))),
        }
    }

    /// The `Session` header is authoritative; ids carried inside a body are
    /// never consulted.
    fn store_session(&mut self, response: &RtspResponse) -> RtspSessionResult<()> {
        let session = response.headers().session().ok_or_else(|| {
            RtspSessionError::Protocol("SETUP response carries no Session header".to_owned())
        })?;
        self.session = Some(session);
        Ok(())
    }

    fn setup_uri(&self) -> RtspSessionResult<Url> {
        let Some(description) = &self.description else {
            return Err(RtspSessionError::Protocol(
                "SETUP needs a session description, run DESCRIBE first".to_owned(),
            ));
        };
        let Some(media) = description.media().first() else {
            return Err(RtspSessionError::Protocol(
                "session description names no media".to_owned(),
            ));
        };
        match media.control() {
            None | Some("*") => Ok(self.url.clone()),
            Some(control) if control.starts_with("rtsp://") || control.starts_with("rtspu://") => {
                Ok(control.parse()?)
            }
            Some(control) => {
                // relative control attributes append to the presentation url
                let base = self.url.as_str();
                let joined = if base.ends_with('/') {
                    format!("{}{}", base, control)
                } else {
                    format!("{}/{}", base, control)
                };
                Ok(joined.parse()?)
            }
        }
    }

    fn media_peer_ip(&self, answered: &TransportHeader) -> RtspSessionResult<IpAddr> {
        if let Some(source) = &answered.source
            && let Ok(ip) = source.parse::<IpAddr>()
        {
            return Ok(ip);
        }
        self.transport()?
            .underlying_io()
            .peer_addr()
            .map(|addr| addr.ip())
            .ok_or_else(|| {
                RtspSessionError::Protocol(
                    "cannot determine the media peer address".to_owned(),
                )
            })
    }

    fn arm_keepalive(&mut self) {
        // cancelling any prior timer before arming the new one
        self.keepalive = None;
        let Some(session) = &self.session else {
            return;
        };
        let Some(period) = keepalive_period(session.timeout_secs) else {
            return;
        };
        let Ok(transport) = self.transport().map(Arc::clone) else {
            return;
        };
        // servers that advertise a Public set without GET_PARAMETER still
        // accept OPTIONS as a refresh
        let method = match self.config.keepalive_method {
            KeepaliveMethod::GetParameter
                if !self.supported.is_empty()
                    && !self.supported.contains(&RtspMethod::GetParameter) =>
            {
                KeepaliveMethod::Options
            }
            method => method,
        };
        self.keepalive = Some(KeepAlive::spawn(
            transport,
            self.url.clone(),
            session.id.clone(),
            self.cseq.clone(),
            period,
            method,
            self.config.user_agent.clone(),
        ));
    }
}
