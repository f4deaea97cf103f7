use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use rtsp_formats::{
    DEFAULT_MAX_MESSAGE_BYTES, RtspMessage, RtspMessageFramed,
    consts::{methods::RtspMethod, status::RtspStatus},
    header::{RtspHeader, auth::BasicCredential},
    interleaved::RtspInterleavedPacket,
    request::RtspRequest,
    response::{RtspResponse, builder::RtspResponseBuilder},
    time::npt::Npt,
};
use rtsp_session::{
    client::{ClientState, RtspClient},
    config::{PreferredTransport, RtspClientConfig},
    errors::RtspSessionError,
    rtp_channel::{RtpChannelEvent, RtpChannelVariant},
    transport::{ControlTransport, InterleavedBinding},
};
use tokio::{io::AsyncWriteExt, sync::mpsc};
use unified_io::{UnifiedStreamed, channel::ChannelIo};

const SDP: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=cam\r\n\
t=0 0\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:track1\r\n";

/// The far side of the control connection, driven line by line by each test.
/// Asserts that client CSeq numbers only ever go up (until a test resets the
/// watermark after TEARDOWN).
struct ScriptedPeer {
    io: UnifiedStreamed<RtspMessageFramed>,
    last_cseq: u32,
}

impl ScriptedPeer {
    fn over(io: ChannelIo) -> Self {
        Self {
            io: UnifiedStreamed::new(Box::pin(io), RtspMessageFramed::default()),
            last_cseq: 0,
        }
    }

    async fn expect_request(&mut self, method: RtspMethod) -> RtspRequest {
        match self
            .io
            .next()
            .await
            .expect("peer stream ended")
            .expect("peer failed to decode")
        {
            RtspMessage::Request(request) => {
                assert_eq!(request.method(), method);
                let cseq = request.headers().cseq().expect("request without CSeq");
                assert!(
                    cseq > self.last_cseq,
                    "cseq went from {} to {}",
                    self.last_cseq,
                    cseq
                );
                self.last_cseq = cseq;
                request
            }
            other => panic!("peer expected a {} request, got {:?}", method, other),
        }
    }

    async fn reply(
        &mut self,
        request: &RtspRequest,
        build: impl FnOnce(RtspResponseBuilder) -> RtspResponseBuilder,
    ) {
        let builder = RtspResponse::builder().status(RtspStatus::OK).header(
            RtspHeader::CSeq,
            request.headers().cseq().unwrap().to_string(),
        );
        let response = build(builder).build().unwrap();
        self.io
            .send(RtspMessage::Response(response))
            .await
            .unwrap();
    }

    async fn send(&mut self, message: RtspMessage) {
        self.io.send(message).await.unwrap();
    }
}

fn udp_client(io: ChannelIo) -> RtspClient {
    let mut client = RtspClient::new(
        "rtsp://h/stream".parse().unwrap(),
        RtspClientConfig::default(),
    );
    client.connect_io(Box::pin(io));
    client
}

fn tcp_client(io: ChannelIo) -> RtspClient {
    let config = RtspClientConfig {
        preferred_transport: PreferredTransport::Tcp,
        ..Default::default()
    };
    let mut client = RtspClient::new("rtsp://h/stream".parse().unwrap(), config);
    client.connect_io(Box::pin(io));
    client
}

async fn run_options_describe(peer: &mut ScriptedPeer) {
    let options = peer.expect_request(RtspMethod::Options).await;
    peer.reply(&options, |b| {
        b.header(RtspHeader::Public, "OPTIONS,DESCRIBE,SETUP,PLAY,TEARDOWN")
    })
    .await;

    let describe = peer.expect_request(RtspMethod::Describe).await;
    assert_eq!(
        describe
            .headers()
            .get_unique(RtspHeader::Accept)
            .map(String::as_str),
        Some("application/sdp")
    );
    peer.reply(&describe, |b| {
        b.header(RtspHeader::ContentType, "application/sdp")
            .body(SDP.to_owned())
    })
    .await;
}

#[tokio::test]
async fn udp_happy_path() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        let setup = peer.expect_request(RtspMethod::Setup).await;
        assert!(setup.uri().as_str().ends_with("/track1"));
        let transport = setup.headers().transport().unwrap();
        let (rtp, rtcp) = transport.client_port.unwrap();
        assert!(rtp >= 15000);
        assert_eq!(rtp % 2, 0);
        assert_eq!(rtcp, rtp + 1);
        peer.reply(&setup, |b| {
            b.header(RtspHeader::Session, "12345678;timeout=60").header(
                RtspHeader::Transport,
                format!(
                    "RTP/AVP;unicast;source=127.0.0.1;client_port={}-{};server_port=30000-30001;ssrc=1A2B3C4D",
                    rtp, rtcp
                ),
            )
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        assert_eq!(
            play.headers()
                .get_unique(RtspHeader::Range)
                .map(String::as_str),
            Some("npt=0-")
        );
        assert_eq!(
            play.headers().session().map(|session| session.id),
            Some("12345678".to_owned())
        );
        peer.reply(&play, |b| {
            b.header(
                RtspHeader::RtpInfo,
                "url=rtsp://h/stream/track1;seqno=17;rtptime=900000",
            )
            .header(RtspHeader::Range, "npt=0-")
        })
        .await;
    });

    client.start().await.unwrap();

    assert_eq!(client.state(), ClientState::Playing);
    assert_eq!(client.session_id(), Some("12345678"));
    assert_eq!(client.session_timeout_secs(), Some(60));
    assert_eq!(client.ssrc(), Some(0x1A2B_3C4D));
    assert_eq!(client.start_sequence(), Some(17));
    assert_eq!(client.start_rtptime(), Some(900_000));
    assert!(client.keepalive_armed());
    assert_eq!(
        client.channel_variant(),
        Some(RtpChannelVariant::UdpReceiver)
    );
    assert_eq!(client.supported_methods().len(), 5);
    let negotiated = client.negotiated_transport().unwrap();
    assert_eq!(negotiated.server_port, Some((30000, 30001)));
    assert!(negotiated.interleaved.is_none());
    let (sent, received) = client.control_stats().unwrap();
    assert!(sent > 0);
    assert!(received > 0);

    peer.await.unwrap();
}

#[tokio::test]
async fn basic_credentials_are_attached() {
    let (client_io, peer_io) = ChannelIo::pair();
    let config = RtspClientConfig {
        credential: Some(BasicCredential::new("user", "pass")),
        ..Default::default()
    };
    let mut client = RtspClient::new("rtsp://h/stream".parse().unwrap(), config);
    client.connect_io(Box::pin(client_io));

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        let options = peer.expect_request(RtspMethod::Options).await;
        assert_eq!(
            options
                .headers()
                .get_unique(RtspHeader::Authorization)
                .map(String::as_str),
            Some("Basic dXNlcjpwYXNz")
        );
        peer.reply(&options, |b| b.header(RtspHeader::Public, "OPTIONS"))
            .await;
    });

    client.options().await.unwrap();
    peer.await.unwrap();
}

#[tokio::test]
async fn tcp_fallback_mid_setup() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        // first SETUP asks for udp; steer it onto the control connection
        let first_setup = peer.expect_request(RtspMethod::Setup).await;
        let transport = first_setup.headers().transport().unwrap();
        assert!(transport.client_port.is_some());
        peer.reply(&first_setup, |b| {
            b.header(RtspHeader::Session, "42;timeout=60")
                .header(RtspHeader::Transport, "RTP/AVP/TCP;interleaved=0-1")
        })
        .await;

        // the re-issued SETUP must ask for interleaved transport and keep
        // the session id it was just handed
        let second_setup = peer.expect_request(RtspMethod::Setup).await;
        let transport = second_setup.headers().transport().unwrap();
        assert_eq!(transport.interleaved, Some((0, 1)));
        assert!(transport.client_port.is_none());
        assert_eq!(
            second_setup.headers().session().map(|session| session.id),
            Some("42".to_owned())
        );
        peer.reply(&second_setup, |b| {
            b.header(RtspHeader::Session, "42;timeout=60").header(
                RtspHeader::Transport,
                "RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=CAFEBABE",
            )
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        peer.reply(&play, |b| b.header(RtspHeader::Range, "npt=0-"))
            .await;
    });

    client.start().await.unwrap();

    assert_eq!(client.state(), ClientState::Playing);
    assert_eq!(
        client.channel_variant(),
        Some(RtpChannelVariant::Interleaved)
    );
    let negotiated = client.negotiated_transport().unwrap();
    assert_eq!(negotiated.interleaved, Some((0, 1)));
    assert!(negotiated.client_port.is_none());
    assert_eq!(negotiated.ssrc, Some(0xCAFE_BABE));

    peer.await.unwrap();
}

#[tokio::test]
async fn session_expiry_is_recovered_once() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        let setup = peer.expect_request(RtspMethod::Setup).await;
        let transport = setup.headers().transport().unwrap();
        let (rtp, rtcp) = transport.client_port.unwrap();
        peer.reply(&setup, |b| {
            b.header(RtspHeader::Session, "stale;timeout=60").header(
                RtspHeader::Transport,
                format!(
                    "RTP/AVP;unicast;source=127.0.0.1;client_port={}-{};server_port=30000-30001",
                    rtp, rtcp
                ),
            )
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        peer.reply(&play, |b| b.status(RtspStatus::SessionNotFound))
            .await;

        // the client rebuilds the session from DESCRIBE once
        let describe = peer.expect_request(RtspMethod::Describe).await;
        assert!(!describe.headers().contains(RtspHeader::Session));
        peer.reply(&describe, |b| {
            b.header(RtspHeader::ContentType, "application/sdp")
                .body(SDP.to_owned())
        })
        .await;

        let setup = peer.expect_request(RtspMethod::Setup).await;
        let transport = setup.headers().transport().unwrap();
        let (rtp, rtcp) = transport.client_port.unwrap();
        peer.reply(&setup, |b| {
            b.header(RtspHeader::Session, "fresh;timeout=60").header(
                RtspHeader::Transport,
                format!(
                    "RTP/AVP;unicast;source=127.0.0.1;client_port={}-{};server_port=30000-30001",
                    rtp, rtcp
                ),
            )
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        assert_eq!(
            play.headers().session().map(|session| session.id),
            Some("fresh".to_owned())
        );
        peer.reply(&play, |b| b.header(RtspHeader::Range, "npt=0-"))
            .await;
    });

    client.start().await.unwrap();
    assert_eq!(client.state(), ClientState::Playing);
    assert_eq!(client.session_id(), Some("fresh"));

    peer.await.unwrap();
}

#[tokio::test]
async fn second_session_expiry_is_fatal() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        for session_id in ["one", "two"] {
            let setup = peer.expect_request(RtspMethod::Setup).await;
            let transport = setup.headers().transport().unwrap();
            let (rtp, rtcp) = transport.client_port.unwrap();
            peer.reply(&setup, |b| {
                b.header(
                    RtspHeader::Session,
                    format!("{};timeout=60", session_id),
                )
                .header(
                    RtspHeader::Transport,
                    format!(
                        "RTP/AVP;unicast;source=127.0.0.1;client_port={}-{};server_port=30000-30001",
                        rtp, rtcp
                    ),
                )
            })
            .await;

            let play = peer.expect_request(RtspMethod::Play).await;
            peer.reply(&play, |b| b.status(RtspStatus::SessionNotFound))
                .await;

            if session_id == "one" {
                let describe = peer.expect_request(RtspMethod::Describe).await;
                peer.reply(&describe, |b| {
                    b.header(RtspHeader::ContentType, "application/sdp")
                        .body(SDP.to_owned())
                })
                .await;
            }
        }
    });

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, RtspSessionError::SessionExpired));

    peer.await.unwrap();
}

#[tokio::test]
async fn interleaved_bytes_are_demultiplexed_from_control_reads() {
    let (near, mut far) = ChannelIo::pair();
    let transport = Arc::new(ControlTransport::new(
        Box::pin(near),
        DEFAULT_MAX_MESSAGE_BYTES,
    ));
    let (tx, mut rx) = mpsc::channel(8);
    transport.bind_interleaved(0, InterleavedBinding::Rtp(tx));

    far.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n$\x00\x00\x04\xDE\xAD\xBE\xEF")
        .await
        .unwrap();

    let message = transport.recv_control().await.unwrap();
    let RtspMessage::Response(response) = message else {
        panic!("expected the response first, got {:?}", message);
    };
    assert_eq!(response.headers().cseq(), Some(4));

    // the frame behind the response is routed on the next control read
    let pump = {
        let transport = transport.clone();
        tokio::spawn(async move {
            let _ = transport.recv_control().await;
        })
    };
    let event = rx.recv().await.unwrap();
    let RtpChannelEvent::Rtp(payload) = event else {
        panic!("expected an rtp event, got {:?}", event);
    };
    assert_eq!(payload.as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    pump.abort();
}

#[tokio::test]
async fn non_rtsp_bytes_do_not_kill_the_control_connection() {
    let (near, mut far) = ChannelIo::pair();
    let transport = ControlTransport::new(Box::pin(near), DEFAULT_MAX_MESSAGE_BYTES);

    // a stray foreign line ahead of a real response is dropped, not fatal
    far.write_all(b"SIP/2.0 200 OK\r\nRTSP/1.0 200 OK\r\nCSeq: 9\r\n\r\n")
        .await
        .unwrap();

    let message = transport.recv_control().await.unwrap();
    let RtspMessage::Response(response) = message else {
        panic!("expected the rtsp response, got {:?}", message);
    };
    assert_eq!(response.headers().cseq(), Some(9));
}

#[tokio::test]
async fn malformed_description_leaves_the_connection_usable() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        let options = peer.expect_request(RtspMethod::Options).await;
        peer.reply(&options, |b| b.header(RtspHeader::Public, "OPTIONS,DESCRIBE"))
            .await;

        let describe = peer.expect_request(RtspMethod::Describe).await;
        peer.reply(&describe, |b| {
            b.header(RtspHeader::ContentType, "application/sdp")
                .body("this is not sdp".to_owned())
        })
        .await;

        // no SETUP may follow; the next request is the manual OPTIONS probe
        let options = peer.expect_request(RtspMethod::Options).await;
        peer.reply(&options, |b| b.header(RtspHeader::Public, "OPTIONS,DESCRIBE"))
            .await;
    });

    client.options().await.unwrap();
    let err = client.describe().await.unwrap_err();
    let RtspSessionError::Protocol(message) = err else {
        panic!("expected a protocol error, got {:?}", err);
    };
    assert_eq!(message, "invalid session description");
    assert_eq!(client.state(), ClientState::Connected);

    // the control socket stayed open
    client.options().await.unwrap();

    peer.await.unwrap();
}

#[tokio::test]
async fn rtcp_bye_tears_the_session_down() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = tcp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        let setup = peer.expect_request(RtspMethod::Setup).await;
        peer.reply(&setup, |b| {
            b.header(RtspHeader::Session, "77;timeout=60")
                .header(RtspHeader::Transport, "RTP/AVP/TCP;unicast;interleaved=0-1")
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        peer.reply(&play, |b| b.header(RtspHeader::Range, "npt=0-"))
            .await;

        // one media frame, then goodbye on the rtcp channel
        peer.send(RtspMessage::Interleaved(
            RtspInterleavedPacket::builder()
                .channel(0)
                .payload(&[0x80, 0x60, 0x00, 0x01])
                .build(),
        ))
        .await;
        peer.send(RtspMessage::Interleaved(
            RtspInterleavedPacket::builder()
                .channel(1)
                .payload(&[0x81, 0xCB, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02])
                .build(),
        ))
        .await;

        let teardown = peer.expect_request(RtspMethod::TearDown).await;
        assert_eq!(
            teardown.headers().session().map(|session| session.id),
            Some("77".to_owned())
        );
        peer.reply(&teardown, |b| b).await;
    });

    client.start().await.unwrap();
    assert_eq!(client.state(), ClientState::Playing);

    let event = client.next_event().await.unwrap().unwrap();
    let RtpChannelEvent::Rtp(payload) = event else {
        panic!("expected the rtp frame first, got {:?}", event);
    };
    assert_eq!(payload.as_ref(), &[0x80, 0x60, 0x00, 0x01]);

    let err = client.next_event().await.unwrap_err();
    assert!(matches!(err, RtspSessionError::PeerClosed));
    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(client.session_id(), None);
    assert!(!client.keepalive_armed());
    assert!(client.channel_variant().is_none());

    peer.await.unwrap();
}

#[tokio::test]
async fn teardown_clears_identity_and_resets_cseq() {
    let (client_io, peer_io) = ChannelIo::pair();
    let mut client = udp_client(client_io);

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::over(peer_io);
        run_options_describe(&mut peer).await;

        let setup = peer.expect_request(RtspMethod::Setup).await;
        let transport = setup.headers().transport().unwrap();
        let (rtp, rtcp) = transport.client_port.unwrap();
        peer.reply(&setup, |b| {
            b.header(RtspHeader::Session, "99;timeout=60").header(
                RtspHeader::Transport,
                format!(
                    "RTP/AVP;unicast;source=127.0.0.1;client_port={}-{};server_port=30000-30001",
                    rtp, rtcp
                ),
            )
        })
        .await;

        let play = peer.expect_request(RtspMethod::Play).await;
        peer.reply(&play, |b| b.header(RtspHeader::Range, "npt=0-"))
            .await;

        let pause = peer.expect_request(RtspMethod::Pause).await;
        assert!(pause.headers().contains(RtspHeader::Session));
        peer.reply(&pause, |b| b.header(RtspHeader::Range, "npt=12.5-"))
            .await;

        let teardown = peer.expect_request(RtspMethod::TearDown).await;
        assert!(teardown.headers().contains(RtspHeader::Session));
        peer.reply(&teardown, |b| b).await;

        // a fresh chain on the same socket starts over at CSeq 1
        peer.last_cseq = 0;
        let options = peer.expect_request(RtspMethod::Options).await;
        assert_eq!(options.headers().cseq(), Some(1));
        assert!(!options.headers().contains(RtspHeader::Session));
        peer.reply(&options, |b| b.header(RtspHeader::Public, "OPTIONS"))
            .await;
    });

    client.options().await.unwrap();
    client.describe().await.unwrap();
    client.setup().await.unwrap();
    assert_eq!(client.state(), ClientState::Ready);
    assert_eq!(client.session_id(), Some("99"));

    client.play().await.unwrap();
    assert_eq!(client.state(), ClientState::Playing);
    assert!(client.keepalive_armed());

    client.pause().await.unwrap();
    assert_eq!(client.state(), ClientState::Ready);
    assert_eq!(client.resume_point(), Npt::Seconds(12.5));

    client.teardown().await.unwrap();
    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(client.session_id(), None);
    assert!(!client.keepalive_armed());

    client.options().await.unwrap();

    peer.await.unwrap();
}
