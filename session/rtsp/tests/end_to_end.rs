use rtsp_session::{
    SERVER_AGENT,
    client::{ClientState, RtspClient},
    config::{PreferredTransport, RtspClientConfig, RtspServerConfig},
    errors::RtspSessionError,
    rtp_channel::{RtpChannelEvent, RtpChannelVariant},
    server_session::RtspServerSession,
    source::MediaSource,
};
use tokio_util::bytes::Bytes;
use unified_io::channel::ChannelIo;

const UPSTREAM_SDP: &str = "v=0\r\n\
o=- 2890844526 2890842807 IN IP4 192.0.2.5\r\n\
s=ingest\r\n\
t=0 0\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:track1\r\n";

fn interleaved_client(io: ChannelIo) -> RtspClient {
    let config = RtspClientConfig {
        preferred_transport: PreferredTransport::Tcp,
        ..Default::default()
    };
    let mut client = RtspClient::new("rtsp://relay.local/stream".parse().unwrap(), config);
    client.connect_io(Box::pin(io));
    client
}

#[tokio::test]
async fn client_streams_from_server_session_over_one_connection() {
    let (client_io, server_io) = ChannelIo::pair();
    let source = MediaSource::new(UPSTREAM_SDP.parse().unwrap());
    let mut server = RtspServerSession::new(
        RtspServerConfig::default(),
        source.clone(),
        Box::pin(server_io),
    );
    let server_task = tokio::spawn(async move {
        server.run().await.unwrap();
        server
    });

    let mut client = interleaved_client(client_io);
    client.start().await.unwrap();

    assert_eq!(client.state(), ClientState::Playing);
    assert_eq!(
        client.channel_variant(),
        Some(RtpChannelVariant::Interleaved)
    );
    assert!(client.session_id().is_some());
    assert!(client.ssrc().is_some());

    // the DESCRIBE answer was rewritten per peer: fresh origin and a fixed
    // session name, media lines untouched
    let description = client.description().unwrap();
    assert_eq!(description.session_name(), SERVER_AGENT);
    assert_ne!(description.origin(), "- 2890844526 2890842807 IN IP4 192.0.2.5");
    assert!(description.origin().starts_with("- "));
    assert_eq!(description.media().len(), 1);
    assert_eq!(description.media()[0].control(), Some("track1"));

    // media published upstream arrives through the interleaved channel
    source.publish_rtp(Bytes::from_static(&[0x80, 0x60, 0x12, 0x34]));
    let event = client.next_event().await.unwrap().unwrap();
    let RtpChannelEvent::Rtp(payload) = event else {
        panic!("expected an rtp event, got {:?}", event);
    };
    assert_eq!(payload.as_ref(), &[0x80, 0x60, 0x12, 0x34]);

    // an empty GET_PARAMETER is a pure refresh, answered with no body
    assert!(client.get_parameter(None).await.unwrap().is_none());

    // the session serves its forwarding counters as parameters
    let body = client
        .get_parameter(Some("packets_sent"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body, "packets_sent: 1");
    let body = client
        .get_parameter(Some("bytes_sent"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body, "bytes_sent: 4");

    // unknown names are not understood
    let err = client.get_parameter(Some("jitter")).await.unwrap_err();
    let RtspSessionError::Protocol(message) = err else {
        panic!("expected a protocol error, got {:?}", err);
    };
    assert!(message.contains("451"));

    // the counters are read-only; the assignment is refused and has no
    // effect (the stats assertions below still see the original values)
    let err = client.set_parameter("packets_sent", "0").await.unwrap_err();
    let RtspSessionError::Protocol(message) = err else {
        panic!("expected a protocol error, got {:?}", err);
    };
    assert!(message.contains("458"));

    // graceful shutdown ends both sides
    client.teardown().await.unwrap();
    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(client.session_id(), None);

    let server = server_task.await.unwrap();
    assert_eq!(server.session_id(), None);
    assert_eq!(server.sender_stats().packets, 1);
    assert_eq!(server.sender_stats().bytes, 4);
}

#[tokio::test]
async fn source_bye_terminates_the_peer_session() {
    let (client_io, server_io) = ChannelIo::pair();
    let source = MediaSource::new(UPSTREAM_SDP.parse().unwrap());
    let mut server = RtspServerSession::new(
        RtspServerConfig::default(),
        source.clone(),
        Box::pin(server_io),
    );
    let server_task = tokio::spawn(async move { server.run().await });

    let mut client = interleaved_client(client_io);
    client.start().await.unwrap();

    // the goodbye is forwarded downstream before the peer session ends
    source.publish_rtcp(Bytes::from_static(&[0x81, 0xCB, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]));
    server_task.await.unwrap().unwrap();

    let err = client.next_event().await.unwrap_err();
    assert!(matches!(err, RtspSessionError::PeerClosed));
    assert_eq!(client.state(), ClientState::Closed);
}
