#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use utils::traits::reader::{ReadFrom, TryReadFrom};

    use crate::{
        consts::{status::RtspStatus, version::RtspVersion},
        header::RtspHeader,
        response::RtspResponse,
    };

    #[test]
    fn options_ok() {
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .version(RtspVersion::V1)
            .header(RtspHeader::CSeq, "1")
            .header(RtspHeader::Public, "OPTIONS,DESCRIBE,SETUP,PLAY,TEARDOWN")
            .build();
        assert!(response.is_ok());

        let text = "RTSP/1.0 200 OK\r\n\
CSeq: 1\r\n\
Public: OPTIONS,DESCRIBE,SETUP,PLAY,TEARDOWN\r\n\r\n";
        assert_eq!(text.trim_end(), format!("{}", response.unwrap()).trim_end());

        let parsed = RtspResponse::read_from(&mut text.as_bytes());
        assert!(parsed.is_ok());
        let parsed = parsed.unwrap();
        assert_eq!(text.trim_end(), format!("{}", parsed).trim_end());
        assert_eq!(parsed.status(), RtspStatus::OK);
        assert_eq!(parsed.headers().public().len(), 5);
    }

    #[test]
    fn setup_ok_with_session_and_transport() {
        let text = "RTSP/1.0 200 OK\r\n\
CSeq: 3\r\n\
Session: 12345678;timeout=60\r\n\
Transport: RTP/AVP;unicast;client_port=15000-15001;server_port=30000-30001;ssrc=1A2B3C4D\r\n\r\n";
        let parsed = RtspResponse::read_from(&mut text.as_bytes()).unwrap();
        let session = parsed.headers().session().unwrap();
        assert_eq!(session.id, "12345678");
        assert_eq!(session.timeout_secs, 60);
        let transport = parsed.headers().transport().unwrap();
        assert_eq!(transport.server_port, Some((30000, 30001)));
        assert_eq!(transport.ssrc, Some(0x1A2B_3C4D));
    }

    #[test]
    fn describe_ok_with_sdp_body() {
        let body = "v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=stream\r\nm=video 0 RTP/AVP 96\r\n";
        let response = RtspResponse::builder()
            .status(RtspStatus::OK)
            .version(RtspVersion::V1)
            .header(RtspHeader::CSeq, "2")
            .header(RtspHeader::ContentType, "application/sdp")
            .body(body.to_owned())
            .build()
            .unwrap();
        assert_eq!(
            response.headers().content_length(),
            Some(body.len())
        );

        let text = format!("{}", response);
        let parsed = RtspResponse::read_from(&mut text.as_bytes()).unwrap();
        assert_eq!(parsed.body().unwrap(), body);
    }

    #[test]
    fn session_not_found() {
        let text = "RTSP/1.0 454 Session Not Found\r\nCSeq: 5\r\n\r\n";
        let parsed = RtspResponse::read_from(&mut text.as_bytes()).unwrap();
        assert_eq!(parsed.status(), RtspStatus::SessionNotFound);
    }

    #[test]
    fn reason_phrase_is_not_load_bearing() {
        let text = "RTSP/1.0 454 Whatever The Server Says\r\nCSeq: 5\r\n\r\n";
        let parsed = RtspResponse::read_from(&mut text.as_bytes()).unwrap();
        assert_eq!(parsed.status(), RtspStatus::SessionNotFound);
    }

    #[test]
    fn incomplete_status_line() {
        let text = "RTSP/1.0 200";
        let mut cursor = io::Cursor::new(text.as_bytes());
        let parsed = RtspResponse::try_read_from(cursor.by_ref());
        assert!(parsed.is_ok());
        assert!(parsed.unwrap().is_none());
    }

    #[test]
    fn play_ok_with_rtp_info_and_range() {
        let text = "RTSP/1.0 200 OK\r\n\
CSeq: 4\r\n\
Session: 12345678\r\n\
RTP-Info: url=rtsp://h/track1;seqno=17;rtptime=900000\r\n\
Range: npt=0-\r\n\r\n";
        let parsed = RtspResponse::read_from(&mut text.as_bytes()).unwrap();
        let rtp_info = parsed.headers().rtp_info().unwrap();
        assert_eq!(rtp_info.first_seq(), Some(17));
        assert_eq!(rtp_info.first_rtptime(), Some(900_000));
        let range = parsed.headers().range().unwrap();
        assert_eq!(format!("{}", range), "npt=0-");
    }
}
