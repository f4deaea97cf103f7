use std::{
    fmt::Write,
    io::{self, BufRead, Read},
    str::FromStr,
};

use consts::{
    common::{LF, SPACE},
    methods::RtspMethod,
    version::RtspVersion,
};
use errors::RtspMessageError;
use interleaved::{DOLLAR_SIGN, RtspInterleavedPacket};
use request::RtspRequest;
use response::RtspResponse;
use tokio_util::{
    bytes::{Buf, BufMut, Bytes},
    codec::{Decoder, Encoder},
};
use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket,
    reader::{ReadFrom, TryReadFrom, TryReadRemainingFrom},
    writer::WriteTo,
};

pub mod consts;
pub mod errors;
pub mod header;
pub mod interleaved;
pub mod request;
pub mod response;
pub mod time;
mod util;

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Anything the control connection can carry: a request, a response, a
/// `$`-framed binary packet interleaved between them, or a line that is not
/// RTSP at all. The last one is surfaced verbatim rather than erroring so
/// the owner of the connection can re-route or discard it without losing
/// the stream.
#[derive(Debug)]
pub enum RtspMessage {
    Request(RtspRequest),
    Response(RtspResponse),
    Interleaved(RtspInterleavedPacket),
    NotRtsp(Bytes),
}

impl<R: io::BufRead> ReadFrom<R> for RtspMessage {
    type Error = RtspMessageError;
    fn read_from(mut reader: R) -> Result<Self, Self::Error> {
        let buffer = reader.fill_buf()?.to_vec();
        let (res, position) = {
            let mut cursor = io::Cursor::new(&buffer);
            (
                Self::try_read_from(cursor.by_ref())?.ok_or(
                    RtspMessageError::InvalidRtspMessageFormat(
                        "rtsp message is incomplete".to_string(),
                    ),
                ),
                cursor.position(),
            )
        };
        if res.is_ok() {
            reader.consume(position as usize);
        }
        res
    }
}

impl<R: AsRef<[u8]>> TryReadFrom<R> for RtspMessage {
    type Error = RtspMessageError;
    fn try_read_from(reader: &mut io::Cursor<R>) -> Result<Option<Self>, Self::Error> {
        if !reader.has_remaining() {
            return Ok(None);
        }

        let first_byte = reader.get_ref().as_ref()[reader.position() as usize];
        if first_byte == DOLLAR_SIGN {
            return RtspInterleavedPacket::try_read_from(reader)
                .map(|interleaved| interleaved.map(Self::Interleaved));
        }

        let (first_line, line_len) = {
            let buffer = reader.fill_buf()?;
            let Some(line_end) = buffer.iter().position(|&byte| byte == LF) else {
                return Ok(None);
            };
            (Bytes::copy_from_slice(&buffer[..=line_end]), line_end + 1)
        };
        let first_word = first_line
            .iter()
            .position(|&byte| byte == SPACE)
            .and_then(|space| std::str::from_utf8(&first_line[..space]).ok());
        if let Some(first_word) = first_word {
            if let Ok(method) = RtspMethod::from_str(first_word) {
                reader.consume(first_word.len());
                return RtspRequest::try_read_remaining_from(method, reader)
                    .map(|req| req.map(Self::Request));
            }

            if let Ok(version) = RtspVersion::from_str(first_word) {
                reader.consume(first_word.len());
                return RtspResponse::try_read_remaining_from(version, reader)
                    .map(|res| res.map(Self::Response));
            }
        }

        // no RTSP start-line prefix: not a grammar error, this stream just
        // carries something else here
        reader.consume(line_len);
        Ok(Some(Self::NotRtsp(first_line)))
    }
}

impl<W: io::Write> WriteTo<W> for RtspMessage {
    type Error = RtspMessageError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        match self {
            Self::Request(req) => write!(writer, "{}", req)?,
            Self::Response(res) => write!(writer, "{}", res)?,
            Self::Interleaved(interleaved) => interleaved.write_to(writer)?,
            Self::NotRtsp(bytes) => writer.write_all(bytes)?,
        }
        Ok(())
    }
}

impl DynamicSizedPacket for RtspMessage {
    fn get_packet_bytes_count(&self) -> usize {
        match self {
            Self::Request(req) => req.to_string().len(),
            Self::Response(res) => res.to_string().len(),
            Self::Interleaved(interleaved) => interleaved.get_packet_bytes_count(),
            Self::NotRtsp(bytes) => bytes.len(),
        }
    }
}

/// tokio-util codec for the control connection. Oversize buffers that still
/// hold no complete message are rejected instead of growing without bound.
#[derive(Debug)]
pub struct RtspMessageFramed {
    max_message_bytes: usize,
}

impl RtspMessageFramed {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }
}

impl Default for RtspMessageFramed {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}

impl Encoder<RtspMessage> for RtspMessageFramed {
    type Error = RtspMessageError;

    fn encode(
        &mut self,
        item: RtspMessage,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        match &item {
            RtspMessage::Request(req) => dst.write_fmt(format_args!("{}", req))?,
            RtspMessage::Response(res) => dst.write_fmt(format_args!("{}", res))?,
            RtspMessage::Interleaved(interleaved) => interleaved.write_to(&mut dst.writer())?,
            RtspMessage::NotRtsp(bytes) => dst.extend_from_slice(bytes),
        }
        Ok(())
    }
}

impl Decoder for RtspMessageFramed {
    type Error = RtspMessageError;
    type Item = RtspMessage;

    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        let (res, position) = {
            let mut cursor = io::Cursor::new(&src);
            let res = RtspMessage::try_read_from(cursor.by_ref());
            (res, cursor.position())
        };
        match res {
            Ok(Some(message)) => {
                src.advance(position as usize);
                Ok(Some(message))
            }
            Ok(None) => {
                if src.len() > self.max_message_bytes {
                    return Err(RtspMessageError::MessageTooLarge(src.len()));
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::bytes::BytesMut;

    use super::*;
    use crate::header::RtspHeader;

    #[test]
    fn response_then_interleaved_frame_from_one_buffer() {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n$\x00\x00\x04\xDE\xAD\xBE\xEF";
        let mut cursor = io::Cursor::new(&wire[..]);

        let first = RtspMessage::try_read_from(&mut cursor).unwrap().unwrap();
        let RtspMessage::Response(response) = first else {
            panic!("expected a response, got {:?}", first);
        };
        assert_eq!(response.headers().cseq(), Some(4));

        let second = RtspMessage::try_read_from(&mut cursor).unwrap().unwrap();
        let RtspMessage::Interleaved(packet) = second else {
            panic!("expected an interleaved packet, got {:?}", second);
        };
        assert_eq!(packet.channel_id, 0);
        assert_eq!(packet.payload.as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn codec_decodes_incrementally() {
        let mut codec = RtspMessageFramed::default();
        let mut buffer = BytesMut::from(&b"OPTIONS rtsp://example.com/stream RTSP/1.0\r\nCSeq: 1"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"\r\n\r\n");
        let message = codec.decode(&mut buffer).unwrap().unwrap();
        let RtspMessage::Request(request) = message else {
            panic!("expected a request, got {:?}", message);
        };
        assert_eq!(request.method(), RtspMethod::Options);
        assert_eq!(request.headers().cseq(), Some(1));
        assert!(buffer.is_empty());
    }

    #[test]
    fn codec_round_trips_a_request() {
        let request = RtspRequest::builder()
            .method(RtspMethod::Describe)
            .uri("rtsp://example.com/stream".parse().unwrap())
            .header(RtspHeader::CSeq, "2")
            .header(RtspHeader::Accept, "application/sdp")
            .build()
            .unwrap();
        let rendered = request.to_string();

        let mut codec = RtspMessageFramed::default();
        let mut buffer = BytesMut::new();
        codec
            .encode(RtspMessage::Request(request), &mut buffer)
            .unwrap();
        assert_eq!(buffer.as_ref(), rendered.as_bytes());

        let decoded = codec.decode(&mut buffer).unwrap().unwrap();
        let RtspMessage::Request(decoded) = decoded else {
            panic!("expected a request, got {:?}", decoded);
        };
        assert_eq!(decoded.to_string(), rendered);
    }

    #[test]
    fn non_rtsp_line_is_surfaced_without_poisoning_the_stream() {
        let mut codec = RtspMessageFramed::default();
        let mut buffer = BytesMut::from(
            &b"GET / HTTP/1.1\r\nOPTIONS rtsp://example.com/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n"[..],
        );

        let first = codec.decode(&mut buffer).unwrap().unwrap();
        let RtspMessage::NotRtsp(bytes) = first else {
            panic!("expected a not-rtsp passthrough, got {:?}", first);
        };
        assert_eq!(bytes.as_ref(), b"GET / HTTP/1.1\r\n");

        // the stream keeps decoding after the stray line
        let second = codec.decode(&mut buffer).unwrap().unwrap();
        let RtspMessage::Request(request) = second else {
            panic!("expected a request, got {:?}", second);
        };
        assert_eq!(request.method(), RtspMethod::Options);
        assert!(buffer.is_empty());
    }

    #[test]
    fn binary_garbage_line_passes_through_losslessly() {
        let wire = [0x01, 0xFF, 0xFE, b'\n'];
        let mut codec = RtspMessageFramed::default();
        let mut buffer = BytesMut::from(&wire[..]);
        let message = codec.decode(&mut buffer).unwrap().unwrap();
        let RtspMessage::NotRtsp(bytes) = message else {
            panic!("expected a not-rtsp passthrough, got {:?}", message);
        };
        assert_eq!(bytes.as_ref(), &wire);
    }

    #[test]
    fn malformed_rtsp_start_line_is_fatal() {
        // a recognized method with a truncated start line is a grammar error,
        // not foreign traffic
        let mut codec = RtspMessageFramed::default();
        let mut buffer = BytesMut::from(&b"DESCRIBE rtsp://example.com/stream\r\n\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(RtspMessageError::BadStartLine(_))
        ));
    }

    #[test]
    fn oversize_incomplete_message_is_rejected() {
        let mut codec = RtspMessageFramed::new(64);
        let mut buffer = BytesMut::from(&b"DESCRIBE rtsp://example.com/stream RTSP/1.0\r\nX-Filler: "[..]);
        buffer.extend_from_slice(&vec![b'a'; 128]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(RtspMessageError::MessageTooLarge(_))
        ));
    }
}
