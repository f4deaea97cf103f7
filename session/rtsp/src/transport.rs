use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{
        Mutex as StdMutex,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rtsp_formats::{RtspMessage, RtspMessageFramed, interleaved::RtspInterleavedPacket};
use tokio::sync::{Mutex, mpsc, mpsc::error::SendError};
use tokio_util::bytes::Bytes;
use unified_io::{UnderlyingIO, UnifiedIO, UnifiedStreamed};
use utils::traits::dynamic_sized_packet::DynamicSizedPacket;

use crate::{
    errors::{RtspSessionError, RtspSessionResult},
    rtp_channel::RtpChannelEvent,
};

/// Which media sub-stream a bound interleaved channel id feeds.
#[derive(Debug, Clone)]
pub enum InterleavedBinding {
    Rtp(mpsc::Sender<RtpChannelEvent>),
    Rtcp(mpsc::Sender<RtpChannelEvent>),
}

impl InterleavedBinding {
    async fn deliver(&self, payload: Bytes) -> Result<(), SendError<RtpChannelEvent>> {
        match self {
            Self::Rtp(sink) => sink.send(RtpChannelEvent::Rtp(payload)).await,
            Self::Rtcp(sink) => sink.send(RtpChannelEvent::Rtcp(payload)).await,
        }
    }
}

type MessageSink = SplitSink<UnifiedStreamed<RtspMessageFramed>, RtspMessage>;
type MessageStream = SplitStream<UnifiedStreamed<RtspMessageFramed>>;

/// Owner of the control connection. The read and write halves carry their
/// own locks so a keep-alive send never waits behind a blocked read, and
/// `$`-framed binary packets are peeled off to their bound sub-streams before
/// control messages reach the caller.
pub struct ControlTransport {
    writer: Mutex<MessageSink>,
    reader: Mutex<MessageStream>,
    interleaved: StdMutex<HashMap<u8, InterleavedBinding>>,
    underlying: UnderlyingIO,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl ControlTransport {
    pub fn new(io: Pin<Box<dyn UnifiedIO + Send>>, max_message_bytes: usize) -> Self {
        let streamed = UnifiedStreamed::new(io, RtspMessageFramed::new(max_message_bytes));
        let underlying = streamed.get_underlying_io();
        let (writer, reader) = streamed.split();
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            interleaved: StdMutex::new(HashMap::new()),
            underlying,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn underlying_io(&self) -> UnderlyingIO {
        self.underlying
    }

    /// Serializes and writes one message; the write lock keeps concurrent
    /// senders from interleaving partial frames.
    pub async fn send(&self, message: RtspMessage) -> RtspSessionResult<()> {
        let size = message.get_packet_bytes_count() as u64;
        self.writer.lock().await.send(message).await?;
        self.bytes_sent.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    pub async fn send_interleaved(&self, channel_id: u8, payload: Bytes) -> RtspSessionResult<()> {
        self.send(RtspMessage::Interleaved(RtspInterleavedPacket {
            channel_id,
            payload,
        }))
        .await
    }

    /// Routes subsequent interleaved packets for `channel_id` to `binding`.
    pub fn bind_interleaved(&self, channel_id: u8, binding: InterleavedBinding) {
        self.interleaved.lock().unwrap().insert(channel_id, binding);
    }

    pub fn unbind_interleaved(&self, channel_id: u8) {
        self.interleaved.lock().unwrap().remove(&channel_id);
    }

    /// Next request or response on the connection. Interleaved frames read
    /// along the way are forwarded to their bound sub-streams, and non-RTSP
    /// bytes are the transport's to re-route; with no tunnel consumer bound
    /// here they are logged and dropped, and the connection survives.
    pub async fn recv_control(&self) -> RtspSessionResult<RtspMessage> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(message)) => {
                    self.bytes_received
                        .fetch_add(message.get_packet_bytes_count() as u64, Ordering::Relaxed);
                    match message {
                        RtspMessage::Interleaved(packet) => self.route_interleaved(packet).await,
                        RtspMessage::NotRtsp(bytes) => {
                            tracing::warn!(
                                "discarding {} non-rtsp bytes on the control connection",
                                bytes.len()
                            );
                        }
                        message => return Ok(message),
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(RtspSessionError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "control connection closed",
                    )));
                }
            }
        }
    }

    async fn route_interleaved(&self, packet: RtspInterleavedPacket) {
        let binding = self
            .interleaved
            .lock()
            .unwrap()
            .get(&packet.channel_id)
            .cloned();
        match binding {
            Some(binding) => {
                if binding.deliver(packet.payload).await.is_err() {
                    tracing::warn!(
                        "interleaved channel {} receiver is gone, dropping packet",
                        packet.channel_id
                    );
                }
            }
            None => {
                tracing::debug!(
                    "dropping interleaved packet for unbound channel {}",
                    packet.channel_id
                );
            }
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}
