use sdp_formats::session::SessionDescription;
use tokio::sync::broadcast;
use tokio_util::bytes::Bytes;

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum SourcePacket {
    Rtp(Bytes),
    Rtcp(Bytes),
}

/// The upstream feed a server serves to its peers: a description of the
/// media plus a broadcast of its RTP/RTCP packets. How the packets are
/// produced is not this crate's business; the ingest side publishes into
/// this handle.
#[derive(Debug, Clone)]
pub struct MediaSource {
    description: SessionDescription,
    feed: broadcast::Sender<SourcePacket>,
}

impl MediaSource {
    pub fn new(description: SessionDescription) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { description, feed }
    }

    pub fn description(&self) -> &SessionDescription {
        &self.description
    }

    pub fn publish_rtp(&self, packet: Bytes) {
        let _ = self.feed.send(SourcePacket::Rtp(packet));
    }

    pub fn publish_rtcp(&self, packet: Bytes) {
        let _ = self.feed.send(SourcePacket::Rtcp(packet));
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SourcePacket> {
        self.feed.subscribe()
    }
}
