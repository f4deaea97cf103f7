use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::ready;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::{bytes::Bytes, sync::PollSender};

use crate::UnifiedIO;

const PAIR_CHANNEL_CAPACITY: usize = 64;

/// In-memory byte stream over a pair of mpsc channels. Stands in for a
/// network socket wherever a session needs to be driven without one.
#[derive(Debug)]
pub struct ChannelIo {
    source: tokio::sync::mpsc::Receiver<Bytes>,
    sink: PollSender<Bytes>,
    remainder: Option<Bytes>,
}

impl ChannelIo {
    pub fn new(
        source: tokio::sync::mpsc::Receiver<Bytes>,
        sink: tokio::sync::mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            source,
            sink: PollSender::new(sink),
            remainder: None,
        }
    }

    /// Two connected endpoints; bytes written to one are read from the other.
    pub fn pair() -> (ChannelIo, ChannelIo) {
        let (left_tx, left_rx) = tokio::sync::mpsc::channel(PAIR_CHANNEL_CAPACITY);
        let (right_tx, right_rx) = tokio::sync::mpsc::channel(PAIR_CHANNEL_CAPACITY);
        (
            ChannelIo::new(left_rx, right_tx),
            ChannelIo::new(right_rx, left_tx),
        )
    }
}

impl UnifiedIO for ChannelIo {
    fn get_underlying_io(&self) -> crate::UnderlyingIO {
        crate::UnderlyingIO::Channel
    }
}

impl AsyncRead for ChannelIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut chunk = match self.remainder.take() {
            Some(chunk) => chunk,
            None => match ready!(self.source.poll_recv(cx)) {
                Some(chunk) => chunk,
                // sender side dropped: clean EOF
                None => return Poll::Ready(Ok(())),
            },
        };
        let take = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk.split_to(take));
        if !chunk.is_empty() {
            self.remainder = Some(chunk);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ChannelIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        ready!(self.sink.poll_reserve(cx)).map_err(io::Error::other)?;
        self.sink
            .send_item(Bytes::copy_from_slice(buf))
            .map_err(io::Error::other)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.sink.close();
        Poll::Ready(Ok(()))
    }
}
