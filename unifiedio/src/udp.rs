use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    task::Poll,
};

use futures::{Sink, Stream, ready};
use tokio::net::UdpSocket;
use tokio_util::bytes::Bytes;

use crate::{UnifiedIOError, UnifiedIOResult};

const RECV_BUFFER_SIZE: usize = 4096;

/// A datagram endpoint with connected-socket semantics. Media flows (RTP and
/// RTCP) are carried over these; the control channel never is.
#[derive(Debug)]
pub struct UdpIO {
    inner: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
    pending_send: Option<Bytes>,
}

impl UdpIO {
    pub async fn bind(local_addr: SocketAddr) -> UnifiedIOResult<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            inner: socket,
            local_addr,
            peer_addr: None,
            pending_send: None,
        })
    }

    pub async fn new(local_addr: SocketAddr, remote_addr: SocketAddr) -> UnifiedIOResult<Self> {
        let mut io = Self::bind(local_addr).await?;
        io.connect(remote_addr).await?;
        Ok(io)
    }

    pub async fn connect(&mut self, remote_addr: SocketAddr) -> UnifiedIOResult<()> {
        self.inner.connect(remote_addr).await?;
        self.peer_addr = Some(remote_addr);
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

/// Searches for an even port `p >= search_start` such that both `p` and
/// `p + 1` are bindable, and returns the pair bound on the wildcard address
/// (RTP on the even port, RTCP on the odd one).
pub async fn find_udp_port_pair(search_start: u16) -> UnifiedIOResult<(UdpIO, UdpIO)> {
    let wildcard = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let mut port = u32::from(search_start);
    port += port & 1;
    while port + 1 <= u32::from(u16::MAX) {
        let rtp = match UdpIO::bind(SocketAddr::new(wildcard, port as u16)).await {
            Ok(io) => io,
            Err(err) => {
                tracing::trace!("port {} not bindable: {}", port, err);
                port += 2;
                continue;
            }
        };
        match UdpIO::bind(SocketAddr::new(wildcard, (port + 1) as u16)).await {
            Ok(rtcp) => return Ok((rtp, rtcp)),
            Err(err) => {
                tracing::trace!("port {} not bindable: {}", port + 1, err);
                port += 2;
            }
        }
    }
    Err(UnifiedIOError::Io(io::Error::other(format!(
        "no free udp port pair at or above {}",
        search_start
    ))))
}

impl Sink<Bytes> for UdpIO {
    type Error = std::io::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        if self.pending_send.is_some() {
            ready!(self.as_mut().poll_flush(cx))?;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        if self.pending_send.is_some() {
            return Err(io::Error::other(
                "udp sink not ready, previous send still pending",
            ));
        }
        self.pending_send = Some(item);
        Ok(())
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        if let Some(bytes) = self.pending_send.take() {
            match self.inner.poll_send(cx, &bytes) {
                Poll::Ready(Ok(_len)) => Poll::Ready(Ok(())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => {
                    self.pending_send = Some(bytes);
                    Poll::Pending
                }
            }
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn poll_close(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.poll_flush(cx)
    }
}

impl Stream for UdpIO {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let mut recv_buffer = vec![0; RECV_BUFFER_SIZE];
        let mut recv_slice = tokio::io::ReadBuf::new(&mut recv_buffer);
        match self.inner.poll_recv(cx, &mut recv_slice) {
            Poll::Ready(Ok(_)) => {
                let data = Bytes::copy_from_slice(recv_slice.filled());
                Poll::Ready(Some(Ok(data)))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}
