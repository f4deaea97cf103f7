use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

pub mod channel;
mod errors;
pub mod tcp;
pub mod udp;

pub use errors::{UnifiedIOError, UnifiedIOResult};

#[derive(Debug, Clone, Copy)]
pub enum UnderlyingIO {
    Tcp {
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
    },
    Channel,
}

impl UnderlyingIO {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp { local_addr, .. } => *local_addr,
            Self::Channel => None,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp { peer_addr, .. } => *peer_addr,
            Self::Channel => None,
        }
    }
}

pub trait UnifiedIO: AsyncRead + AsyncWrite {
    fn get_underlying_io(&self) -> UnderlyingIO;
}

/// A codec-framed view over a boxed [`UnifiedIO`], the byte stream every
/// session in this workspace is built on.
pub struct UnifiedStreamed<C> {
    inner: Framed<Pin<Box<dyn UnifiedIO + Send>>, C>,
}

impl<C> UnifiedStreamed<C> {
    pub fn new(io: Pin<Box<dyn UnifiedIO + Send>>, codec: C) -> Self {
        Self {
            inner: Framed::new(io, codec),
        }
    }

    pub fn get_underlying_io(&self) -> UnderlyingIO {
        self.inner.get_ref().get_underlying_io()
    }
}

impl<C: Decoder + Unpin> Stream for UnifiedStreamed<C> {
    type Item = Result<C::Item, C::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<I, C: Encoder<I> + Unpin> Sink<I> for UnifiedStreamed<C> {
    type Error = C::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        Pin::new(&mut self.get_mut().inner).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_close(cx)
    }
}
