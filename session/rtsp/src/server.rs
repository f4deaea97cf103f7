use scopeguard::defer;
use unified_io::tcp::TcpIO;

use crate::{
    config::RtspServerConfig, errors::RtspSessionResult, server_session::RtspServerSession,
    source::MediaSource,
};

/// Accept loop: one [`RtspServerSession`] task per connected peer, all fed
/// from the same upstream source.
#[derive(Debug)]
pub struct RtspServer {
    config: RtspServerConfig,
    source: MediaSource,
}

impl RtspServer {
    pub fn new(config: RtspServerConfig, source: MediaSource) -> Self {
        Self { config, source }
    }

    pub async fn run(&self) -> RtspSessionResult<()> {
        tracing::info!("rtsp server is starting with config: {:?}", self.config);
        let listener = tokio::net::TcpListener::bind((self.config.address, self.config.port)).await?;
        loop {
            let (tcp_stream, addr) = listener.accept().await?;
            tracing::info!("got new rtsp connection, peer addr: {}", addr);

            let mut session = RtspServerSession::new(
                self.config.clone(),
                self.source.clone(),
                Box::pin(TcpIO::new(tcp_stream)),
            );
            tokio::task::spawn(async move {
                defer!(tracing::info!("rtsp peer session ended, peer addr: {}", addr));
                match session.run().await {
                    Ok(()) => {
                        tracing::info!("rtsp session gracefully closed, peer addr: {}", addr);
                    }
                    Err(err) => {
                        tracing::error!("rtsp session exit with error: {}", err);
                    }
                };
            });
        }
    }
}
