use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use rtsp_formats::{RtspMessage, consts::methods::RtspMethod, header::RtspHeader, request::RtspRequest};
use scopeguard::defer;
use tokio::task::JoinHandle;
use url::Url;

use crate::{config::KeepaliveMethod, transport::ControlTransport};

/// Half the negotiated session timeout; `None` disables refreshing.
pub(crate) fn keepalive_period(timeout_secs: u64) -> Option<Duration> {
    (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs) / 2)
}

pub(crate) fn bump_cseq(counter: &AtomicU32) -> u32 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// Periodic session refresh, owned by the session and aborted on drop so no
/// timer outlives the session it refreshes. Responses surface on the normal
/// read path and are skipped there by CSeq; a failed send cancels the timer
/// and nothing else.
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl KeepAlive {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        transport: Arc<ControlTransport>,
        uri: Url,
        session_id: String,
        cseq: Arc<AtomicU32>,
        period: Duration,
        method: KeepaliveMethod,
        user_agent: String,
    ) -> Self {
        let handle = tokio::spawn(async move {
            defer!(tracing::debug!("keep-alive timer stopped"));
            let method = match method {
                KeepaliveMethod::GetParameter => RtspMethod::GetParameter,
                KeepaliveMethod::Options => RtspMethod::Options,
            };
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick of an interval fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let request = RtspRequest::builder()
                    .method(method)
                    .uri(uri.clone())
                    .header(RtspHeader::CSeq, bump_cseq(&cseq).to_string())
                    .header(RtspHeader::Session, session_id.clone())
                    .header(RtspHeader::UserAgent, user_agent.clone())
                    .build();
                let request = match request {
                    Ok(request) => request,
                    Err(err) => {
                        tracing::error!("failed to build keep-alive request: {}", err);
                        return;
                    }
                };
                if let Err(err) = transport.send(RtspMessage::Request(request)).await {
                    tracing::warn!("keep-alive send failed, cancelling the timer: {}", err);
                    return;
                }
                tracing::debug!("keep-alive sent for session {}", session_id);
            }
        });
        Self { handle }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use rtsp_formats::{DEFAULT_MAX_MESSAGE_BYTES, RtspMessageFramed};
    use unified_io::{UnifiedStreamed, channel::ChannelIo};

    use super::*;

    #[test]
    fn period_is_half_the_timeout() {
        assert_eq!(keepalive_period(60), Some(Duration::from_secs(30)));
        assert_eq!(keepalive_period(30), Some(Duration::from_secs(15)));
        assert_eq!(keepalive_period(0), None);
    }

    #[tokio::test]
    async fn refresh_requests_carry_session_and_increasing_cseq() {
        let (near, far) = ChannelIo::pair();
        let transport = Arc::new(ControlTransport::new(
            Box::pin(near),
            DEFAULT_MAX_MESSAGE_BYTES,
        ));
        let mut peer = UnifiedStreamed::new(Box::pin(far), RtspMessageFramed::default());

        let cseq = Arc::new(AtomicU32::new(4));
        let keepalive = KeepAlive::spawn(
            transport,
            "rtsp://example.com/stream".parse().unwrap(),
            "12345678".to_owned(),
            cseq.clone(),
            Duration::from_millis(20),
            KeepaliveMethod::GetParameter,
            "test-agent".to_owned(),
        );

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let message = peer.next().await.unwrap().unwrap();
            if let RtspMessage::Request(request) = message {
                assert_eq!(request.method(), RtspMethod::GetParameter);
                assert_eq!(
                    request
                        .headers()
                        .session()
                        .map(|session| session.id),
                    Some("12345678".to_owned())
                );
                seen.push(request.headers().cseq().unwrap());
            }
        }
        assert!(seen[0] > 4);
        assert!(seen[1] > seen[0]);
        drop(keepalive);
    }
}
