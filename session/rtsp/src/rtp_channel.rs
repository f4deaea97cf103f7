use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::bytes::Bytes;
use unified_io::udp::{UdpIO, find_udp_port_pair};

use crate::{
    errors::{RtspSessionError, RtspSessionResult},
    transport::{ControlTransport, InterleavedBinding},
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

/// RTCP packet type of a goodbye packet.
pub const RTCP_PACKET_TYPE_BYE: u8 = 203;

pub fn is_rtcp_bye(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[1] == RTCP_PACKET_TYPE_BYE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtpChannelVariant {
    UdpSender,
    UdpReceiver,
    Interleaved,
}

#[derive(Debug, Clone)]
pub enum RtpChannelEvent {
    Rtp(Bytes),
    Rtcp(Bytes),
}

impl RtpChannelEvent {
    pub fn is_bye(&self) -> bool {
        matches!(self, Self::Rtcp(payload) if is_rtcp_bye(payload))
    }
}

/// The media flow negotiated by SETUP. One capability, three shapes: a UDP
/// sender (server side), a UDP receiver (client side), or a pair of
/// interleaved sub-streams lent out by the control transport. Incoming
/// packets surface as [`RtpChannelEvent`]s on the receiver handed to the
/// owning session; outgoing packets go through `enqueue`/`enqueue_rtcp`.
pub struct RtpChannel {
    variant: RtpChannelVariant,
    ssrc: Option<u32>,
    local_rtp_port: u16,
    local_rtcp_port: u16,
    interleaved_ids: Option<(u8, u8)>,
    outbound_rtp_tx: mpsc::Sender<Bytes>,
    outbound_rtp_rx: Option<mpsc::Receiver<Bytes>>,
    outbound_rtcp_tx: mpsc::Sender<Bytes>,
    outbound_rtcp_rx: Option<mpsc::Receiver<Bytes>>,
    event_tx: mpsc::Sender<RtpChannelEvent>,
    event_rx: Option<mpsc::Receiver<RtpChannelEvent>>,
    rtp_io: Option<UdpIO>,
    rtcp_io: Option<UdpIO>,
    transport: Option<Arc<ControlTransport>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RtpChannel {
    /// Client side: binds a fresh even/odd local port pair and waits to be
    /// armed with the peer's server ports.
    pub async fn udp_receiver(search_start: u16) -> RtspSessionResult<Self> {
        let (rtp_io, rtcp_io) = find_udp_port_pair(search_start).await?;
        Ok(Self::from_udp_pair(
            RtpChannelVariant::UdpReceiver,
            rtp_io,
            rtcp_io,
        ))
    }

    /// Server side: binds a local pair and aims it at the client's ports.
    pub async fn udp_sender(
        peer_ip: IpAddr,
        peer_rtp_port: u16,
        peer_rtcp_port: u16,
        search_start: u16,
    ) -> RtspSessionResult<Self> {
        let (mut rtp_io, mut rtcp_io) = find_udp_port_pair(search_start).await?;
        rtp_io
            .connect(SocketAddr::new(peer_ip, peer_rtp_port))
            .await?;
        rtcp_io
            .connect(SocketAddr::new(peer_ip, peer_rtcp_port))
            .await?;
        Ok(Self::from_udp_pair(
            RtpChannelVariant::UdpSender,
            rtp_io,
            rtcp_io,
        ))
    }

    fn from_udp_pair(variant: RtpChannelVariant, rtp_io: UdpIO, rtcp_io: UdpIO) -> Self {
        let (outbound_rtp_tx, outbound_rtp_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (outbound_rtcp_tx, outbound_rtcp_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            variant,
            ssrc: None,
            local_rtp_port: rtp_io.local_port(),
            local_rtcp_port: rtcp_io.local_port(),
            interleaved_ids: None,
            outbound_rtp_tx,
            outbound_rtp_rx: Some(outbound_rtp_rx),
            outbound_rtcp_tx,
            outbound_rtcp_rx: Some(outbound_rtcp_rx),
            event_tx,
            event_rx: Some(event_rx),
            rtp_io: Some(rtp_io),
            rtcp_io: Some(rtcp_io),
            transport: None,
            tasks: Vec::new(),
        }
    }

    /// Either side, TCP: borrows two demultiplexed sub-streams of the
    /// control connection, which delivers straight into the event queue.
    /// No UDP socket exists in this shape.
    pub fn interleaved(
        transport: Arc<ControlTransport>,
        rtp_channel_id: u8,
        rtcp_channel_id: u8,
    ) -> Self {
        let (outbound_rtp_tx, outbound_rtp_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (outbound_rtcp_tx, outbound_rtcp_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        transport.bind_interleaved(rtp_channel_id, InterleavedBinding::Rtp(event_tx.clone()));
        transport.bind_interleaved(rtcp_channel_id, InterleavedBinding::Rtcp(event_tx.clone()));
        Self {
            variant: RtpChannelVariant::Interleaved,
            ssrc: None,
            local_rtp_port: 0,
            local_rtcp_port: 0,
            interleaved_ids: Some((rtp_channel_id, rtcp_channel_id)),
            outbound_rtp_tx,
            outbound_rtp_rx: Some(outbound_rtp_rx),
            outbound_rtcp_tx,
            outbound_rtcp_rx: Some(outbound_rtcp_rx),
            event_tx,
            event_rx: Some(event_rx),
            rtp_io: None,
            rtcp_io: None,
            transport: Some(transport),
            tasks: Vec::new(),
        }
    }

    /// Receiver side: aim the bound sockets at the ports the peer announced
    /// in its SETUP answer.
    pub async fn arm_receiver(
        &mut self,
        peer_ip: IpAddr,
        peer_rtp_port: u16,
        peer_rtcp_port: u16,
    ) -> RtspSessionResult<()> {
        let (Some(rtp_io), Some(rtcp_io)) = (self.rtp_io.as_mut(), self.rtcp_io.as_mut()) else {
            return Err(RtspSessionError::Protocol(
                "rtp channel has no udp sockets to arm".to_owned(),
            ));
        };
        rtp_io
            .connect(SocketAddr::new(peer_ip, peer_rtp_port))
            .await?;
        rtcp_io
            .connect(SocketAddr::new(peer_ip, peer_rtcp_port))
            .await?;
        Ok(())
    }

    /// Starts the background I/O tasks. Idempotence is not offered: a
    /// channel connects once.
    pub fn connect(&mut self) -> RtspSessionResult<()> {
        let already = || RtspSessionError::Protocol("rtp channel is already connected".to_owned());
        match self.variant {
            RtpChannelVariant::UdpSender | RtpChannelVariant::UdpReceiver => {
                let rtp_io = self.rtp_io.take().ok_or_else(already)?;
                let rtcp_io = self.rtcp_io.take().ok_or_else(already)?;
                if rtp_io.peer_addr().is_none() {
                    return Err(RtspSessionError::Protocol(
                        "rtp channel is not armed with peer ports".to_owned(),
                    ));
                }
                let outbound_rtp = self.outbound_rtp_rx.take().ok_or_else(already)?;
                let outbound_rtcp = self.outbound_rtcp_rx.take().ok_or_else(already)?;
                self.tasks.push(spawn_udp_task(
                    rtp_io,
                    outbound_rtp,
                    self.event_tx.clone(),
                    false,
                ));
                self.tasks.push(spawn_udp_task(
                    rtcp_io,
                    outbound_rtcp,
                    self.event_tx.clone(),
                    true,
                ));
            }
            RtpChannelVariant::Interleaved => {
                let transport = self.transport.clone().ok_or_else(already)?;
                let ids = self.interleaved_ids.ok_or_else(already)?;
                let outbound_rtp = self.outbound_rtp_rx.take().ok_or_else(already)?;
                let outbound_rtcp = self.outbound_rtcp_rx.take().ok_or_else(already)?;
                self.tasks.push(spawn_interleaved_outbound(
                    transport,
                    ids,
                    outbound_rtp,
                    outbound_rtcp,
                ));
            }
        }
        Ok(())
    }

    /// Stops the I/O tasks and releases sockets and interleaved bindings.
    /// Safe to call on every exit path; a second call is a no-op.
    pub fn disconnect(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let (Some(transport), Some((rtp_id, rtcp_id))) =
            (self.transport.as_ref(), self.interleaved_ids)
        {
            transport.unbind_interleaved(rtp_id);
            transport.unbind_interleaved(rtcp_id);
        }
        self.transport = None;
        self.rtp_io = None;
        self.rtcp_io = None;
    }

    /// Queues one RTP packet for delivery to the peer.
    pub fn enqueue(&self, payload: Bytes) -> RtspSessionResult<()> {
        self.outbound_rtp_tx.try_send(payload).map_err(|err| {
            RtspSessionError::Protocol(format!("rtp channel queue rejected packet: {}", err))
        })
    }

    /// Queues one RTCP packet for delivery to the peer.
    pub fn enqueue_rtcp(&self, payload: Bytes) -> RtspSessionResult<()> {
        self.outbound_rtcp_tx.try_send(payload).map_err(|err| {
            RtspSessionError::Protocol(format!("rtcp channel queue rejected packet: {}", err))
        })
    }

    /// Hands the event stream to the owning session; can only be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<RtpChannelEvent>> {
        self.event_rx.take()
    }

    pub fn variant(&self) -> RtpChannelVariant {
        self.variant
    }

    pub fn local_rtp_port(&self) -> u16 {
        self.local_rtp_port
    }

    pub fn local_rtcp_port(&self) -> u16 {
        self.local_rtcp_port
    }

    pub fn interleaved_ids(&self) -> Option<(u8, u8)> {
        self.interleaved_ids
    }

    pub fn ssrc(&self) -> Option<u32> {
        self.ssrc
    }

    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.ssrc = Some(ssrc);
    }
}

impl Drop for RtpChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn spawn_udp_task(
    mut io: UdpIO,
    mut outbound: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<RtpChannelEvent>,
    rtcp: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = outbound.recv() => {
                    match outgoing {
                        Some(payload) => {
                            if let Err(err) = io.send(payload).await {
                                tracing::warn!("udp media send failed: {}", err);
                            }
                        }
                        None => return,
                    }
                }
                incoming = io.next() => {
                    match incoming {
                        Some(Ok(payload)) => {
                            let event = if rtcp {
                                RtpChannelEvent::Rtcp(payload)
                            } else {
                                RtpChannelEvent::Rtp(payload)
                            };
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!("udp media receive failed: {}", err);
                        }
                        None => return,
                    }
                }
            }
        }
    })
}

fn spawn_interleaved_outbound(
    transport: Arc<ControlTransport>,
    ids: (u8, u8),
    mut outbound_rtp: mpsc::Receiver<Bytes>,
    mut outbound_rtcp: mpsc::Receiver<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                payload = outbound_rtp.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(err) = transport.send_interleaved(ids.0, payload).await {
                                tracing::warn!("interleaved rtp send failed: {}", err);
                            }
                        }
                        None => return,
                    }
                }
                payload = outbound_rtcp.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(err) = transport.send_interleaved(ids.1, payload).await {
                                tracing::warn!("interleaved rtcp send failed: {}", err);
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    })
}
