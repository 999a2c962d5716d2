//! The symmetric TCP channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use meridian_core::{BackChannel, CallOptions, Service, Transport};
use meridian_proto::{
    AddRefFrame, CallFrame, CastFrame, ErrorCode, InterfaceDescriptor, ReleaseFrame, SendResult,
    Zone,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::wire::{read_frame, write_frame, Handshake, WireFrame, WireOk, WireOp};
use crate::TcpTransportError;

/// Identity of the peer learnt during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct PeerInfo {
    /// The peer's zone.
    pub zone: Zone,
    /// Descriptor of the peer's root object.
    pub root: InterfaceDescriptor,
}

/// One established connection, usable as a [`Transport`] by either side.
pub struct TcpChannel {
    service: Weak<Service>,
    writer: Mutex<OwnedWriteHalf>,
    pending: DashMap<u64, oneshot::Sender<(u8, Option<WireOk>)>>,
    next_tag: AtomicU64,
    cancel: CancellationToken,
}

impl TcpChannel {
    fn start(stream: TcpStream, service: &Arc<Service>) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        let channel = Arc::new(Self {
            service: Arc::downgrade(service),
            writer: Mutex::new(writer),
            pending: DashMap::new(),
            next_tag: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(read_pump(channel.clone(), reader));
        channel
    }

    /// Asks the channel to shut down; pending requests fail with
    /// `TRANSPORT_ERROR` and the pump exits.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the channel is still live.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    async fn write(&self, frame: &WireFrame) -> crate::Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    async fn request(&self, op: WireOp) -> Result<WireOk, ErrorCode> {
        if self.cancel.is_cancelled() {
            return Err(ErrorCode::TransportError);
        }

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(tag, tx);

        if let Err(error) = self.write(&WireFrame::Request { tag, op }).await {
            self.pending.remove(&tag);
            debug!(%error, "request write failed");
            return Err(ErrorCode::TransportError);
        }

        match rx.await {
            Ok((0, ok)) => Ok(ok.unwrap_or(WireOk::Empty)),
            Ok((code, _)) => Err(ErrorCode::from_u8(code).unwrap_or(ErrorCode::InternalError)),
            // The pump dropped the slot: connection closed under us.
            Err(_) => Err(ErrorCode::TransportError),
        }
    }
}

#[async_trait]
impl Transport for TcpChannel {
    async fn send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
        match self.request(WireOp::Send(frame)).await? {
            WireOk::Send(result) => Ok(result),
            _ => Err(ErrorCode::TransportError),
        }
    }

    async fn post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
        // Tag 0: fire-and-forget, no reply slot.
        self.write(&WireFrame::Request {
            tag: 0,
            op: WireOp::Post(frame),
        })
        .await
        .map_err(|_| ErrorCode::TransportError)
    }

    async fn try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode> {
        match self.request(WireOp::TryCast(frame)).await? {
            WireOk::BackChannel(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    async fn add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode> {
        match self.request(WireOp::AddRef(frame)).await? {
            WireOk::BackChannel(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    async fn release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode> {
        match self.request(WireOp::Release(frame)).await? {
            WireOk::BackChannel(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }
}

async fn read_pump(channel: Arc<TcpChannel>, mut reader: OwnedReadHalf) {
    loop {
        let frame = tokio::select! {
            () = channel.cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "connection closed");
                break;
            }
        };

        match frame {
            WireFrame::Reply { tag, code, ok } => match channel.pending.remove(&tag) {
                Some((_, slot)) => {
                    let _ = slot.send((code, ok));
                }
                // Cancelled or timed out upstream; a late reply is dropped.
                None => debug!(tag, "late reply discarded"),
            },
            WireFrame::Request { tag, op } => {
                let Some(service) = channel.service.upgrade() else {
                    break;
                };

                if let WireOp::Post(call) = op {
                    // Posts are dispatched inline so one-way frames keep
                    // their send order on this channel.
                    if let Err(code) = service.handle_post(call).await {
                        warn!(%code, "post dispatch failed");
                    }
                    continue;
                }

                let responder = channel.clone();
                tokio::spawn(async move {
                    let (code, ok) = dispatch(&service, op).await;
                    if let Err(error) = responder.write(&WireFrame::Reply { tag, code, ok }).await
                    {
                        debug!(%error, tag, "reply write failed");
                    }
                });
            }
            WireFrame::Hello(_) => warn!("unexpected handshake frame mid-connection"),
        }
    }

    channel.cancel.cancel();
    // Fail whatever is still waiting for a reply.
    let stale: Vec<u64> = channel.pending.iter().map(|entry| *entry.key()).collect();
    for tag in stale {
        if let Some((_, slot)) = channel.pending.remove(&tag) {
            let _ = slot.send((ErrorCode::TransportError.as_u8(), None));
        }
    }
}

async fn dispatch(service: &Arc<Service>, op: WireOp) -> (u8, Option<WireOk>) {
    match op {
        WireOp::Send(frame) => match service.handle_send(frame).await {
            Ok(result) => (0, Some(WireOk::Send(result))),
            Err(code) => (code.as_u8(), None),
        },
        WireOp::TryCast(frame) => match service.handle_try_cast(frame).await {
            Ok(entries) => (0, Some(WireOk::BackChannel(entries))),
            Err(code) => (code.as_u8(), None),
        },
        WireOp::AddRef(frame) => match service.handle_add_ref(frame).await {
            Ok(entries) => (0, Some(WireOk::BackChannel(entries))),
            Err(code) => (code.as_u8(), None),
        },
        WireOp::Release(frame) => match service.handle_release(frame).await {
            Ok(entries) => (0, Some(WireOk::BackChannel(entries))),
            Err(code) => (code.as_u8(), None),
        },
        // Posts never reach here; the pump handles them inline.
        WireOp::Post(_) => (ErrorCode::TransportError.as_u8(), None),
    }
}

/// Connects to a serving zone and performs the handshake.
///
/// Returns the established channel and the peer's identity; pass the
/// channel and `peer.root` to [`Service::attach_remote`] to finish
/// bootstrapping.
pub async fn connect(
    addr: SocketAddr,
    service: &Arc<Service>,
    local_root: InterfaceDescriptor,
) -> crate::Result<(Arc<TcpChannel>, PeerInfo)> {
    let mut stream = TcpStream::connect(addr).await?;

    write_frame(
        &mut stream,
        &WireFrame::Hello(Handshake {
            protocol_version: meridian_proto::version::CURRENT,
            zone: service.zone().get(),
            root: local_root,
        }),
    )
    .await?;

    let peer = expect_handshake(&mut stream).await?;
    let channel = TcpChannel::start(stream, service);

    info!(zone = %service.zone(), peer = peer.zone, "connected");
    Ok((
        channel,
        PeerInfo {
            zone: Zone::new(peer.zone),
            root: peer.root,
        },
    ))
}

/// Binds a listener and serves inbound connections until cancelled.
///
/// Each accepted connection is handshaken and registered as an outbound
/// edge toward the peer's zone, so the serving zone can originate calls
/// (and reverse channels) over the same socket. Returns the bound address.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<Service>,
    local_root: InterfaceDescriptor,
    options: CallOptions,
    cancel: CancellationToken,
) -> crate::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(zone = %service.zone(), %local, "listening");

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            };

            let service = service.clone();
            let options = options.clone();
            tokio::spawn(async move {
                match handshake_accepted(stream, &service, local_root).await {
                    Ok((channel, peer)) => {
                        service.attach_zone(
                            format!("{}->{}", service.name(), peer.zone),
                            peer.zone.as_destination(),
                            channel,
                            options,
                        );
                        debug!(%peer_addr, peer = peer.zone.get(), "peer attached");
                    }
                    Err(error) => warn!(%peer_addr, %error, "handshake failed"),
                }
            });
        }
    });

    Ok(local)
}

async fn handshake_accepted(
    mut stream: TcpStream,
    service: &Arc<Service>,
    local_root: InterfaceDescriptor,
) -> crate::Result<(Arc<TcpChannel>, PeerInfo)> {
    write_frame(
        &mut stream,
        &WireFrame::Hello(Handshake {
            protocol_version: meridian_proto::version::CURRENT,
            zone: service.zone().get(),
            root: local_root,
        }),
    )
    .await?;

    let peer = expect_handshake(&mut stream).await?;
    let channel = TcpChannel::start(stream, service);

    Ok((
        channel,
        PeerInfo {
            zone: Zone::new(peer.zone),
            root: peer.root,
        },
    ))
}

async fn expect_handshake(stream: &mut TcpStream) -> crate::Result<Handshake> {
    match read_frame(stream).await? {
        WireFrame::Hello(handshake) => {
            if handshake.protocol_version < meridian_proto::version::MIN_SUPPORTED
                || handshake.protocol_version > meridian_proto::version::CURRENT
            {
                return Err(TcpTransportError::VersionMismatch(
                    handshake.protocol_version,
                ));
            }
            Ok(handshake)
        }
        other => Err(TcpTransportError::Handshake(format!(
            "expected hello, got {other:?}"
        ))),
    }
}
