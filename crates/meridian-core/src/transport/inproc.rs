//! In-process transport.
//!
//! Pairs two services living in the same process. `send` and the refcount
//! operations dispatch directly into the remote service; `post` frames go
//! through a single queue drained by one task, which preserves delivery
//! order per channel without making the sender wait.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use meridian_proto::{AddRefFrame, CallFrame, CastFrame, ErrorCode, ReleaseFrame, SendResult};
use tokio::sync::mpsc;
use tracing::warn;

use super::{BackChannel, Transport};
use crate::service::Service;

/// Loopback transport delivering frames to a service in the same process.
pub struct InprocTransport {
    remote: Weak<Service>,
    posts: mpsc::UnboundedSender<CallFrame>,
}

impl InprocTransport {
    /// Creates a transport delivering into `remote`.
    ///
    /// Must be called from within a tokio runtime: the in-order post pump is
    /// spawned immediately.
    #[must_use]
    pub fn new(remote: &Arc<Service>) -> Arc<Self> {
        let (posts, mut rx) = mpsc::unbounded_channel::<CallFrame>();
        let pump_target = Arc::downgrade(remote);

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let Some(service) = pump_target.upgrade() else {
                    break;
                };
                if let Err(code) = service.handle_post(frame).await {
                    warn!(%code, "in-process post dropped");
                }
            }
        });

        Arc::new(Self {
            remote: Arc::downgrade(remote),
            posts,
        })
    }

    fn remote(&self) -> Result<Arc<Service>, ErrorCode> {
        self.remote.upgrade().ok_or(ErrorCode::ZoneUnreachable)
    }
}

#[async_trait]
impl Transport for InprocTransport {
    async fn send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
        self.remote()?.handle_send(frame).await
    }

    async fn post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
        self.remote()?;
        self.posts
            .send(frame)
            .map_err(|_| ErrorCode::TransportError)
    }

    async fn try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode> {
        self.remote()?.handle_try_cast(frame).await
    }

    async fn add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode> {
        self.remote()?.handle_add_ref(frame).await
    }

    async fn release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode> {
        self.remote()?.handle_release(frame).await
    }
}

/// Wires two in-process services together in both directions.
///
/// Returns the edges `(a → b, b → a)`. This is the bootstrap used by tests
/// and by hosts that run several zones inside one process.
pub fn link_zones(
    a: &Arc<Service>,
    b: &Arc<Service>,
    options: crate::config::CallOptions,
) -> (
    Arc<crate::service_proxy::ServiceProxy>,
    Arc<crate::service_proxy::ServiceProxy>,
) {
    let a_to_b = a.attach_zone(
        format!("{}->{}", a.name(), b.name()),
        b.zone().as_destination(),
        InprocTransport::new(b),
        options.clone(),
    );
    let b_to_a = b.attach_zone(
        format!("{}->{}", b.name(), a.name()),
        a.zone().as_destination(),
        InprocTransport::new(a),
        options,
    );
    (a_to_b, b_to_a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_proto::Zone;

    #[tokio::test]
    async fn send_to_dead_service_is_unreachable() {
        let service = Service::new("ephemeral", Zone::new(9));
        let transport = InprocTransport::new(&service);
        drop(service);

        let frame = CallFrame {
            protocol_version: meridian_proto::version::CURRENT,
            encoding: meridian_proto::Encoding::Binary,
            tag: 1,
            caller_zone: meridian_proto::CallerZone::new(1),
            destination_zone: meridian_proto::DestinationZone::new(9),
            object: meridian_proto::ObjectId::new(1),
            interface: meridian_proto::InterfaceOrdinal::new(1),
            method: meridian_proto::MethodId::new(1),
            payload: Vec::new(),
            back_channel: Vec::new(),
        };

        assert_eq!(
            transport.send(frame).await.unwrap_err(),
            ErrorCode::ZoneUnreachable
        );
    }
}
