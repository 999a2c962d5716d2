//! The outbound edge of a zone toward one destination zone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use meridian_proto::{
    AddRefFrame, AddRefOptions, CallFrame, CallerZone, CastFrame, DestinationZone, Encoding,
    ErrorCode, InterfaceOrdinal, KnownDirectionZone, MethodId, ObjectId, ReleaseFrame,
    ReleaseOptions, SendResult, Zone,
};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::CallOptions;
use crate::service::Service;
use crate::transport::{BackChannel, Transport};

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Outbound edge from one zone to one destination zone.
///
/// A service holds at most one proxy per destination at a time; when a
/// further zone becomes reachable through the same transport the existing
/// proxy is cloned rather than fresh transport state being built.
pub struct ServiceProxy {
    name: String,
    zone: Zone,
    destination: DestinationZone,
    transport: Arc<dyn Transport>,
    options: CallOptions,
    service: Weak<Service>,
    /// Object proxies currently routed through this edge.
    object_refs: AtomicU64,
}

impl ServiceProxy {
    pub(crate) fn new(
        name: impl Into<String>,
        service: &Arc<Service>,
        destination: DestinationZone,
        transport: Arc<dyn Transport>,
        options: CallOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            zone: service.zone(),
            destination,
            transport,
            options,
            service: Arc::downgrade(service),
            object_refs: AtomicU64::new(0),
        })
    }

    /// The name of this edge, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The zone this proxy operates from.
    #[must_use]
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// The zone this proxy fronts.
    #[must_use]
    pub fn destination(&self) -> DestinationZone {
        self.destination
    }

    /// The options applied to outbound operations.
    #[must_use]
    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// The service operating this proxy, if it is still alive.
    #[must_use]
    pub fn operating_service(&self) -> Option<Arc<Service>> {
        self.service.upgrade()
    }

    /// Clones this edge for a further destination reachable through the
    /// same transport.
    #[must_use]
    pub fn clone_for_destination(self: &Arc<Self>, destination: DestinationZone) -> Arc<Self> {
        Arc::new(Self {
            name: self.name.clone(),
            zone: self.zone,
            destination,
            transport: self.transport.clone(),
            options: self.options.clone(),
            service: self.service.clone(),
            object_refs: AtomicU64::new(0),
        })
    }

    /// Invokes a method on a remote object.
    ///
    /// Builds the frame from this proxy's identity and options and routes it
    /// through the transport. Returns the response payload and trailer.
    pub async fn send(
        &self,
        object: ObjectId,
        interface: InterfaceOrdinal,
        method: MethodId,
        payload: Vec<u8>,
        back_channel: BackChannel,
    ) -> Result<SendResult, ErrorCode> {
        let frame = self.call_frame(object, interface, method, payload, back_channel);
        self.forward_send(frame).await
    }

    /// Posts a one-way method invocation.
    pub async fn post(
        &self,
        object: ObjectId,
        interface: InterfaceOrdinal,
        method: MethodId,
        payload: Vec<u8>,
        back_channel: BackChannel,
    ) -> Result<(), ErrorCode> {
        let frame = self.call_frame(object, interface, method, payload, back_channel);
        self.forward_post(frame).await
    }

    /// Asks the destination whether `object` supports `interface`.
    pub async fn try_cast(
        &self,
        object: ObjectId,
        interface: InterfaceOrdinal,
    ) -> Result<BackChannel, ErrorCode> {
        let frame = CastFrame {
            protocol_version: self.options.protocol_version,
            destination_zone: self.destination,
            object,
            interface,
            back_channel: Vec::new(),
        };
        self.forward_try_cast(frame).await
    }

    /// Increments the destination's count of references held by `caller`.
    ///
    /// If the acknowledgement does not arrive within the deadline the proxy
    /// must assume unknown state: the increment may or may not have been
    /// applied, so a compensating release is issued before `TIMEOUT` is
    /// returned to the caller.
    pub async fn add_ref(
        &self,
        object: ObjectId,
        caller: CallerZone,
        known_direction: KnownDirectionZone,
        options: AddRefOptions,
    ) -> Result<BackChannel, ErrorCode> {
        let frame = AddRefFrame {
            protocol_version: self.options.protocol_version,
            destination_zone: self.destination,
            object,
            caller_zone: caller,
            known_direction_zone: known_direction,
            options,
            back_channel: Vec::new(),
        };

        match timeout(self.options.call_timeout, self.transport.add_ref(frame)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    zone = %self.zone,
                    destination = %self.destination,
                    %object,
                    "add_ref acknowledgement timed out, issuing compensating release"
                );
                self.compensate_add_ref(object, caller).await;
                Err(ErrorCode::Timeout)
            }
        }
    }

    /// Decrements the destination's count of references held by `caller`.
    pub async fn release(
        &self,
        object: ObjectId,
        caller: CallerZone,
        options: ReleaseOptions,
    ) -> Result<BackChannel, ErrorCode> {
        let frame = ReleaseFrame {
            protocol_version: self.options.protocol_version,
            destination_zone: self.destination,
            object,
            caller_zone: caller,
            options,
            back_channel: Vec::new(),
        };
        self.forward_release(frame).await
    }

    // Forwarding entry points: the frame header is preserved verbatim so a
    // routing zone never rewrites the original caller's identity.

    pub(crate) async fn forward_send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
        self.deadline(self.transport.send(frame)).await
    }

    pub(crate) async fn forward_post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
        self.deadline(self.transport.post(frame)).await
    }

    pub(crate) async fn forward_try_cast(
        &self,
        frame: CastFrame,
    ) -> Result<BackChannel, ErrorCode> {
        self.deadline(self.transport.try_cast(frame)).await
    }

    pub(crate) async fn forward_add_ref(
        &self,
        frame: AddRefFrame,
    ) -> Result<BackChannel, ErrorCode> {
        let object = frame.object;
        let caller = frame.caller_zone;
        match timeout(self.options.call_timeout, self.transport.add_ref(frame)).await {
            Ok(result) => result,
            Err(_) => {
                self.compensate_add_ref(object, caller).await;
                Err(ErrorCode::Timeout)
            }
        }
    }

    pub(crate) async fn forward_release(
        &self,
        frame: ReleaseFrame,
    ) -> Result<BackChannel, ErrorCode> {
        self.deadline(self.transport.release(frame)).await
    }

    /// Records that an object proxy now routes through this edge.
    pub(crate) fn note_object_attached(&self) {
        self.object_refs.fetch_add(1, Ordering::SeqCst);
    }

    /// Records that an object proxy routed through this edge was released.
    ///
    /// The edge is removed from its service once the last object proxy is
    /// gone.
    pub(crate) fn note_object_released(self: &Arc<Self>) {
        if self.object_refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(service) = self.service.upgrade() {
                service.remove_proxy(self);
                debug!(
                    zone = %self.zone,
                    destination = %self.destination,
                    "service proxy released with its last object proxy"
                );
            }
        }
    }

    /// The number of object proxies currently routed through this edge.
    #[must_use]
    pub fn object_proxy_count(&self) -> u64 {
        self.object_refs.load(Ordering::SeqCst)
    }

    fn call_frame(
        &self,
        object: ObjectId,
        interface: InterfaceOrdinal,
        method: MethodId,
        payload: Vec<u8>,
        back_channel: BackChannel,
    ) -> CallFrame {
        CallFrame {
            protocol_version: self.options.protocol_version,
            encoding: self.options.encoding,
            tag: NEXT_TAG.fetch_add(1, Ordering::Relaxed),
            caller_zone: self.zone.as_caller(),
            destination_zone: self.destination,
            object,
            interface,
            method,
            payload,
            back_channel,
        }
    }

    async fn deadline<T>(
        &self,
        operation: impl std::future::Future<Output = Result<T, ErrorCode>>,
    ) -> Result<T, ErrorCode> {
        timeout(self.options.call_timeout, operation)
            .await
            .unwrap_or(Err(ErrorCode::Timeout))
    }

    /// Best-effort rollback of an add_ref whose acknowledgement never
    /// arrived. The owner treats a release of a count that was never applied
    /// as `REFERENCE_COUNT_ERROR` and leaves its state untouched, so the
    /// compensation is safe in both outcomes.
    async fn compensate_add_ref(&self, object: ObjectId, caller: CallerZone) {
        let frame = ReleaseFrame {
            protocol_version: self.options.protocol_version,
            destination_zone: self.destination,
            object,
            caller_zone: caller,
            options: ReleaseOptions::Normal,
            back_channel: Vec::new(),
        };
        if let Ok(Err(code)) =
            timeout(self.options.call_timeout, self.transport.release(frame)).await
        {
            debug!(%object, %code, "compensating release was rejected");
        }
    }

    /// Selects the payload encoding for this edge.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.options.encoding
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("name", &self.name)
            .field("zone", &self.zone)
            .field("destination", &self.destination)
            .field("object_refs", &self.object_proxy_count())
            .finish()
    }
}
