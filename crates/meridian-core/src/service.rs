//! The per-zone container of hosted objects and outbound edges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use meridian_proto::{
    AddRefFrame, AddRefOptions, BackChannelEntry, CallFrame, CallerZone, CastFrame,
    DestinationZone, ErrorCode, InterfaceDescriptor, KnownDirectionZone, ObjectId, ReleaseFrame,
    SendResult, Zone,
};
use tracing::{debug, warn};

use crate::config::CallOptions;
use crate::member::MemberCell;
use crate::object_proxy::ObjectProxy;
use crate::service_proxy::ServiceProxy;
use crate::stub::{InterfaceStub, ObjectStub};
use crate::transport::{BackChannel, Transport};

/// In-process container for the objects of one zone.
///
/// A service owns its stubs exclusively, shares its service proxies with the
/// object proxies routed through them, and dispatches every inbound RPC
/// frame: either to a local stub or onward through the proxy that fronts the
/// frame's destination zone. A child service additionally holds a parent
/// edge and delegates unknown destinations upward.
pub struct Service {
    name: String,
    zone: Zone,
    stubs: DashMap<ObjectId, Arc<ObjectStub>>,
    proxies: DashMap<DestinationZone, Arc<ServiceProxy>>,
    parent: MemberCell<ServiceProxy>,
    next_object: AtomicU64,
    next_child_zone: AtomicU64,
}

impl Service {
    /// Creates a root service for `zone`.
    #[must_use]
    pub fn new(name: impl Into<String>, zone: Zone) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            zone,
            stubs: DashMap::new(),
            proxies: DashMap::new(),
            parent: MemberCell::empty(),
            next_object: AtomicU64::new(1),
            next_child_zone: AtomicU64::new(1),
        })
    }

    /// The zone identity of this service.
    #[must_use]
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// The diagnostic name of this service.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks this service as a child of the zone behind `parent`.
    ///
    /// Unknown destinations are delegated upward through the parent edge.
    pub fn set_parent(&self, parent: Arc<ServiceProxy>) {
        self.parent.set(parent);
    }

    /// The parent edge, if this is a child service.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<ServiceProxy>> {
        self.parent.get_nullable()
    }

    /// Allocates a zone id for a subordinate zone, e.g. a per-connection
    /// server zone.
    pub fn generate_child_zone_id(&self) -> Zone {
        let ordinal = self.next_child_zone.fetch_add(1, Ordering::SeqCst);
        Zone::new((self.zone.get() << 16) | ordinal)
    }

    // ---- hosted objects ------------------------------------------------

    /// Hosts a new object exposing the given interfaces.
    ///
    /// Allocates an [`ObjectId`], installs the stub with one reference held
    /// by this zone, and returns the descriptor under which the object can
    /// cross zone boundaries. Ids are monotonic and never reused while any
    /// refcount remains.
    pub fn register_object(&self, interfaces: Vec<Arc<dyn InterfaceStub>>) -> InterfaceDescriptor {
        let object = ObjectId::new(self.next_object.fetch_add(1, Ordering::SeqCst));
        let stub = Arc::new(ObjectStub::new(object, interfaces, self.zone.as_caller()));
        self.stubs.insert(object, stub);
        debug!(zone = %self.zone, %object, "object registered");
        InterfaceDescriptor::new(self.zone.as_destination(), object)
    }

    /// Looks up the stub hosting `object`.
    #[must_use]
    pub fn object_stub(&self, object: ObjectId) -> Option<Arc<ObjectStub>> {
        self.stubs.get(&object).map(|entry| Arc::clone(entry.value()))
    }

    /// The number of live stubs, for diagnostics and tests.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.stubs.len()
    }

    // ---- outbound edges ------------------------------------------------

    /// Installs (or reuses) the edge toward a destination zone.
    ///
    /// At most one proxy per `(self, destination)` pair exists at a time;
    /// attaching an already-fronted destination returns the existing edge.
    pub fn attach_zone(
        self: &Arc<Self>,
        name: impl Into<String>,
        destination: DestinationZone,
        transport: Arc<dyn Transport>,
        options: CallOptions,
    ) -> Arc<ServiceProxy> {
        self.proxies
            .entry(destination)
            .or_insert_with(|| ServiceProxy::new(name, self, destination, transport, options))
            .clone()
    }

    /// Attaches a remote zone and resolves its root object in one step.
    ///
    /// This is the bootstrap path: the caller supplies the descriptor of the
    /// remote root (obtained out of band or from a transport handshake) and
    /// receives a live object proxy for it.
    pub async fn attach_remote(
        self: &Arc<Self>,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        remote_root: InterfaceDescriptor,
        options: CallOptions,
    ) -> Result<Arc<ObjectProxy>, ErrorCode> {
        let proxy = self.attach_zone(name, remote_root.destination_zone, transport, options);
        ObjectProxy::attach(proxy, remote_root, KnownDirectionZone::null()).await
    }

    /// The edge fronting `destination`, if one exists.
    #[must_use]
    pub fn proxy_for(&self, destination: DestinationZone) -> Option<Arc<ServiceProxy>> {
        self.proxies
            .get(&destination)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// The number of outbound edges, for diagnostics and tests.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Removes an edge once its last object proxy is gone. Only the exact
    /// proxy instance is removed, so a racing re-attachment is preserved.
    pub(crate) fn remove_proxy(&self, proxy: &Arc<ServiceProxy>) {
        self.proxies
            .remove_if(&proxy.destination(), |_, current| {
                Arc::ptr_eq(current, proxy)
            });
    }

    // ---- inbound dispatch ----------------------------------------------

    /// Dispatches an inbound `send` frame.
    pub async fn handle_send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
        if !frame.is_version_supported() {
            return Err(ErrorCode::ProtocolMismatch);
        }

        if frame.destination_zone != self.zone.as_destination() {
            let proxy = self.route_to(frame.destination_zone, KnownDirectionZone::null())?;
            return proxy.forward_send(frame).await;
        }

        let (add_refs, releases) = split_back_channel(&frame.back_channel);
        self.apply_add_refs(&add_refs)?;

        let stub = self
            .object_stub(frame.object)
            .ok_or(ErrorCode::ObjectNotFound)?;
        let interface = stub
            .interface(frame.interface)
            .ok_or(ErrorCode::InterfaceNotSupported)?;

        let payload = interface
            .call(frame.method, frame.encoding, &frame.payload)
            .await?;

        self.apply_releases(&releases);

        Ok(SendResult {
            payload,
            back_channel: Vec::new(),
        })
    }

    /// Dispatches an inbound `post` frame. Failures are logged, not
    /// reported: the sender has already moved on.
    pub async fn handle_post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
        if !frame.is_version_supported() {
            return Err(ErrorCode::ProtocolMismatch);
        }

        if frame.destination_zone != self.zone.as_destination() {
            let proxy = self.route_to(frame.destination_zone, KnownDirectionZone::null())?;
            return proxy.forward_post(frame).await;
        }

        let (add_refs, releases) = split_back_channel(&frame.back_channel);
        self.apply_add_refs(&add_refs)?;

        let stub = self
            .object_stub(frame.object)
            .ok_or(ErrorCode::ObjectNotFound)?;
        let interface = stub
            .interface(frame.interface)
            .ok_or(ErrorCode::InterfaceNotSupported)?;

        if let Err(code) = interface
            .call(frame.method, frame.encoding, &frame.payload)
            .await
        {
            warn!(zone = %self.zone, object = %frame.object, %code, "post dispatch failed");
        }

        self.apply_releases(&releases);
        Ok(())
    }

    /// Dispatches an inbound `try_cast` frame.
    pub async fn handle_try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode> {
        if !frame.is_version_supported() {
            return Err(ErrorCode::ProtocolMismatch);
        }

        if frame.destination_zone != self.zone.as_destination() {
            let proxy = self.route_to(frame.destination_zone, KnownDirectionZone::null())?;
            return proxy.forward_try_cast(frame).await;
        }

        let stub = self
            .object_stub(frame.object)
            .ok_or(ErrorCode::ObjectNotFound)?;

        if stub.supports(frame.interface) {
            Ok(Vec::new())
        } else {
            Err(ErrorCode::InterfaceNotSupported)
        }
    }

    /// Dispatches an inbound `add_ref` frame.
    pub async fn handle_add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode> {
        if !frame.is_version_supported() {
            return Err(ErrorCode::ProtocolMismatch);
        }

        if frame.destination_zone != self.zone.as_destination() {
            let proxy = self.route_to(frame.destination_zone, frame.known_direction_zone)?;
            return proxy.forward_add_ref(frame).await;
        }

        let (add_refs, releases) = split_back_channel(&frame.back_channel);
        self.apply_add_refs(&add_refs)?;

        let stub = self
            .object_stub(frame.object)
            .ok_or(ErrorCode::ObjectNotFound)?;
        let total = stub.add_ref(frame.caller_zone);
        debug!(
            zone = %self.zone,
            object = %frame.object,
            caller = %frame.caller_zone,
            total,
            "add_ref applied"
        );

        if frame.options == AddRefOptions::BuildOutParamChannel {
            self.ensure_reverse_channel(frame.caller_zone, frame.known_direction_zone);
        }

        self.apply_releases(&releases);
        Ok(Vec::new())
    }

    /// Dispatches an inbound `release` frame.
    ///
    /// When the object's total count reaches zero the stub is destroyed
    /// synchronously; any later operation naming the object fails with
    /// `OBJECT_NOT_FOUND`.
    pub async fn handle_release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode> {
        if !frame.is_version_supported() {
            return Err(ErrorCode::ProtocolMismatch);
        }

        if frame.destination_zone != self.zone.as_destination() {
            let proxy = self.route_to(frame.destination_zone, KnownDirectionZone::null())?;
            return proxy.forward_release(frame).await;
        }

        let (add_refs, releases) = split_back_channel(&frame.back_channel);
        self.apply_add_refs(&add_refs)?;

        let stub = self
            .object_stub(frame.object)
            .ok_or(ErrorCode::ObjectNotFound)?;
        let total = stub.release(frame.caller_zone)?;
        debug!(
            zone = %self.zone,
            object = %frame.object,
            caller = %frame.caller_zone,
            total,
            "release applied"
        );

        if total == 0 {
            self.stubs
                .remove_if(&frame.object, |_, stub| stub.total_refs() == 0);
            debug!(zone = %self.zone, object = %frame.object, "stub destroyed");
        }

        self.apply_releases(&releases);
        Ok(Vec::new())
    }

    // ---- routing -------------------------------------------------------

    /// Finds the edge to forward a frame through.
    ///
    /// Preference order: a proxy fronting the destination directly, a proxy
    /// fronting the `known_direction` hint (the peer that introduced the
    /// reference), then the parent edge of a child service.
    fn route_to(
        &self,
        destination: DestinationZone,
        known_direction: KnownDirectionZone,
    ) -> Result<Arc<ServiceProxy>, ErrorCode> {
        if let Some(proxy) = self.proxy_for(destination) {
            return Ok(proxy);
        }

        if !known_direction.is_null() {
            if let Some(via) = self.proxy_for(DestinationZone::new(known_direction.get())) {
                let clone = via.clone_for_destination(destination);
                let proxy = self
                    .proxies
                    .entry(destination)
                    .or_insert(clone)
                    .clone();
                return Ok(proxy);
            }
        }

        self.parent.get_nullable().ok_or(ErrorCode::ZoneUnreachable)
    }

    /// Makes sure an edge back toward `caller` exists so the owner can
    /// accept callbacks, cloning the path the reference arrived through.
    fn ensure_reverse_channel(&self, caller: CallerZone, known_direction: KnownDirectionZone) {
        let destination = caller.as_destination();
        if self.proxies.contains_key(&destination) {
            return;
        }

        let via = if known_direction.is_null() {
            None
        } else {
            self.proxy_for(DestinationZone::new(known_direction.get()))
        };

        match via.or_else(|| self.parent.get_nullable()) {
            Some(proxy) => {
                let clone = proxy.clone_for_destination(destination);
                self.proxies.entry(destination).or_insert(clone);
                debug!(zone = %self.zone, %caller, "reverse channel installed");
            }
            None => debug!(zone = %self.zone, %caller, "no route available for reverse channel"),
        }
    }

    // ---- back channel --------------------------------------------------

    /// Applies piggybacked add_refs. These run before the frame's main
    /// operation: a descriptor must hold its reference before it is exposed.
    fn apply_add_refs(&self, entries: &[BackChannelEntry]) -> Result<(), ErrorCode> {
        for entry in entries {
            if let BackChannelEntry::AddRef {
                destination_zone,
                object,
                caller_zone,
                ..
            } = entry
            {
                if *destination_zone != self.zone.as_destination() {
                    warn!(zone = %self.zone, %destination_zone, "misrouted back-channel add_ref");
                    continue;
                }
                let stub = self
                    .object_stub(*object)
                    .ok_or(ErrorCode::ObjectNotFound)?;
                stub.add_ref(*caller_zone);
            }
        }
        Ok(())
    }

    /// Applies piggybacked releases. These run after the main operation; a
    /// rejected entry is logged rather than failing the completed call.
    fn apply_releases(&self, entries: &[BackChannelEntry]) {
        for entry in entries {
            if let BackChannelEntry::Release {
                destination_zone,
                object,
                caller_zone,
                ..
            } = entry
            {
                if *destination_zone != self.zone.as_destination() {
                    warn!(zone = %self.zone, %destination_zone, "misrouted back-channel release");
                    continue;
                }
                match self.object_stub(*object) {
                    Some(stub) => match stub.release(*caller_zone) {
                        Ok(0) => {
                            self.stubs.remove_if(object, |_, stub| stub.total_refs() == 0);
                            debug!(zone = %self.zone, %object, "stub destroyed via back channel");
                        }
                        Ok(_) => {}
                        Err(code) => {
                            warn!(zone = %self.zone, %object, %code, "back-channel release rejected");
                        }
                    },
                    None => {
                        warn!(zone = %self.zone, %object, "back-channel release for unknown object");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("zone", &self.zone)
            .field("objects", &self.object_count())
            .field("proxies", &self.proxy_count())
            .finish()
    }
}

fn split_back_channel(
    entries: &[BackChannelEntry],
) -> (Vec<BackChannelEntry>, Vec<BackChannelEntry>) {
    entries
        .iter()
        .copied()
        .partition(|entry| matches!(entry, BackChannelEntry::AddRef { .. }))
}
