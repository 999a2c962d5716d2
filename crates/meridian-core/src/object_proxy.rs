//! Client-side handles for remote objects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use meridian_proto::{
    DestinationZone, ErrorCode, InterfaceDescriptor, InterfaceOrdinal, KnownDirectionZone,
    MethodId, ObjectId, ReleaseOptions, SendResult, Zone,
};
use tracing::{debug, warn};

use crate::service_proxy::ServiceProxy;
use crate::transport::BackChannel;

/// Client-side handle for one remote object.
///
/// The handle owns one reference at the remote zone: it is acquired (and
/// acknowledged) before [`attach`](Self::attach) returns, and given back on
/// [`release`](Self::release) or drop. Typed interface proxies derived from
/// the handle share it, so the invariant holds that while any interface
/// proxy exists, so does the object proxy and its remote reference.
pub struct ObjectProxy {
    object: ObjectId,
    proxy: Arc<ServiceProxy>,
    /// Interfaces the destination has confirmed via `try_cast`.
    confirmed_casts: DashMap<InterfaceOrdinal, ()>,
    released: AtomicBool,
}

impl ObjectProxy {
    /// Binds a handle to a received descriptor.
    ///
    /// Issues the mandatory `add_ref` toward the owning zone and only
    /// returns once it is acknowledged; until then the descriptor is pending
    /// and must not be exposed. `known_direction` carries the routing hint
    /// from the frame that introduced the descriptor, if any.
    pub async fn attach(
        proxy: Arc<ServiceProxy>,
        descriptor: InterfaceDescriptor,
        known_direction: KnownDirectionZone,
    ) -> Result<Arc<Self>, ErrorCode> {
        if descriptor.is_null() || descriptor.destination_zone != proxy.destination() {
            return Err(ErrorCode::ZoneUnreachable);
        }

        proxy
            .add_ref(
                descriptor.object,
                proxy.zone().as_caller(),
                known_direction,
                meridian_proto::AddRefOptions::Normal,
            )
            .await?;

        proxy.note_object_attached();
        debug!(
            zone = %proxy.zone(),
            destination = %proxy.destination(),
            object = %descriptor.object,
            "object proxy attached"
        );

        Ok(Arc::new(Self {
            object: descriptor.object,
            proxy,
            confirmed_casts: DashMap::new(),
            released: AtomicBool::new(false),
        }))
    }

    /// The remote object's id.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    /// The zone this handle operates from.
    #[must_use]
    pub fn zone(&self) -> Zone {
        self.proxy.zone()
    }

    /// The zone that owns the object.
    #[must_use]
    pub fn destination_zone(&self) -> DestinationZone {
        self.proxy.destination()
    }

    /// The wire descriptor for this handle.
    #[must_use]
    pub fn descriptor(&self) -> InterfaceDescriptor {
        InterfaceDescriptor::new(self.destination_zone(), self.object)
    }

    /// The edge this handle routes through.
    #[must_use]
    pub fn service_proxy(&self) -> &Arc<ServiceProxy> {
        &self.proxy
    }

    /// Invokes a method through the owning edge.
    pub async fn send(
        &self,
        interface: InterfaceOrdinal,
        method: MethodId,
        payload: Vec<u8>,
        back_channel: BackChannel,
    ) -> Result<SendResult, ErrorCode> {
        self.proxy
            .send(self.object, interface, method, payload, back_channel)
            .await
    }

    /// Posts a one-way method invocation through the owning edge.
    pub async fn post(
        &self,
        interface: InterfaceOrdinal,
        method: MethodId,
        payload: Vec<u8>,
        back_channel: BackChannel,
    ) -> Result<(), ErrorCode> {
        self.proxy
            .post(self.object, interface, method, payload, back_channel)
            .await
    }

    /// Asks the owner whether the object supports a further interface.
    ///
    /// Confirmed casts are cached; repeated queries for the same ordinal do
    /// not pay another round trip.
    pub async fn try_cast(&self, interface: InterfaceOrdinal) -> Result<(), ErrorCode> {
        if self.confirmed_casts.contains_key(&interface) {
            return Ok(());
        }

        self.proxy.try_cast(self.object, interface).await?;
        self.confirmed_casts.insert(interface, ());
        Ok(())
    }

    /// Whether a cast to `interface` has already been confirmed.
    #[must_use]
    pub fn cast_confirmed(&self, interface: InterfaceOrdinal) -> bool {
        self.confirmed_casts.contains_key(&interface)
    }

    /// Gives the remote reference back explicitly.
    ///
    /// After this returns, the handle is inert; further calls through it
    /// will be rejected by the owner once the object's total count reaches
    /// zero.
    pub async fn release(&self) -> Result<(), ErrorCode> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self
            .proxy
            .release(
                self.object,
                self.proxy.zone().as_caller(),
                ReleaseOptions::Normal,
            )
            .await;
        self.proxy.note_object_released();
        result.map(|_| ())
    }
}

impl Drop for ObjectProxy {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        // Drop cannot await: give the reference back from a detached task
        // when a runtime is available, otherwise leave it to the owner's
        // zone teardown.
        let proxy = self.proxy.clone();
        let object = self.object;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let caller = proxy.zone().as_caller();
                    if let Err(code) =
                        proxy.release(object, caller, ReleaseOptions::Normal).await
                    {
                        warn!(%object, %code, "detached release failed");
                    }
                    proxy.note_object_released();
                });
            }
            Err(_) => {
                warn!(%object, "object proxy dropped outside a runtime; reference leaked");
                proxy.note_object_released();
            }
        }
    }
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("object", &self.object)
            .field("destination", &self.destination_zone())
            .finish()
    }
}

/// A typed interface proxy that can be constructed over an object proxy.
///
/// Implemented by generated proxies; [`cast`] is the sanctioned way to turn
/// an untyped handle into a typed one.
pub trait Proxied: Sized {
    /// The ordinal of the interface this proxy speaks.
    const INTERFACE: InterfaceOrdinal;

    /// Wraps an object proxy without further checks.
    fn from_object(object: Arc<ObjectProxy>) -> Self;
}

/// Casts an object handle to a typed interface proxy.
///
/// Interfaces are compared by stable ordinal, not type identity: the owner
/// is asked, never guessed.
pub async fn cast<P: Proxied>(object: &Arc<ObjectProxy>) -> Result<P, ErrorCode> {
    object.try_cast(P::INTERFACE).await?;
    Ok(P::from_object(Arc::clone(object)))
}

/// Checks whether two handles point into the same zone.
#[must_use]
pub fn same_zone(first: &ObjectProxy, second: &ObjectProxy) -> bool {
    first.destination_zone() == second.destination_zone()
}
