//! Server-side stubs.
//!
//! A stub binds a concrete implementation to an [`ObjectId`] inside its
//! owning service. Method dispatch below the `(object, interface)` level is
//! code-generated: each interface the implementation exposes contributes an
//! [`InterfaceStub`] that deserialises the request, invokes the
//! implementation and serialises the response.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_proto::{CallerZone, Encoding, ErrorCode, InterfaceOrdinal, MethodId, ObjectId};

use crate::refcount::CallerCounts;

/// One interface exposed by a hosted object.
///
/// Implementations are produced by the code generator; hand-written ones
/// follow the same contract: decode the `[in]` parameters from `payload`
/// with `encoding`, run the implementation, encode the `[out]` parameters
/// plus the method result.
#[async_trait]
pub trait InterfaceStub: Send + Sync {
    /// The ordinal of the interface this stub dispatches.
    fn interface(&self) -> InterfaceOrdinal;

    /// Dispatches one method call.
    ///
    /// Fails with `METHOD_NOT_FOUND` for an unknown ordinal,
    /// `INVALID_ENCODING` for an encoding the generated code does not
    /// support, and `STUB_DESERIALISATION_ERROR` for a malformed payload.
    async fn call(
        &self,
        method: MethodId,
        encoding: Encoding,
        payload: &[u8],
    ) -> Result<Vec<u8>, ErrorCode>;
}

/// A hosted object: its interfaces plus the per-caller refcount table.
pub struct ObjectStub {
    object: ObjectId,
    interfaces: Vec<Arc<dyn InterfaceStub>>,
    counts: CallerCounts,
}

impl ObjectStub {
    /// Creates a stub seeded with one reference held by `initial_holder`.
    #[must_use]
    pub fn new(
        object: ObjectId,
        interfaces: Vec<Arc<dyn InterfaceStub>>,
        initial_holder: CallerZone,
    ) -> Self {
        Self {
            object,
            interfaces,
            counts: CallerCounts::seeded(initial_holder),
        }
    }

    /// The object this stub hosts.
    #[must_use]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Checks whether the object exposes the given interface.
    #[must_use]
    pub fn supports(&self, interface: InterfaceOrdinal) -> bool {
        self.interfaces.iter().any(|i| i.interface() == interface)
    }

    /// Looks up the dispatcher for one interface.
    #[must_use]
    pub fn interface(&self, interface: InterfaceOrdinal) -> Option<Arc<dyn InterfaceStub>> {
        self.interfaces
            .iter()
            .find(|i| i.interface() == interface)
            .cloned()
    }

    /// Increments the count held by `caller`; returns the new total.
    pub fn add_ref(&self, caller: CallerZone) -> u64 {
        self.counts.add(caller)
    }

    /// Decrements the count held by `caller`; returns the new total.
    pub fn release(&self, caller: CallerZone) -> Result<u64, ErrorCode> {
        self.counts.release(caller)
    }

    /// The total reference count across all callers.
    #[must_use]
    pub fn total_refs(&self) -> u64 {
        self.counts.total()
    }

    /// The count held by one caller.
    #[must_use]
    pub fn refs_held_by(&self, caller: CallerZone) -> u64 {
        self.counts.held_by(caller)
    }
}

impl std::fmt::Debug for ObjectStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStub")
            .field("object", &self.object)
            .field("interfaces", &self.interfaces.len())
            .field("total_refs", &self.total_refs())
            .finish()
    }
}
