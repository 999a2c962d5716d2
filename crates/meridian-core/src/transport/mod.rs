//! Transport abstraction for inter-zone communication.
//!
//! A transport carries the five RPC operations between exactly two zones.
//! The runtime treats every transport uniformly; in-process, TCP and any
//! other medium implement the same contract and differ only in how frames
//! move.

mod inproc;

use async_trait::async_trait;
use meridian_proto::{AddRefFrame, CallFrame, CastFrame, ErrorCode, ReleaseFrame, SendResult};

pub use inproc::{link_zones, InprocTransport};

/// Refcount deltas returned by an operation's acknowledgement.
pub type BackChannel = Vec<meridian_proto::BackChannelEntry>;

/// The transport ABI: five asynchronous operations with identical semantics
/// on every medium.
///
/// Contracts:
/// - `send` is request/response and may suspend until the response frame
///   arrives. It is idempotent only if the target method is.
/// - `post` is fire-and-forget; delivery is best-effort but in-order per
///   `(caller, destination)` channel.
/// - `try_cast` asks the destination whether an object supports a further
///   interface; it fails with `INTERFACE_NOT_SUPPORTED` rather than
///   guessing.
/// - `add_ref` and `release` move the per-caller reference counts; their
///   acknowledgements may carry further back-channel deltas.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers a request frame and waits for the response.
    async fn send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode>;

    /// Delivers a one-way frame.
    async fn post(&self, frame: CallFrame) -> Result<(), ErrorCode>;

    /// Asks the destination whether `frame.object` supports
    /// `frame.interface`.
    async fn try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode>;

    /// Increments the destination's per-caller count for an object.
    async fn add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode>;

    /// Decrements the destination's per-caller count for an object.
    async fn release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode>;
}
