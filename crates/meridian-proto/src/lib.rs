//! Wire protocol types for the meridian inter-zone RPC runtime.
//!
//! This crate defines everything that crosses a zone boundary:
//!
//! - Strongly typed identifiers ([`Zone`], [`DestinationZone`],
//!   [`CallerZone`], [`ObjectId`], [`InterfaceOrdinal`], [`MethodId`], ...)
//! - The [`InterfaceDescriptor`] wire form of an object reference
//! - The per-call [`Encoding`] registry and generic
//!   [`serialise`]/[`deserialise`] dispatch
//! - The five RPC operation frames and the refcount back channel
//! - The wire [`ErrorCode`] taxonomy
//!
//! # Wire Frame
//!
//! Every operation is conceptually header + body + trailer:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header: version │ encoding │ tag │ caller │ dest │ object │  │
//! │         interface ordinal │ method ordinal                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Body: encoding-specific request or response blob             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Trailer: back_channel[] of refcount deltas                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! No encoding is canonical: transports move the header and trailer however
//! they like, and the body is opaque to everything but the generated
//! serialisers selected by `(interface, method, encoding)`.

mod encoding;
mod error;
mod frame;
mod types;

pub use encoding::{deserialise, saved_size, serialise, Encoding, Marshalled, MAX_MESSAGE_SIZE};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{
    AddRefFrame, AddRefOptions, BackChannelEntry, CallFrame, CastFrame, ReleaseFrame,
    ReleaseOptions, SendResult,
};
pub use types::{
    CallerZone, DestinationZone, InterfaceDescriptor, InterfaceOrdinal, KnownDirectionZone,
    MethodId, ObjectId, Zone,
};

impl Marshalled for InterfaceDescriptor {}

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u64 = 3;

    /// Minimum protocol version accepted from peers.
    pub const MIN_SUPPORTED: u64 = 2;
}
