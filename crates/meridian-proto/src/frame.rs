//! RPC operation frames and the refcount back channel.
//!
//! Conceptually every frame is header + encoding-specific body + trailer.
//! The header carries routing identity (`caller_zone`, `destination_zone`,
//! `object`, `interface`, `method`), the protocol version and the selected
//! encoding; the trailer is a list of [`BackChannelEntry`] refcount deltas
//! that routing zones piggyback on the frame instead of paying a round trip
//! per hop.

use serde::{Deserialize, Serialize};

use crate::encoding::{Encoding, Marshalled};
use crate::types::{
    CallerZone, DestinationZone, InterfaceOrdinal, KnownDirectionZone, MethodId, ObjectId,
};

/// Behaviour requested of an `add_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddRefOptions {
    /// Plain increment.
    Normal = 0,
    /// The owner should additionally prepare to accept callbacks from the
    /// destination zone, allocating a reverse service proxy if none exists.
    BuildOutParamChannel = 1,
}

/// Behaviour requested of a `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReleaseOptions {
    /// Plain decrement.
    Normal = 0,
    /// The caller will issue no further releases on this path; the owner may
    /// collapse routing state for it.
    FinalOnPath = 1,
}

/// A refcount delta carried alongside an unrelated RPC frame.
///
/// Forwarding zones emit a paired `AddRef` (on behalf of the downstream
/// receiver, in the same frame that carries the descriptor) and a later
/// `Release` (of their own transit reference). The `known_direction_zone`
/// hint binds the pair to the routing event that introduced the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackChannelEntry {
    /// An increment to apply before the frame's main operation is exposed.
    AddRef {
        destination_zone: DestinationZone,
        object: ObjectId,
        caller_zone: CallerZone,
        known_direction_zone: KnownDirectionZone,
        options: AddRefOptions,
    },
    /// A decrement to apply after the frame's main operation completes.
    Release {
        destination_zone: DestinationZone,
        object: ObjectId,
        caller_zone: CallerZone,
        options: ReleaseOptions,
    },
}

/// Header + body of a `send` or `post` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Protocol version of the sender.
    pub protocol_version: u64,
    /// Encoding of `payload`.
    pub encoding: Encoding,
    /// Correlates a response with its request on tagged transports.
    pub tag: u64,
    /// The zone the call originates from.
    pub caller_zone: CallerZone,
    /// The zone that owns the target object.
    pub destination_zone: DestinationZone,
    /// The target object.
    pub object: ObjectId,
    /// The interface being invoked.
    pub interface: InterfaceOrdinal,
    /// The method within the interface.
    pub method: MethodId,
    /// Encoding-specific request blob.
    pub payload: Vec<u8>,
    /// Refcount deltas piggybacked on this frame.
    pub back_channel: Vec<BackChannelEntry>,
}

/// Result of a `send`: the response blob plus the trailer produced by the
/// destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Encoding-specific response blob.
    pub payload: Vec<u8>,
    /// Refcount deltas produced while servicing the call.
    pub back_channel: Vec<BackChannelEntry>,
}

/// Header of a `try_cast` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastFrame {
    pub protocol_version: u64,
    pub destination_zone: DestinationZone,
    pub object: ObjectId,
    /// The interface the caller wants to cast to.
    pub interface: InterfaceOrdinal,
    pub back_channel: Vec<BackChannelEntry>,
}

/// Header of an `add_ref` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRefFrame {
    pub protocol_version: u64,
    pub destination_zone: DestinationZone,
    pub object: ObjectId,
    /// The zone that will hold the new reference.
    pub caller_zone: CallerZone,
    /// Hint attributing this reference to the routing event that introduced
    /// it; preserved verbatim by forwarders.
    pub known_direction_zone: KnownDirectionZone,
    pub options: AddRefOptions,
    pub back_channel: Vec<BackChannelEntry>,
}

/// Header of a `release` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFrame {
    pub protocol_version: u64,
    pub destination_zone: DestinationZone,
    pub object: ObjectId,
    /// The zone giving up its reference.
    pub caller_zone: CallerZone,
    pub options: ReleaseOptions,
    pub back_channel: Vec<BackChannelEntry>,
}

impl Marshalled for BackChannelEntry {}
impl Marshalled for CallFrame {}
impl Marshalled for SendResult {}
impl Marshalled for CastFrame {}
impl Marshalled for AddRefFrame {}
impl Marshalled for ReleaseFrame {}

macro_rules! versioned_frame {
    ($($frame:ident),+) => {
        $(
            impl $frame {
                /// Checks whether the frame's version is inside the
                /// supported window.
                #[must_use]
                pub const fn is_version_supported(&self) -> bool {
                    self.protocol_version >= crate::version::MIN_SUPPORTED
                        && self.protocol_version <= crate::version::CURRENT
                }
            }
        )+
    };
}

versioned_frame!(CallFrame, CastFrame, AddRefFrame, ReleaseFrame);
