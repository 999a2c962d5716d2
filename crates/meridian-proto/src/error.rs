//! Error types for the protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::Encoding;

/// Local protocol errors raised by the encoding layer.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Deserialisation error.
    #[error("deserialisation error: {0}")]
    Deserialisation(String),

    /// The encoding discriminant on the wire is not known.
    #[error("unknown encoding: {0}")]
    UnknownEncoding(u8),

    /// The type does not implement the requested encoding.
    #[error("encoding not supported by this type: {0}")]
    UnsupportedEncoding(Encoding),

    /// Message too large.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// RPC status codes carried on the wire.
///
/// Every RPC operation resolves to one of these. Codes are grouped by
/// category:
/// - 1-19: dispatch errors (the frame reached the owner but could not bind)
/// - 20-39: serialisation errors
/// - 40-59: transport and routing errors
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,

    // Dispatch errors (1-19)
    /// No stub with the requested object id exists in the destination zone.
    ObjectNotFound = 1,
    /// The object does not implement the requested interface.
    InterfaceNotSupported = 2,
    /// The interface has no method with the requested ordinal.
    MethodNotFound = 3,
    /// The encoding value is unknown or unsupported by the stub.
    InvalidEncoding = 4,

    // Serialisation errors (20-39)
    /// The proxy could not encode the request or decode the response.
    ProxyDeserialisationError = 20,
    /// The stub could not decode the request.
    StubDeserialisationError = 21,

    // Transport and routing errors (40-59)
    /// Release of an unknown (object, caller) pair.
    ReferenceCountError = 40,
    /// The transport failed to deliver the frame.
    TransportError = 41,
    /// The operation's deadline elapsed before an acknowledgement arrived.
    Timeout = 42,
    /// No route to the destination zone exists.
    ZoneUnreachable = 43,
    /// The frame's protocol version is outside the supported window.
    ProtocolMismatch = 44,

    /// A stub implementation failed in an unclassified way.
    InternalError = 60,
}

impl ErrorCode {
    /// Returns the numeric value of this code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates a code from a numeric value.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::ObjectNotFound),
            2 => Some(Self::InterfaceNotSupported),
            3 => Some(Self::MethodNotFound),
            4 => Some(Self::InvalidEncoding),
            20 => Some(Self::ProxyDeserialisationError),
            21 => Some(Self::StubDeserialisationError),
            40 => Some(Self::ReferenceCountError),
            41 => Some(Self::TransportError),
            42 => Some(Self::Timeout),
            43 => Some(Self::ZoneUnreachable),
            44 => Some(Self::ProtocolMismatch),
            60 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Checks whether this is the success code.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Checks if this is a dispatch error (1-19).
    #[must_use]
    pub const fn is_dispatch_error(self) -> bool {
        matches!(self.as_u8(), 1..=19)
    }

    /// Checks if this is a serialisation error (20-39).
    #[must_use]
    pub const fn is_serialisation_error(self) -> bool {
        matches!(self.as_u8(), 20..=39)
    }

    /// Checks if this is a transport or routing error (40-59).
    ///
    /// These are the codes a caller may meaningfully retry.
    #[must_use]
    pub const fn is_transport_error(self) -> bool {
        matches!(self.as_u8(), 40..=59)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::ObjectNotFound => write!(f, "object_not_found"),
            Self::InterfaceNotSupported => write!(f, "interface_not_supported"),
            Self::MethodNotFound => write!(f, "method_not_found"),
            Self::InvalidEncoding => write!(f, "invalid_encoding"),
            Self::ProxyDeserialisationError => write!(f, "proxy_deserialisation_error"),
            Self::StubDeserialisationError => write!(f, "stub_deserialisation_error"),
            Self::ReferenceCountError => write!(f, "reference_count_error"),
            Self::TransportError => write!(f, "transport_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::ZoneUnreachable => write!(f, "zone_unreachable"),
            Self::ProtocolMismatch => write!(f, "protocol_mismatch"),
            Self::InternalError => write!(f, "internal_error"),
        }
    }
}

impl std::error::Error for ErrorCode {}

impl From<ProtocolError> for ErrorCode {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Serialisation(_) | ProtocolError::Deserialisation(_) => {
                Self::ProxyDeserialisationError
            }
            ProtocolError::UnknownEncoding(_) | ProtocolError::UnsupportedEncoding(_) => {
                Self::InvalidEncoding
            }
            ProtocolError::MessageTooLarge { .. } | ProtocolError::Io(_) => Self::TransportError,
        }
    }
}
