//! Encoding registry and generic serialisation entry points.
//!
//! The runtime is encoding-polymorphic: the caller's service proxy selects
//! an [`Encoding`] per call and transmits it in the frame header; the stub
//! dispatches on the received value. The generic [`serialise`] and
//! [`deserialise`] functions perform that dispatch for any type that
//! implements [`Marshalled`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Maximum size of a serialised payload (10 MB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// zstd level for the compressed binary encoding.
const COMPRESSION_LEVEL: i32 = 3;

/// Supported wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Encoding {
    /// Self-describing JSON.
    Json = 1,
    /// Compact binary.
    Binary = 2,
    /// Binary with zstd compression applied to the payload.
    CompressedBinary = 3,
    /// Protocol Buffers. Only available for types generated with protobuf
    /// support enabled.
    ProtocolBuffers = 4,
}

impl Encoding {
    /// Returns the numeric wire value of this encoding.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates an encoding from a numeric wire value.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Json),
            2 => Some(Self::Binary),
            3 => Some(Self::CompressedBinary),
            4 => Some(Self::ProtocolBuffers),
            _ => None,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Binary => write!(f, "binary"),
            Self::CompressedBinary => write!(f, "compressed_binary"),
            Self::ProtocolBuffers => write!(f, "protocol_buffers"),
        }
    }
}

/// A type that can cross a zone boundary.
///
/// The serde-backed encodings come for free from the supertraits. Protocol
/// Buffers support is opt-in: generated code overrides the protobuf hooks
/// when the interface was generated with protobuf enabled, otherwise the
/// defaults report the encoding as unsupported and the call fails with
/// `INVALID_ENCODING` at the dispatch layer.
pub trait Marshalled: Serialize + DeserializeOwned {
    /// Encodes this value as a Protocol Buffers message.
    fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Err(ProtocolError::UnsupportedEncoding(
            Encoding::ProtocolBuffers,
        ))
    }

    /// Decodes a value from a Protocol Buffers message.
    fn protobuf_decode(_bytes: &[u8]) -> Result<Self, ProtocolError> {
        Err(ProtocolError::UnsupportedEncoding(
            Encoding::ProtocolBuffers,
        ))
    }

    /// Whether this type implements the given encoding.
    #[must_use]
    fn supports(encoding: Encoding) -> bool {
        !matches!(encoding, Encoding::ProtocolBuffers)
    }
}

/// Serialises a value with the requested encoding.
pub fn serialise<T: Marshalled>(value: &T, encoding: Encoding) -> Result<Vec<u8>, ProtocolError> {
    let bytes = match encoding {
        Encoding::Json => {
            serde_json::to_vec(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))?
        }
        Encoding::Binary => {
            bincode::serialize(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))?
        }
        Encoding::CompressedBinary => {
            let raw = bincode::serialize(value)
                .map_err(|e| ProtocolError::Serialisation(e.to_string()))?;
            zstd::stream::encode_all(raw.as_slice(), COMPRESSION_LEVEL)?
        }
        Encoding::ProtocolBuffers => value.protobuf_encode()?,
    };

    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(bytes)
}

/// Deserialises a value with the requested encoding.
pub fn deserialise<T: Marshalled>(encoding: Encoding, bytes: &[u8]) -> Result<T, ProtocolError> {
    match encoding {
        Encoding::Json => {
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
        }
        Encoding::Binary => {
            bincode::deserialize(bytes).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
        }
        Encoding::CompressedBinary => {
            let raw = zstd::stream::decode_all(bytes)
                .map_err(|e| ProtocolError::Deserialisation(e.to_string()))?;
            bincode::deserialize(&raw).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
        }
        Encoding::ProtocolBuffers => T::protobuf_decode(bytes),
    }
}

/// Returns the serialised size of a value under the requested encoding.
///
/// The compressed and protobuf encodings require a full serialisation pass
/// to answer; the others are computed directly.
pub fn saved_size<T: Marshalled>(value: &T, encoding: Encoding) -> Result<u64, ProtocolError> {
    match encoding {
        Encoding::Binary => {
            bincode::serialized_size(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))
        }
        _ => Ok(serialise(value, encoding)?.len() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<u32>,
    }

    impl Marshalled for Sample {}

    fn sample() -> Sample {
        Sample {
            name: "probe".to_owned(),
            values: vec![1, 2, 3, 500_000],
        }
    }

    #[test]
    fn encoding_wire_roundtrip() {
        for encoding in [
            Encoding::Json,
            Encoding::Binary,
            Encoding::CompressedBinary,
            Encoding::ProtocolBuffers,
        ] {
            assert_eq!(Encoding::from_u8(encoding.as_u8()), Some(encoding));
        }

        assert_eq!(Encoding::from_u8(0), None);
        assert_eq!(Encoding::from_u8(99), None);
    }

    #[test]
    fn serde_encodings_roundtrip() {
        for encoding in [Encoding::Json, Encoding::Binary, Encoding::CompressedBinary] {
            let bytes = serialise(&sample(), encoding).unwrap();
            let restored: Sample = deserialise(encoding, &bytes).unwrap();
            assert_eq!(restored, sample());
        }
    }

    #[test]
    fn protobuf_unsupported_by_default() {
        let error = serialise(&sample(), Encoding::ProtocolBuffers).unwrap_err();
        assert!(matches!(error, ProtocolError::UnsupportedEncoding(_)));

        assert!(!Sample::supports(Encoding::ProtocolBuffers));
        assert!(Sample::supports(Encoding::Binary));
    }

    #[test]
    fn saved_size_matches_serialised_length() {
        for encoding in [Encoding::Json, Encoding::Binary, Encoding::CompressedBinary] {
            let size = saved_size(&sample(), encoding).unwrap();
            let bytes = serialise(&sample(), encoding).unwrap();
            assert_eq!(size, bytes.len() as u64);
        }
    }

    #[test]
    fn malformed_input_is_a_deserialisation_error() {
        let error = deserialise::<Sample>(Encoding::Json, b"{not json").unwrap_err();
        assert!(matches!(error, ProtocolError::Deserialisation(_)));

        let error = deserialise::<Sample>(Encoding::CompressedBinary, b"\x00\x01").unwrap_err();
        assert!(matches!(error, ProtocolError::Deserialisation(_)));
    }
}
