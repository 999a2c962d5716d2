//! Identifier types used across the runtime.
//!
//! Each identifier is a distinct wrapper over a `u64`. The wrappers are
//! comparable and hashable but deliberately not interconvertible: a
//! [`CallerZone`] cannot be passed where a [`DestinationZone`] is expected
//! without an explicit conversion, which removes a whole class of routing
//! bugs at call sites.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// The null identifier.
            #[must_use]
            pub const fn null() -> Self {
                Self(0)
            }

            /// Checks whether this is the null identifier.
            #[must_use]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Identity of a service within a topology.
    Zone
);

define_id!(
    /// The zone that owns an object being referenced.
    DestinationZone
);

define_id!(
    /// The zone from which a reference is held.
    ///
    /// Used as the key of per-caller reference counts.
    CallerZone
);

define_id!(
    /// Routing hint attached to the frame that introduced a descriptor.
    ///
    /// Forwarders preserve it verbatim; it binds the paired back-channel
    /// add_ref/release of a single routing event.
    KnownDirectionZone
);

define_id!(
    /// Identity of an object within its owning zone.
    ObjectId
);

define_id!(
    /// Stable fingerprint of an interface and version.
    InterfaceOrdinal
);

define_id!(
    /// Ordinal of a method within an interface.
    MethodId
);

impl Zone {
    /// This zone viewed as a routing destination.
    #[must_use]
    pub const fn as_destination(self) -> DestinationZone {
        DestinationZone(self.0)
    }

    /// This zone viewed as the holder of a reference.
    #[must_use]
    pub const fn as_caller(self) -> CallerZone {
        CallerZone(self.0)
    }
}

impl DestinationZone {
    /// The destination interpreted as a plain zone identity.
    #[must_use]
    pub const fn as_zone(self) -> Zone {
        Zone(self.0)
    }

    /// The destination viewed as the holder of a reference.
    #[must_use]
    pub const fn as_caller(self) -> CallerZone {
        CallerZone(self.0)
    }
}

impl CallerZone {
    /// The caller interpreted as a routing destination (for reverse paths).
    #[must_use]
    pub const fn as_destination(self) -> DestinationZone {
        DestinationZone(self.0)
    }

    /// The caller viewed as a routing hint.
    #[must_use]
    pub const fn as_known_direction(self) -> KnownDirectionZone {
        KnownDirectionZone(self.0)
    }
}

/// The wire form of any cross-zone object reference.
///
/// Every interface-typed parameter marshals to a descriptor; the receiving
/// side resolves it to a concrete typed proxy or stub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// The zone that owns the object.
    pub destination_zone: DestinationZone,
    /// The object within its owning zone.
    pub object: ObjectId,
}

impl InterfaceDescriptor {
    /// The null reference.
    pub const NULL: Self = Self {
        destination_zone: DestinationZone(0),
        object: ObjectId(0),
    };

    /// Creates a descriptor for an object hosted in `destination_zone`.
    #[must_use]
    pub const fn new(destination_zone: DestinationZone, object: ObjectId) -> Self {
        Self {
            destination_zone,
            object,
        }
    }

    /// Checks whether this is the null reference.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.destination_zone.is_null() && self.object.is_null()
    }
}

impl std::fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.destination_zone, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_distinct_types() {
        // A function taking a DestinationZone cannot receive a CallerZone;
        // the conversions below are the only sanctioned bridges.
        fn route(dest: DestinationZone) -> u64 {
            dest.get()
        }

        let zone = Zone::new(7);
        assert_eq!(route(zone.as_destination()), 7);
        assert_eq!(zone.as_caller().get(), 7);
        assert_eq!(zone.as_caller().as_destination().get(), 7);
    }

    #[test]
    fn null_identifiers() {
        assert!(Zone::null().is_null());
        assert!(!ObjectId::new(1).is_null());
        assert!(InterfaceDescriptor::NULL.is_null());

        let descriptor = InterfaceDescriptor::new(DestinationZone::new(2), ObjectId::new(9));
        assert!(!descriptor.is_null());
    }

    #[test]
    fn identifier_serialises_as_raw_u64() {
        let object = ObjectId::new(42);
        let json = serde_json::to_string(&object).unwrap();
        assert_eq!(json, "42");

        let restored: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, object);
    }

    #[test]
    fn descriptor_display() {
        let descriptor = InterfaceDescriptor::new(DestinationZone::new(3), ObjectId::new(11));
        assert_eq!(descriptor.to_string(), "3.11");
    }
}
