//! Round-trip properties for every serde-backed encoding.
//!
//! For any value and any encoding the stub can decode what the proxy
//! encoded, bit-for-bit.

use meridian_proto::{
    deserialise, serialise, AddRefFrame, AddRefOptions, BackChannelEntry, CallFrame, CallerZone,
    DestinationZone, Encoding, InterfaceDescriptor, InterfaceOrdinal, KnownDirectionZone, Marshalled,
    MethodId, ObjectId, ReleaseOptions,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MixedParams {
    count: i64,
    ratio: f64,
    label: String,
    raw: Vec<u8>,
    scalars: Vec<u32>,
    table: std::collections::BTreeMap<String, i32>,
    reference: InterfaceDescriptor,
}

impl Marshalled for MixedParams {}

fn serde_encodings() -> [Encoding; 3] {
    [Encoding::Json, Encoding::Binary, Encoding::CompressedBinary]
}

fn arb_descriptor() -> impl Strategy<Value = InterfaceDescriptor> {
    (any::<u64>(), any::<u64>()).prop_map(|(zone, object)| {
        InterfaceDescriptor::new(DestinationZone::new(zone), ObjectId::new(object))
    })
}

fn arb_params() -> impl Strategy<Value = MixedParams> {
    (
        any::<i64>(),
        any::<f64>().prop_filter("JSON carries finite floats only", |f| f.is_finite()),
        ".{0,32}",
        proptest::collection::vec(any::<u8>(), 0..256),
        proptest::collection::vec(any::<u32>(), 0..32),
        proptest::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..8),
        arb_descriptor(),
    )
        .prop_map(
            |(count, ratio, label, raw, scalars, table, reference)| MixedParams {
                count,
                ratio,
                label,
                raw,
                scalars,
                table,
                reference,
            },
        )
}

fn arb_back_channel() -> impl Strategy<Value = BackChannelEntry> {
    (any::<u64>(), any::<u64>(), any::<u64>(), any::<u64>(), any::<bool>()).prop_map(
        |(dest, object, caller, hint, is_add)| {
            if is_add {
                BackChannelEntry::AddRef {
                    destination_zone: DestinationZone::new(dest),
                    object: ObjectId::new(object),
                    caller_zone: CallerZone::new(caller),
                    known_direction_zone: KnownDirectionZone::new(hint),
                    options: AddRefOptions::Normal,
                }
            } else {
                BackChannelEntry::Release {
                    destination_zone: DestinationZone::new(dest),
                    object: ObjectId::new(object),
                    caller_zone: CallerZone::new(caller),
                    options: ReleaseOptions::Normal,
                }
            }
        },
    )
}

proptest! {
    #[test]
    fn params_roundtrip_every_encoding(params in arb_params()) {
        for encoding in serde_encodings() {
            let bytes = serialise(&params, encoding).unwrap();
            let restored: MixedParams = deserialise(encoding, &bytes).unwrap();
            prop_assert_eq!(&restored, &params);
        }
    }

    #[test]
    fn call_frames_roundtrip(
        tag in any::<u64>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        back_channel in proptest::collection::vec(arb_back_channel(), 0..4),
    ) {
        let frame = CallFrame {
            protocol_version: meridian_proto::version::CURRENT,
            encoding: Encoding::Binary,
            tag,
            caller_zone: CallerZone::new(1),
            destination_zone: DestinationZone::new(2),
            object: ObjectId::new(3),
            interface: InterfaceOrdinal::new(4),
            method: MethodId::new(5),
            payload,
            back_channel,
        };

        for encoding in serde_encodings() {
            let bytes = serialise(&frame, encoding).unwrap();
            let restored: CallFrame = deserialise(encoding, &bytes).unwrap();
            prop_assert_eq!(&restored, &frame);
        }
    }

    #[test]
    fn add_ref_frames_roundtrip(dest in any::<u64>(), object in any::<u64>(), caller in any::<u64>()) {
        let frame = AddRefFrame {
            protocol_version: meridian_proto::version::CURRENT,
            destination_zone: DestinationZone::new(dest),
            object: ObjectId::new(object),
            caller_zone: CallerZone::new(caller),
            known_direction_zone: KnownDirectionZone::null(),
            options: AddRefOptions::BuildOutParamChannel,
            back_channel: Vec::new(),
        };

        let bytes = serialise(&frame, Encoding::CompressedBinary).unwrap();
        let restored: AddRefFrame = deserialise(Encoding::CompressedBinary, &bytes).unwrap();
        prop_assert_eq!(&restored, &frame);
    }
}
