//! Benchmarks for the encoding dispatch layer.
//!
//! Run with: cargo bench -p meridian-proto

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meridian_proto::{
    deserialise, serialise, CallFrame, CallerZone, DestinationZone, Encoding, InterfaceOrdinal,
    MethodId, ObjectId,
};

fn call_frame(payload_size: usize) -> CallFrame {
    CallFrame {
        protocol_version: meridian_proto::version::CURRENT,
        encoding: Encoding::Binary,
        tag: 1,
        caller_zone: CallerZone::new(1),
        destination_zone: DestinationZone::new(2),
        object: ObjectId::new(3),
        interface: InterfaceOrdinal::new(0x1234_5678),
        method: MethodId::new(4),
        payload: vec![0u8; payload_size],
        back_channel: Vec::new(),
    }
}

fn bench_serialise(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialise");

    for encoding in [Encoding::Json, Encoding::Binary, Encoding::CompressedBinary] {
        for size in [64usize, 1024, 8192, 65536] {
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(encoding.to_string(), size),
                &size,
                |b, &size| {
                    let frame = call_frame(size);
                    b.iter(|| {
                        let bytes = serialise(black_box(&frame), encoding).unwrap();
                        black_box(bytes.len())
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_deserialise(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialise");

    for encoding in [Encoding::Json, Encoding::Binary, Encoding::CompressedBinary] {
        for size in [64usize, 1024, 8192] {
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(encoding.to_string(), size),
                &size,
                |b, &size| {
                    let bytes = serialise(&call_frame(size), encoding).unwrap();
                    b.iter(|| {
                        let frame: CallFrame = deserialise(encoding, black_box(&bytes)).unwrap();
                        black_box(frame)
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_serialise, bench_deserialise);
criterion_main!(benches);
