use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use nprpc_codec::header::{Header, MessageId, MessageType};
use nprpc_codec::object_id::{ObjectFlags, ObjectId};
use nprpc_codec::endpoint::{Endpoint, Transport};
use uuid::Uuid;

fn sample_object_id() -> ObjectId {
    ObjectId {
        object_id: 7,
        poa_idx: 1,
        flags: ObjectFlags::ALL_TRANSPORTS,
        origin: Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0),
        class_id: "Echo".to_string(),
        urls: vec![
            Endpoint::new(Transport::Tcp, "127.0.0.1", 6502),
            Endpoint::new(Transport::WebSocket, "127.0.0.1", 8080).with_path("/rpc"),
        ],
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatbuf");
    group.throughput(Throughput::Elements(1));

    group.bench_function("header_round_trip", |bencher| {
        bencher.iter(|| {
            let mut buf = BytesMut::new();
            let header = Header::new(MessageId::FunctionCall, MessageType::Request, 42, 16);
            header.encode(&mut buf);
            Header::decode(&buf).unwrap();
        })
    });

    let oid = sample_object_id();
    group.bench_function("object_id_round_trip", |bencher| {
        bencher.iter(|| {
            let encoded = oid.encode();
            ObjectId::decode(&encoded).unwrap();
        })
    });

    group.bench_function("object_id_to_string", |bencher| {
        bencher.iter(|| oid.to_string())
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
