//! Criterion benchmarks for the LinkPair fixed-layout codec.
//!
//! The receive path decodes every inbound frame of handshake size, paired or
//! not, so decoding sits on the radio callback's hot path.
//!
//! Run with:
//! ```bash
//! cargo bench --package linkpair-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use linkpair_core::protocol::codec::{decode_message, decode_record, encode_message, encode_record};
use linkpair_core::protocol::messages::{MessageType, PairingMessage};
use linkpair_core::{MacAddress, PairingRecord, PairingStatus};

const NODE: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0xA1, 0xB2, 0xC3]);

fn fixtures() -> Vec<(&'static str, PairingMessage)> {
    vec![
        ("Request", PairingMessage::new(MessageType::Request, NODE)),
        ("Response", PairingMessage::new(MessageType::Response, NODE)),
        ("Confirm", PairingMessage::new(MessageType::Confirm, NODE)),
        ("AppCommand", PairingMessage::application(NODE, [0x5A; 8])),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");
    for (name, msg) in fixtures() {
        let bytes = encode_message(&msg).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| decode_message(black_box(bytes)).expect("decode must succeed"))
        });
    }

    // A 250-byte application frame: only the 15-byte prefix is examined.
    let mut long_frame = encode_message(&PairingMessage::application(NODE, [0; 8])).unwrap();
    long_frame.resize(250, 0xA5);
    group.bench_function("long_application_frame", |b| {
        b.iter(|| decode_message(black_box(&long_frame)).expect("decode must succeed"))
    });
    group.finish();
}

fn bench_record(c: &mut Criterion) {
    let record = PairingRecord::new(NODE, PairingStatus::Paired);
    c.bench_function("record_encode_decode_normalize", |b| {
        b.iter(|| {
            let bytes = encode_record(black_box(&record)).unwrap();
            decode_record(black_box(&bytes)).unwrap().normalize()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_record);
criterion_main!(benches);
