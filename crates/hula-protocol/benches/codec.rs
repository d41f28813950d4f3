//! Codec benchmarks for hula-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hula_protocol::{codec, Call, Frame, Query, Response};
use serde_json::json;

fn sample_response() -> Frame {
    let mut query = Query::new();
    query.insert("page".to_string(), json!("1"));
    let call = Call::new(42, "/todo/list", query, true);
    Frame::Response(Response::success(call, json!("<div>".repeat(64))))
}

fn bench_text(c: &mut Criterion) {
    let frame = sample_response();
    let encoded = codec::encode_text(&frame).unwrap();

    let mut group = c.benchmark_group("text");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode", |b| b.iter(|| codec::encode_text(black_box(&frame))));
    group.bench_function("decode", |b| {
        b.iter(|| codec::decode_text(black_box(&encoded)))
    });
    group.finish();
}

fn bench_binary(c: &mut Criterion) {
    let frame = sample_response();
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("binary");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.bench_function("decode", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

criterion_group!(benches, bench_text, bench_binary);
criterion_main!(benches);
