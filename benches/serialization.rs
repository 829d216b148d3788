//! bincode encode/decode of the sample values.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pingpong_bench::serialization::{Bar, Foo, IntPair, NodeId, SerializationFixture};

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization/save");
    let mut fixture = SerializationFixture::new();
    let (foo, bar, message) = (fixture.foo, fixture.bar.clone(), fixture.message);
    let (hashed, uri) = (fixture.hashed_node_id.clone(), fixture.uri_node_id.clone());

    group.bench_function("foo", |b| b.iter(|| fixture.save(black_box(&foo)).map(|s| s.len()).expect("save")));
    group.bench_function("bar", |b| b.iter(|| fixture.save(black_box(&bar)).map(|s| s.len()).expect("save")));
    group.bench_function("hashed_node_id", |b| {
        b.iter(|| fixture.save(black_box(&hashed)).map(|s| s.len()).expect("save"))
    });
    group.bench_function("uri_node_id", |b| {
        b.iter(|| fixture.save(black_box(&uri)).map(|s| s.len()).expect("save"))
    });
    group.bench_function("message", |b| {
        b.iter(|| fixture.save(black_box(&message)).map(|s| s.len()).expect("save"))
    });
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization/load");
    let mut fixture = SerializationFixture::new();
    fixture.set_up().expect("set up");
    let encoded = fixture.encoded().cloned().expect("encoded values");

    group.bench_function("foo", |b| b.iter(|| fixture.load::<Foo>(black_box(&encoded.foo)).expect("load")));
    group.bench_function("bar", |b| b.iter(|| fixture.load::<Bar>(black_box(&encoded.bar)).expect("load")));
    group.bench_function("hashed_node_id", |b| {
        b.iter(|| fixture.load::<NodeId>(black_box(&encoded.hashed_node_id)).expect("load"))
    });
    group.bench_function("uri_node_id", |b| {
        b.iter(|| fixture.load::<NodeId>(black_box(&encoded.uri_node_id)).expect("load"))
    });
    group.bench_function("message", |b| {
        b.iter(|| fixture.load::<IntPair>(black_box(&encoded.message)).expect("load"))
    });
    group.finish();
    fixture.tear_down();
}

criterion_group!(benches, bench_save, bench_load);
criterion_main!(benches);
