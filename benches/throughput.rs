#![allow(missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use graphwire::{ArrayData, Graph, GraphCodec, Shared, TypeRegistry, Value, shared};
use std::hint::black_box;

#[derive(Default, Graph)]
#[graph(name = "bench.Item")]
struct BenchItem {
    id: i64,
    name: String,
    payload: Vec<i64>,
    next: Option<Shared<BenchItem>>,
}

/// A linked chain of items; every tenth item points back to the head.
fn generate_chain(count: usize) -> Vec<Shared<BenchItem>> {
    let items: Vec<_> = (0..count)
        .map(|i| {
            shared(BenchItem {
                id: i as i64,
                name: format!("item-{i}"),
                payload: vec![i as i64; 16],
                next: None,
            })
        })
        .collect();
    for (i, pair) in items.windows(2).enumerate() {
        let target = if i % 10 == 9 { &items[0] } else { &pair[1] };
        pair[0].borrow_mut().next = Some(target.clone());
    }
    items
}

fn codec() -> GraphCodec {
    let mut registry = TypeRegistry::new();
    // Registration of a derived type cannot fail outside of duplicate wire names.
    let _ = registry.register::<BenchItem>();
    GraphCodec::new(registry)
}

// --- BENCHMARKS ---

fn bench_graphs(c: &mut Criterion) {
    let codec = codec();
    let items = generate_chain(10_000);
    let roots: Vec<Value> = items.iter().map(Value::object).collect();

    let encode = || -> Vec<u8> {
        let mut writer = codec.writer(Vec::new()).expect("writer");
        for root in &roots {
            writer.write_value(root).expect("write");
        }
        writer.into_inner().expect("flush")
    };
    let bytes = encode();

    let mut group = c.benchmark_group("object_graph");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("write", |b| b.iter(|| black_box(encode())));
    group.bench_function("read", |b| {
        b.iter(|| {
            let mut reader = codec.reader(bytes.as_slice()).expect("reader");
            while let Some(value) = reader.try_read_value().expect("read") {
                black_box(value);
            }
        })
    });
    group.finish();

    for item in &items {
        item.borrow_mut().next = None;
    }
}

fn bench_primitive_arrays(c: &mut Criterion) {
    let codec = codec();
    let value = Value::array(ArrayData::F64((0..1_000_000).map(|i| i as f64).collect()));
    let bytes = codec.to_bytes(&value).expect("encode");

    let mut group = c.benchmark_group("primitive_array");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("write_f64", |b| {
        b.iter(|| black_box(codec.to_bytes(&value).expect("encode")))
    });
    group.bench_function("read_f64", |b| {
        b.iter(|| black_box(codec.from_bytes(&bytes).expect("decode")))
    });
    group.finish();
}

criterion_group!(benches, bench_graphs, bench_primitive_arrays);
criterion_main!(benches);
