use core::hint::black_box;
use core::time::Duration;
use chunkline_core::{
    Dispatcher, EncodedChunk, FrameWriter, LoadedResource, Loader, MemoryStore, ResourceId,
    Strategy, sniff,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

// A small PNG-looking payload, about the size of a thumbnail.
fn thumbnail() -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR".to_vec();
    data.resize(8 * 1024, 0x5a);
    data
}

fn store(items: usize, latency: Duration) -> (MemoryStore, Vec<ResourceId>) {
    let data = thumbnail();
    let mut store = MemoryStore::new();
    let mut ids = Vec::with_capacity(items);
    for i in 0..items {
        let id = format!("/images/timg{i}.png");
        store = store.with_latency(id.clone(), data.clone(), latency);
        ids.push(ResourceId::new(id));
    }
    (store, ids)
}

/// Sequential vs concurrent dispatch with per-item latency, framed into an
/// in-memory body.
fn bench_dispatch(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    for (items, latency_ms) in [(10, 0), (10, 2), (50, 2)] {
        let mut group = c.benchmark_group(format!("dispatch/latency_{latency_ms}ms"));
        group.throughput(Throughput::Elements(items as u64));
        group.sample_size(20);

        let (store, ids) = store(items, Duration::from_millis(latency_ms));
        let dispatcher = Dispatcher::new(Loader::new(store));

        for strategy in [Strategy::Sequential, Strategy::Concurrent] {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), items),
                &ids,
                |b, ids| {
                    b.to_async(&rt).iter(|| {
                        let dispatcher = dispatcher.clone();
                        let ids = ids.clone();
                        async move {
                            let stream =
                                dispatcher.dispatch(ids, strategy, CancellationToken::new());
                            let mut body = Vec::with_capacity(items * 12 * 1024);
                            let stats = FrameWriter::new(&mut body)
                                .write_stream(stream)
                                .await
                                .unwrap();
                            black_box((stats, body.len()))
                        }
                    });
                },
            );
        }
        group.finish();
    }
}

fn bench_encode(c: &mut Criterion) {
    let data = thumbnail();
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("sniff", |b| b.iter(|| black_box(sniff::sniff(&data))));

    group.bench_function("record", |b| {
        b.iter(|| {
            use base64::Engine;
            let resource = LoadedResource {
                size_bytes: data.len() as u64,
                encoded_body: base64::engine::general_purpose::STANDARD.encode(&data),
                content_type: sniff::sniff(&data),
            };
            black_box(EncodedChunk::new(0, resource).to_wire())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_encode);
criterion_main!(benches);
