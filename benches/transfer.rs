//! Performance benchmarks for file transfer operations

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use fios_core::{MAX_PAYLOAD_SIZE, SessionBuilder};
use fios_files::{DEFAULT_CHUNK_SIZE, FileChunker, FileSink};
use fios_integration_tests::fixtures::{LoopbackFixture, drive};
use fios_transport::PipeConfig;

const MAX_ROUNDS: usize = 10_000_000;

/// Benchmark sequential chunk reads
fn bench_file_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_chunking");

    for size in [
        1_000_000,  // 1 MB
        10_000_000, // 10 MB
    ] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let fixture = LoopbackFixture::new(vec![0xAA; size]).unwrap();
            let mut chunk = Vec::with_capacity(DEFAULT_CHUNK_SIZE);

            b.iter(|| {
                let mut chunker =
                    FileChunker::open(fixture.source(), DEFAULT_CHUNK_SIZE, u64::MAX).unwrap();
                let mut total = 0;
                loop {
                    let n = chunker.read_chunk(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    total += black_box(n);
                }
                total
            });
        });
    }

    group.finish();
}

/// Benchmark appending chunks to a sink
fn bench_file_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sink");
    let size = 4_000_000usize;
    let chunk = vec![0xBB; DEFAULT_CHUNK_SIZE];
    group.throughput(Throughput::Bytes(size as u64));

    group.bench_function("write_4mb", |b| {
        let fixture = LoopbackFixture::new(Vec::new()).unwrap();
        b.iter(|| {
            let mut sink = FileSink::create(fixture.destination()).unwrap();
            for _ in 0..size / DEFAULT_CHUNK_SIZE {
                sink.write_chunk(&chunk).unwrap();
            }
            black_box(sink.written())
        });
    });

    group.finish();
}

/// Benchmark complete sender/receiver transfers over an in-memory pipe
fn bench_transfer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_throughput");
    group.sample_size(20);

    for size in [
        64 * 1024,   // 64 KB
        1024 * 1024, // 1 MB
        8 * 1024 * 1024, // 8 MB
    ] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let fixture = LoopbackFixture::with_size(size).unwrap();

            b.iter(|| {
                let (mut sender, mut receiver) = fixture.sessions(PipeConfig::default()).unwrap();
                let rounds = drive(&mut sender, &mut receiver, MAX_ROUNDS).unwrap();
                black_box(rounds)
            });
        });
    }

    group.finish();
}

/// Benchmark the effect of chunk size on a 1 MB transfer
fn bench_chunk_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_chunk_size");
    group.sample_size(20);

    let size = 1024 * 1024;
    let fixture = LoopbackFixture::with_size(size).unwrap();
    group.throughput(Throughput::Bytes(size as u64));

    for chunk_size in [512, 2048, MAX_PAYLOAD_SIZE] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let (mut sender, mut receiver) = fixture
                        .sessions_with(
                            SessionBuilder::new().chunk_size(chunk_size),
                            SessionBuilder::new(),
                            PipeConfig::default(),
                        )
                        .unwrap();
                    black_box(drive(&mut sender, &mut receiver, MAX_ROUNDS).unwrap())
                });
            },
        );
    }

    group.finish();
}

/// Benchmark a transfer over a pipe that moves 64 bytes per call, close to
/// what a UART driver hands back per read
fn bench_fragmented_link(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_fragmented");
    group.sample_size(10);

    let size = 256 * 1024;
    let fixture = LoopbackFixture::with_size(size).unwrap();
    group.throughput(Throughput::Bytes(size as u64));

    group.bench_function("fragment_64", |b| {
        b.iter(|| {
            let (mut sender, mut receiver) =
                fixture.sessions(PipeConfig::fragmented(64)).unwrap();
            black_box(drive(&mut sender, &mut receiver, MAX_ROUNDS).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_file_chunking,
    bench_file_sink,
    bench_transfer_throughput,
    bench_chunk_sizes,
    bench_fragmented_link,
);
criterion_main!(benches);
