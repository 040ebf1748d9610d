use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mjpeg_stream::locate::find;
use mjpeg_stream::{Boundary, FrameExtractor, StopSignal, StreamConfig};
use rand::prelude::*;

// Modify time limit here
const BENCHMARK_TIME_LIMIT: std::time::Duration =
    std::time::Duration::from_secs(10);

const BOUNDARY: &str = "--myboundary";

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

fn multipart_body(frames: usize, frame_size: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for _ in 0..frames {
        body.extend_from_slice(
            format!(
                "{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\
                 Content-Length: {frame_size}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&[0xFF, 0xD8]);
        body.extend_from_slice(&generate_random_data(frame_size - 2));
    }
    body.extend_from_slice(BOUNDARY.as_bytes());
    body
}

/// Benchmarks the boundary search over random data of various sizes.
fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_boundary");
    group.measurement_time(BENCHMARK_TIME_LIMIT);

    let inputs = [("small", 1024), ("medium", 65536), ("large", 1048576)];
    for (name, size) in inputs.iter() {
        let haystack = generate_random_data(*size);
        group.bench_function(format!("find:{}", name), move |b| {
            b.iter(|| find(black_box(&haystack), BOUNDARY.as_bytes()));
        });
    }

    group.finish();
}

/// Benchmarks frame extraction from an in-memory body with different chunk
/// sizes.
fn bench_extract(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("extract_frames");
    group.measurement_time(BENCHMARK_TIME_LIMIT);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let body = multipart_body(20, 64 * 1024);

    for chunk_size in [1024, 4096, 16384] {
        let config = StreamConfig::default().with_chunk_size(chunk_size);
        let body = &body;
        let runtime = &runtime;
        group.bench_function(format!("chunk:{}", chunk_size), move |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let boundary = Boundary::new(BOUNDARY).unwrap();
                    let mut extractor = FrameExtractor::new(
                        body.as_slice(),
                        boundary,
                        &config,
                        StopSignal::new(),
                    );
                    let mut frames = 0;
                    while let Ok(Some(frame)) = extractor.next_frame().await {
                        black_box(frame);
                        frames += 1;
                    }
                    frames
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_locate, bench_extract);
criterion_main!(benches);
