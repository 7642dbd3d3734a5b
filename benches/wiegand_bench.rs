//! Performance benchmarks for Wiegand decoding.
//!
//! Edge handling runs in interrupt context, so a full frame must decode well
//! within the inter-bit gap of a reader (typically 1-2 ms). These benchmarks
//! track the per-edge cost of the decoder and the cost of frame validation.
//!
//! # Run Benchmarks
//!
//! ```sh
//! # Run all decoder benchmarks
//! cargo bench --bench wiegand_bench
//!
//! # Run specific benchmark group
//! cargo bench --bench wiegand_bench -- frame_validation
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gatehouse_core::{CardCode, ParityScheme};
use gatehouse_hardware::wiegand::{WiegandDecoder, encode_frame, extract_card_code};
use std::hint::black_box;
use std::time::Duration;

/// Benchmark feeding a whole frame edge by edge.
fn bench_decode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");

    for bits in [26u8, 34] {
        let frame = encode_frame(CardCode::new(0x00AB_CDEF), bits).unwrap();
        let lines: Vec<_> = frame.lines().collect();
        group.throughput(Throughput::Elements(u64::from(bits)));

        group.bench_with_input(BenchmarkId::from_parameter(bits), &lines, |b, lines| {
            let mut decoder = WiegandDecoder::new(bits, Duration::from_millis(25));
            let mut tick = 0u32;
            b.iter(|| {
                let mut emitted = None;
                for line in lines {
                    tick = tick.wrapping_add(2_000);
                    decoder.on_edge(*line, tick, |f| emitted = Some(f));
                }
                black_box(emitted)
            });
        });
    }

    group.finish();
}

/// Benchmark parity validation of complete frames.
fn bench_frame_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_validation");
    group.throughput(Throughput::Elements(1));

    let valid = encode_frame(CardCode::new(0x12_3456), 26).unwrap();
    let scenarios = [
        ("valid_26", 26u8, valid.value, ParityScheme::Standard),
        ("bad_parity_26", 26, valid.value ^ 1, ParityScheme::Standard),
        ("passthrough_34", 34, 0x3_FFFF_FFFF, ParityScheme::None),
        ("unsupported", 37, 0, ParityScheme::None),
    ];

    for (name, bits, value, scheme) in scenarios {
        group.bench_function(name, |b| {
            b.iter(|| extract_card_code(black_box(bits), black_box(value), scheme).ok());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode_frame, bench_frame_validation);
criterion_main!(benches);
