//! Codec and boundary benchmarks.
//!
//! These benchmarks measure UTF-16 to UTF-8 encoding throughput and the cost
//! of a full string round trip through the import table.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use hostref::guest::Guest;
use hostref::utf8::{self, SurrogatePolicy};
use std::hint::black_box;

/// Build a UTF-16 sample of `len` units mixing 1, 2, 3 and 4 byte code points
fn sample_units(len: usize) -> Vec<u16> {
    "aé€😀".encode_utf16().cycle().take(len).collect()
}

/// Verify encoder output before benchmarking
fn verify_codec() {
    let text = "aé€😀".repeat(16);
    let units: Vec<u16> = text.encode_utf16().collect();
    assert_eq!(utf8::encode_utf8(&units), text.as_bytes(), "lenient encoding should match std");
    assert_eq!(
        utf8::encoded_len(&units, SurrogatePolicy::Strict).unwrap(),
        text.len(),
        "encoded_len should match std"
    );
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for len in [16, 256, 4096, 65536] {
        let units = sample_units(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("lenient", len), &units, |b, units| {
            b.iter(|| black_box(utf8::encode_utf8(units)));
        });
        group.bench_with_input(BenchmarkId::new("strict", len), &units, |b, units| {
            b.iter(|| black_box(utf8::encode_utf8_with(units, SurrogatePolicy::Strict).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("encoded_len", len), &units, |b, units| {
            b.iter(|| black_box(utf8::encoded_len(units, SurrogatePolicy::Lenient).unwrap()));
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    for len in [16, 1024, 16384] {
        let text = "aé€😀".repeat(len / 4);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("string", len), &text, |b, text| {
            let guest = Guest::new().unwrap();
            let mut out = String::new();
            b.iter(|| {
                let s = guest.string(text).unwrap();
                s.to_string(&mut out).unwrap();
                black_box(out.len())
            });
        });
    }
    group.finish();
}

// Run verification before benchmarks
fn verify_and_bench(c: &mut Criterion) {
    verify_codec();
    bench_encode(c);
    bench_round_trip(c);
}

criterion_group!(benches, verify_and_bench);
criterion_main!(benches);
