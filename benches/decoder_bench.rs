//! Performance benchmarks for CardDecoder.
//!
//! Decoding runs once per tag on the blocking pool. The MIFARE Classic case
//! is the expensive one: it walks the well-known key list until a key
//! authenticates, so the position of the accepted key dominates.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench decoder_bench
//!
//! # Only the Classic key search
//! cargo bench --bench decoder_bench -- classic
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tagrelay_reader::mock::MockTagMemory;
use tagrelay_reader::{CardDecoder, FelicaMode, KeyKind, RawTag, Technology, WELL_KNOWN_KEYS};

const IDM: [u8; 8] = [0x01, 0x27, 0x00, 0x12, 0x34, 0x56, 0x78, 0x9A];

fn bench_type_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("type_a");
    group.throughput(Throughput::Elements(1));

    let decoder = CardDecoder::default();
    let tag = RawTag::new(vec![0x04, 0xAB, 0xCD, 0xEF, 0x12, 0x34, 0x56], vec![Technology::TypeA]);

    group.bench_function("decode_seven_byte_uid", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&tag)).unwrap()));
    });

    group.finish();
}

fn bench_felica(c: &mut Criterion) {
    let mut group = c.benchmark_group("felica");
    group.throughput(Throughput::Elements(1));

    let tag = RawTag::new(IDM.to_vec(), vec![Technology::FeliCa]);

    for mode in [FelicaMode::Compatibility, FelicaMode::Idm] {
        let decoder = CardDecoder::new(mode);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{mode:?}")),
            &tag,
            |b, tag| {
                b.iter(|| black_box(decoder.decode(black_box(tag)).unwrap()));
            },
        );
    }

    group.finish();
}

/// Benchmark the key search with the accepted key at different positions.
fn bench_classic_key_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("classic");
    group.throughput(Throughput::Elements(1));

    let decoder = CardDecoder::default();
    let block: Vec<u8> = (0..16).collect();

    for position in [0, WELL_KNOWN_KEYS.len() / 2, WELL_KNOWN_KEYS.len() - 1] {
        let memory = MockTagMemory::new()
            .with_key(WELL_KNOWN_KEYS[position], KeyKind::B)
            .with_block(2, block.clone());
        let tag = RawTag::new(
            vec![0x12, 0x34, 0x56, 0x78],
            vec![Technology::TypeA, Technology::MifareClassic],
        )
        .with_memory(Arc::new(memory));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("key_{position}")),
            &tag,
            |b, tag| {
                b.iter(|| black_box(decoder.decode(black_box(tag)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_unsupported(c: &mut Criterion) {
    let mut group = c.benchmark_group("unsupported");
    group.throughput(Throughput::Elements(1));

    let decoder = CardDecoder::default();
    let tag = RawTag::new(vec![0xE0, 0x04, 0x01, 0x50], vec![Technology::TypeV, Technology::Ndef]);

    group.bench_function("reject_unsupported_tag", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&tag)).is_err()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_type_a,
    bench_felica,
    bench_classic_key_search,
    bench_unsupported,
);

criterion_main!(benches);
