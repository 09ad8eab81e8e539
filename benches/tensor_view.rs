use std::sync::Arc;

use chunkhub::{
    array::{DataType, Selector, TensorView},
    dataset::{Dataset, FieldSpec, Sample},
    storage::store::MemoryStore,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SAMPLE_SHAPE: [u64; 2] = [28, 28];
const SAMPLE_SIZE: u64 = SAMPLE_SHAPE[0] * SAMPLE_SHAPE[1];

fn sample(i: u64) -> Sample {
    let pixels = (0..SAMPLE_SIZE).map(|j| ((i + j) % 256) as u8).collect();
    Sample::new().with_bytes("image", SAMPLE_SHAPE.to_vec(), pixels)
}

fn field_spec(codec: &str) -> FieldSpec {
    let spec = FieldSpec::tensor("image", DataType::UInt8, SAMPLE_SHAPE.to_vec(), 256);
    match codec {
        "gzip" => spec.gzip_level(1),
        "zstd" => spec.zstd(),
        _ => spec,
    }
}

fn dataset(codec: &str, num_samples: u64) -> Dataset<MemoryStore> {
    let mut dataset =
        Dataset::create(Arc::new(MemoryStore::new()), "bench", &[field_spec(codec)]).unwrap();
    dataset.extend((0..num_samples).map(sample)).unwrap();
    dataset
}

fn dataset_extend(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_extend");
    let num_samples = 4096u64;
    group.throughput(Throughput::Bytes(num_samples * SAMPLE_SIZE));
    for codec in ["bytes", "gzip", "zstd"] {
        group.bench_with_input(BenchmarkId::from_parameter(codec), codec, |b, codec| {
            b.iter(|| dataset(codec, num_samples));
        });
    }
    group.finish();
}

fn tensor_view_compute_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("tensor_view_compute_all");
    let num_samples = 4096u64;
    group.throughput(Throughput::Bytes(num_samples * SAMPLE_SIZE));
    for codec in ["bytes", "gzip", "zstd"] {
        let dataset = dataset(codec, num_samples);
        // Bypass the cache so every iteration decodes
        let view = TensorView::new_uncached(dataset.storage(), dataset.fields()[0].clone());
        group.bench_function(BenchmarkId::from_parameter(codec), |b| {
            b.iter(|| view.compute().unwrap());
        });
    }
    group.finish();
}

fn tensor_view_compute_strided(c: &mut Criterion) {
    let mut group = c.benchmark_group("tensor_view_compute_strided");
    let num_samples = 4096u64;
    for step in [1i64, 7, 64] {
        let dataset = dataset("bytes", num_samples);
        let view = TensorView::new_uncached(dataset.storage(), dataset.fields()[0].clone())
            .slice(&[
                Selector::range_step(0, 4096, step),
                Selector::range(4, 24),
                Selector::range(4, 24),
            ])
            .unwrap();
        group.throughput(Throughput::Bytes(view.num_elements()));
        group.bench_function(BenchmarkId::from_parameter(step), |b| {
            b.iter(|| view.compute().unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    dataset_extend,
    tensor_view_compute_all,
    tensor_view_compute_strided
);
criterion_main!(benches);
