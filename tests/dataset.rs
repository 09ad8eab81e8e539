use std::{
    error::Error,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chunkhub::{
    array::{DataType, Selector, Tensor},
    dataset::{CountingObserver, Dataset, DatasetOptions, FieldSpec, Sample, SampleSource},
    byte_range::ByteRange,
    storage::{
        storage_adapter::{PerformanceMetricsStorageAdapter, RetryPolicy, RetryStorageAdapter},
        store::{FilesystemStore, MemoryStore},
        Bytes, ReadableStorageTraits, StorageError, StoreKey, StorePrefix, WritableStorageTraits,
    },
};
use rayon::prelude::*;

fn pixel(sample: u64, index: u64) -> u8 {
    ((sample * 31 + index) % 251) as u8
}

fn image(sample: u64) -> Vec<u8> {
    (0..28 * 28).map(|index| pixel(sample, index)).collect()
}

#[cfg(feature = "gzip")]
#[test]
fn dataset_slice_resolves_to_one_chunk() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let observer = Arc::new(CountingObserver::new());
    let mut dataset = Dataset::create_opt(
        store.clone(),
        "mnist",
        &[FieldSpec::tensor("image", DataType::UInt8, vec![28, 28], 100).gzip_level(1)],
        DatasetOptions::new().with_observer(observer.clone()),
    )?;
    dataset.extend((0..10_000).map(|i| Sample::new().with_bytes("image", vec![28, 28], image(i))))?;
    assert_eq!(dataset.len(), 10_000);
    store.reset();

    let view = dataset.field("image")?.slice(&[Selector::range(250, 260)])?;
    assert_eq!(view.shape(), vec![10, 28, 28]);
    assert_eq!(
        view.chunk_keys()?,
        vec![StoreKey::new("mnist/image/c/2/0/0")?]
    );
    let tensor = view.compute()?;
    assert_eq!(tensor.shape(), &[10, 28, 28]);
    let expected = (250..260).flat_map(image).collect::<Vec<_>>();
    assert_eq!(tensor.to_elements::<u8>()?, expected);
    assert_eq!(store.reads(), 1);
    assert_eq!(observer.chunks_fetched(), 1);

    // decoded once, then served from the cache
    view.compute()?;
    assert_eq!(store.reads(), 1);
    assert_eq!(observer.cache_hits(), 1);
    Ok(())
}

#[cfg(feature = "gzip")]
#[test]
fn dataset_concurrent_compute_fetches_once() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let mut dataset = Dataset::create(
        store.clone(),
        "d",
        &[FieldSpec::tensor("x", DataType::UInt64, vec![64], 32).gzip()],
    )?;
    dataset.extend((0..32u64).map(|i| {
        let elements = (0..64).map(|j| i * 64 + j).collect::<Vec<_>>();
        Sample::new().with_elements("x", vec![64], &elements)
    }))?;
    store.reset();

    let view = dataset.field("x")?;
    let results = (0..32i64)
        .into_par_iter()
        .map(|i| -> Result<Tensor, Box<dyn Error + Send + Sync>> {
            Ok(view.get(i)?.compute()?)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.to_string())?;
    assert_eq!(store.reads(), 1);
    for (i, tensor) in results.iter().enumerate() {
        let first = tensor.to_elements::<u64>()?[0];
        assert_eq!(first, i as u64 * 64);
    }
    Ok(())
}

#[test]
fn dataset_append_read_back() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut fields = vec![
        FieldSpec::tensor("boxes", DataType::Float64, vec![2, 4], 4),
        FieldSpec::tensor("flags", DataType::Bool, vec![3], 8),
        FieldSpec::text("caption", 2),
    ];
    #[cfg(feature = "image")]
    fields.push(FieldSpec::image("image", vec![28, 28], 3).png());
    #[cfg(feature = "crc32c")]
    fields.push(FieldSpec::tensor("id", DataType::Int32, vec![], 16).crc32c());
    let mut dataset = Dataset::create(store.clone(), "data/train", &fields)?;

    let sample = |i: u64| {
        let x = i as f64;
        let sample = Sample::new()
            .with_elements("boxes", vec![2, 4], &[x, x + 0.5, -x, 1e-9, x * x, 0.0, 1.0, f64::MAX])
            .with_elements("flags", vec![3], &[i % 2 == 0, true, false])
            .with_text("caption", &format!("caption {i} ✓"));
        #[cfg(feature = "image")]
        let sample = sample.with_bytes("image", vec![28, 28], image(i));
        #[cfg(feature = "crc32c")]
        let sample = sample.with_elements("id", vec![], &[-(i as i32)]);
        sample
    };

    for i in 0..7 {
        dataset.append(sample(i))?;
        assert_eq!(dataset.len(), i + 1);
    }

    let dataset = Dataset::open(store, "data/train")?;
    assert_eq!(dataset.len(), 7);
    for i in 0..7 {
        let read = dataset.sample(i)?;
        let expected = sample(i);
        let boxes = read["boxes"].to_elements::<f64>()?;
        assert_eq!(boxes[1].to_bits(), (i as f64 + 0.5).to_bits());
        assert_eq!(boxes[7], f64::MAX);
        assert_eq!(read["flags"].to_elements::<bool>()?, vec![i % 2 == 0, true, false]);
        assert_eq!(read["caption"].to_strings()?, vec![format!("caption {i} ✓")]);
        #[cfg(feature = "image")]
        assert_eq!(read["image"].to_elements::<u8>()?, image(i));
        #[cfg(feature = "crc32c")]
        assert_eq!(read["id"].to_elements::<i32>()?, vec![-(i as i32)]);
        assert_eq!(read.len(), expected.len());
    }

    let captions = dataset.field("caption")?.slice(&[Selector::range_step(1, 7, 3)])?;
    assert_eq!(captions.compute()?.to_strings()?, vec!["caption 1 ✓", "caption 4 ✓"]);
    Ok(())
}

#[cfg(feature = "image")]
#[test]
fn dataset_jpeg_is_approximate() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut dataset = Dataset::create(
        store,
        "d",
        &[FieldSpec::image("image", vec![16, 16, 3], 4).jpeg_quality(95)],
    )?;
    let pixels = (0..16 * 16 * 3u32).map(|i| (100 + i % 7) as u8).collect::<Vec<_>>();
    dataset.append(Sample::new().with_bytes("image", vec![16, 16, 3], pixels.clone()))?;
    let decoded = dataset.field("image")?.compute()?;
    assert_eq!(decoded.shape(), &[1, 16, 16, 3]);
    let decoded = decoded.to_elements::<u8>()?;
    assert!(std::iter::zip(&pixels, &decoded).all(|(a, b)| a.abs_diff(*b) <= 8));
    Ok(())
}

#[cfg(feature = "image")]
#[test]
fn dataset_png_concurrent_compute_in_small_pool() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let mut dataset = Dataset::create(
        store.clone(),
        "d",
        &[FieldSpec::image("image", vec![28, 28], 16).png()],
    )?;
    dataset.extend((0..64).map(|i| Sample::new().with_bytes("image", vec![28, 28], image(i))))?;
    store.reset();

    // fewer workers than concurrent callers, so callers wait on fetches owned by other workers
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build()?;
    let view = dataset.field("image")?;
    let results = pool
        .install(|| {
            (0..64i64)
                .into_par_iter()
                .map(|i| -> Result<Tensor, Box<dyn Error + Send + Sync>> {
                    Ok(view.get(i)?.compute()?)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|err| err.to_string())?;
    assert_eq!(store.reads(), 4);
    for (i, tensor) in results.iter().enumerate() {
        assert_eq!(tensor.to_elements::<u8>()?, image(i as u64));
    }
    Ok(())
}

#[test]
fn dataset_schema_mismatch_writes_nothing() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut dataset = Dataset::create(
        store.clone(),
        "d",
        &[
            FieldSpec::tensor("x", DataType::Int16, vec![2], 4),
            FieldSpec::text("y", 4),
        ],
    )?;
    dataset.append(
        Sample::new()
            .with_elements("x", vec![2], &[1i16, 2])
            .with_text("y", "a"),
    )?;
    let keys = store.keys();
    let metadata = store.get(&StoreKey::new("d/dataset.json")?)?;

    let invalid = Sample::new()
        .with_elements("x", vec![2], &[1i16, 2])
        .with_elements("y", vec![], &[1i16]);
    let err = dataset.append(invalid).unwrap_err();
    assert!(err.to_string().contains("field y"), "{err}");

    assert_eq!(store.keys(), keys);
    assert_eq!(store.get(&StoreKey::new("d/dataset.json")?)?, metadata);
    assert_eq!(dataset.len(), 1);
    Ok(())
}

#[test]
fn dataset_filesystem() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    {
        let store = Arc::new(FilesystemStore::new(path.path())?);
        let mut dataset = Dataset::create(
            store,
            "mnist",
            &[FieldSpec::tensor("label", DataType::UInt8, vec![], 4)],
        )?;
        dataset.extend((0..10u8).map(|i| Sample::new().with_elements("label", vec![], &[i])))?;
    }
    assert!(path.path().join("mnist/dataset.json").is_file());
    assert!(path.path().join("mnist/label/c/2").is_file());

    let store = Arc::new(FilesystemStore::new(path.path())?);
    let mut dataset = Dataset::open(store.clone(), "mnist")?;
    dataset.append(Sample::new().with_elements("label", vec![], &[10u8]))?;
    let labels = Dataset::open(store, "mnist")?.field("label")?.compute()?;
    assert_eq!(labels.to_elements::<u8>()?, (0..11).collect::<Vec<_>>());

    dataset.delete()?;
    assert!(!path.path().join("mnist/dataset.json").exists());
    Ok(())
}

#[test]
fn dataset_iter_samples_restartable() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut dataset = Dataset::create(
        store,
        "d",
        &[FieldSpec::tensor("x", DataType::UInt32, vec![], 3)],
    )?;
    dataset.extend((0..10u32).map(|i| Sample::new().with_elements("x", vec![], &[i * i])))?;
    for _ in 0..2 {
        let values = dataset
            .iter_samples()
            .with_prefetch(4)
            .map(|sample| -> Result<u32, Box<dyn Error>> {
                Ok(sample?["x"].to_elements::<u32>()?[0])
            })
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(values, (0..10u32).map(|i| i * i).collect::<Vec<_>>());
    }
    Ok(())
}

/// Fails the next `failures` reads with a transient error.
#[derive(Debug)]
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn fail_next(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match remaining {
            Ok(_) => Err(StorageError::Transient("throttled".to_string())),
            Err(_) => Ok(()),
        }
    }
}

impl ReadableStorageTraits for FlakyStore {
    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        self.check()?;
        self.inner.get_partial_values_key(key, byte_ranges)
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.check()?;
        self.inner.size_key(key)
    }
}

impl WritableStorageTraits for FlakyStore {
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.inner.write(key, value)
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.inner.delete(key)
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.inner.delete_prefix(prefix)
    }
}

#[test]
fn dataset_retry_transient_failures() -> Result<(), Box<dyn Error>> {
    let flaky = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(0),
    });
    let store = Arc::new(RetryStorageAdapter::new_with_policy(
        flaky.clone(),
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4)),
    ));
    let mut dataset = Dataset::create(
        store.clone(),
        "d",
        &[FieldSpec::tensor("x", DataType::Float32, vec![2], 8)],
    )?;
    dataset.extend((0..4).map(|i| Sample::new().with_elements("x", vec![2], &[i as f32, 0.5])))?;

    let view = Dataset::open(store.clone(), "d")?.field("x")?;
    flaky.fail_next(100);
    let err = view.compute().unwrap_err();
    assert!(err.is_storage_unavailable(), "{err}");

    flaky.fail_next(0);
    let dataset = Dataset::open(store, "d")?;
    flaky.fail_next(2);
    let values = dataset.field("x")?.compute()?.to_elements::<f32>()?;
    assert_eq!(values, vec![0.0, 0.5, 1.0, 0.5, 2.0, 0.5, 3.0, 0.5]);
    Ok(())
}
