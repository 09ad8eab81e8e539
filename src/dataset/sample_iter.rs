use std::{collections::BTreeMap, ops::Range, sync::Arc};

use crate::array::{ArrayError, Tensor};

/// The tensors of one sample, keyed by field name.
pub type SampleTensors = BTreeMap<String, Tensor>;

/// A source of samples with random access.
///
/// This is the contract consumed by data loaders: a length, per-sample random access and restartable iteration.
pub trait SampleSource: Send + Sync {
    /// The number of samples.
    fn len(&self) -> u64;

    /// Returns true if there are no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialise sample `index`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `index` is out of bounds or the sample cannot be retrieved.
    fn sample(&self, index: u64) -> Result<SampleTensors, ArrayError>;

    /// Warm any caches for the samples in `indices`.
    ///
    /// The default implementation does nothing.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the samples cannot be retrieved.
    fn prefetch(&self, _indices: Range<u64>) -> Result<(), ArrayError> {
        Ok(())
    }

    /// Iterate over every sample in order.
    ///
    /// The iterator holds its own handle to the source, so it can be recreated at any time.
    #[must_use]
    fn iter_samples(&self) -> SampleIter<Self>
    where
        Self: Sized + Clone + 'static,
    {
        SampleIter::new(Arc::new(self.clone()))
    }
}

/// An iterator over the samples of a [`SampleSource`].
///
/// With [`with_prefetch`](SampleIter::with_prefetch), the samples ahead of the iterator are prefetched on the rayon
/// pool so that fetching and decoding overlap consumption.
/// Prefetch failures are ignored, the error surfaces when the sample is reached.
pub struct SampleIter<TSource: ?Sized> {
    source: Arc<TSource>,
    indices: Range<u64>,
    prefetch: u64,
    prefetched: u64,
}

impl<TSource: ?Sized + SampleSource + 'static> SampleIter<TSource> {
    /// Create an iterator over every sample of `source` without prefetching.
    #[must_use]
    pub fn new(source: Arc<TSource>) -> Self {
        let indices = 0..source.len();
        Self {
            source,
            indices,
            prefetch: 0,
            prefetched: 0,
        }
    }

    /// Prefetch up to `prefetch` samples ahead of the iterator.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: u64) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Restrict the iterator to the samples in `indices`, clamped to the length of the source.
    #[must_use]
    pub fn with_range(mut self, indices: Range<u64>) -> Self {
        let len = self.source.len();
        self.indices = indices.start.min(len)..indices.end.min(len);
        self.prefetched = self.indices.start;
        self
    }

    fn schedule_prefetch(&mut self) {
        if self.prefetch == 0 {
            return;
        }
        let start = self.prefetched.max(self.indices.start);
        let end = self
            .indices
            .start
            .saturating_add(self.prefetch)
            .min(self.indices.end);
        // prefetch in batches of at least half the window, unless the end is reached
        if start >= end || (end - start < (self.prefetch / 2).max(1) && end != self.indices.end) {
            return;
        }
        self.prefetched = end;
        let source = self.source.clone();
        rayon::spawn(move || {
            if let Err(err) = source.prefetch(start..end) {
                tracing::debug!(start, end, "sample prefetch failed: {err}");
            }
        });
    }
}

impl<TSource: ?Sized + SampleSource + 'static> Iterator for SampleIter<TSource> {
    type Item = Result<SampleTensors, ArrayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.schedule_prefetch();
        let index = self.indices.next()?;
        Some(self.source.sample(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::{Duration, Instant},
    };

    use crate::array::{ArrayBytes, DataType};

    use super::*;

    #[derive(Default)]
    struct Counter {
        len: u64,
        prefetched: Mutex<Vec<Range<u64>>>,
    }

    impl SampleSource for Counter {
        fn len(&self) -> u64 {
            self.len
        }

        fn sample(&self, index: u64) -> Result<SampleTensors, ArrayError> {
            if index >= self.len {
                return Err(ArrayError::FieldNotFound(index.to_string()));
            }
            let tensor = Tensor::new(
                vec![],
                DataType::UInt64,
                ArrayBytes::new_flen(index.to_ne_bytes().to_vec()),
            )?;
            Ok(BTreeMap::from([("index".to_string(), tensor)]))
        }

        fn prefetch(&self, indices: Range<u64>) -> Result<(), ArrayError> {
            self.prefetched.lock().unwrap().push(indices);
            Ok(())
        }
    }

    fn index(sample: &SampleTensors) -> u64 {
        sample["index"].to_elements::<u64>().unwrap()[0]
    }

    #[test]
    fn sample_iter_in_order() {
        let source = Arc::new(Counter {
            len: 10,
            ..Default::default()
        });
        let indices = SampleIter::new(source.clone())
            .map(|sample| index(&sample.unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
        assert!(source.prefetched.lock().unwrap().is_empty());

        let indices = SampleIter::new(source)
            .with_range(7..20)
            .map(|sample| index(&sample.unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![7, 8, 9]);
    }

    #[test]
    fn sample_iter_prefetch_covers_every_sample() {
        let source = Arc::new(Counter {
            len: 10,
            ..Default::default()
        });
        let count = SampleIter::new(source.clone()).with_prefetch(4).count();
        assert_eq!(count, 10);
        // prefetches run on the rayon pool, wait for them to land
        let deadline = Instant::now() + Duration::from_secs(10);
        let prefetched = loop {
            let mut prefetched = source
                .prefetched
                .lock()
                .unwrap()
                .iter()
                .flat_map(Clone::clone)
                .collect::<Vec<_>>();
            prefetched.sort_unstable();
            if prefetched.len() == 10 || Instant::now() > deadline {
                break prefetched;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(prefetched, (0..10).collect::<Vec<_>>());
    }
}
