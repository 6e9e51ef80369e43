//! Chunk views over a shared batch

use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

use contracts::ServiceError;

/// Contiguous slice of a shared batch
///
/// Holds the batch by `Arc`, so handing a chunk to a task or a report
/// channel never copies items.
#[derive(Clone)]
pub struct Chunk<T> {
    batch: Arc<[T]>,
    range: Range<usize>,
}

impl<T> Chunk<T> {
    /// # Panics
    /// If `range` is out of bounds for `batch`
    pub fn new(batch: Arc<[T]>, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= batch.len(),
            "chunk range {range:?} out of bounds for batch of {}",
            batch.len()
        );
        Self { batch, range }
    }

    /// Offset of the first item within the batch
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Position of this chunk within the batch
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.batch[self.range.clone()]
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.as_slice().to_vec()
    }
}

impl<T> Deref for Chunk<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for Chunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("range", &self.range)
            .field("items", &self.as_slice())
            .finish()
    }
}

/// A failed chunk paired with the error that rejected it
#[derive(Debug, Clone)]
pub struct UnsentChunk<T> {
    pub error: ServiceError,
    pub chunk: Chunk<T>,
}
