//! Rate pacer
//!
//! Chunk boundaries are derived from the service limit alone; pacing measures
//! how long the current window has been open and sleeps off the remainder of
//! the period.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::time::Duration;

use tokio::time::Instant;

/// Number of chunks needed to cover `len` items
pub fn chunk_count(len: usize, limit: NonZeroUsize) -> usize {
    len.div_ceil(limit.get())
}

/// Left-to-right chunk boundaries over `len` items
pub fn chunk_ranges(len: usize, limit: NonZeroUsize) -> ChunkRanges {
    ChunkRanges {
        next: 0,
        len,
        limit: limit.get(),
    }
}

/// Time left in a window of `period` after `elapsed`, if any
pub fn remaining_in_window(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Iterator over contiguous, non-overlapping chunk ranges
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    next: usize,
    len: usize,
    limit: usize,
}

impl Iterator for ChunkRanges {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.limit).min(self.len);
        self.next = end;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.next).div_ceil(self.limit);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkRanges {}

/// Paces submissions to one per period
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    window_start: Instant,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            window_start: Instant::now(),
        }
    }

    /// Mark the start of a submission (or launch) window
    pub fn start_window(&mut self) {
        self.window_start = Instant::now();
    }

    /// Sleep until the current window has lasted one full period
    ///
    /// Returns the time slept, `None` when the window had already elapsed.
    pub async fn pace(&self) -> Option<Duration> {
        let wait = remaining_in_window(self.period, self.window_start.elapsed())?;
        tokio::time::sleep(wait).await;
        Some(wait)
    }
}
