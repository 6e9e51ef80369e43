//! # Dispatcher
//!
//! Forwards a batch to a rate-limited service.
//!
//! - Slices the batch into chunks of at most `limit` items
//! - Paces submissions to one chunk per `period`
//! - Sequential mode stops at the first failure
//! - Parallel mode runs one task per chunk and reports failures on channels

pub mod chunk;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod pacer;
mod parallel;

pub use chunk::{Chunk, UnsentChunk};
pub use contracts::{CancellationToken, RateLimitedService, RateLimits, ServiceError};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::DispatcherError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use mock::{MockService, ProcessCall};
pub use pacer::{chunk_count, chunk_ranges, remaining_in_window, ChunkRanges, Pacer};
