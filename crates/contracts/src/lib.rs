//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Rate model
//! - A downstream service accepts at most `limit` items per `period`
//! - Items are opaque: nothing here ever inspects them
//! - Over capacity is reported as [`ServiceError::Blocked`]

mod blueprint;
mod error;
mod service;

pub use blueprint::*;
pub use error::*;
pub use service::*;

/// Re-exported so dispatch callers and service implementations agree on the
/// cancellation type without depending on `tokio-util` themselves.
pub use tokio_util::sync::CancellationToken;
