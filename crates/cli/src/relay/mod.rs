//! Relay orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{build_service, Relay, RelayConfig};
pub use stats::RelayStats;
