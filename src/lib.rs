pub mod audio;
pub mod config;
pub mod framing;
pub mod handoff;
pub mod lifecycle;
mod lock;
pub mod relay;
pub mod segment;
mod telemetry;
#[cfg(test)]
mod test_support;
pub mod transfer;

pub(crate) use lock::lock_or_recover;
pub use relay::{Relay, RelayConfig, RelayStats};
pub use telemetry::init_tracing;
