//! Migrates a chat account's conversation history into per-conversation
//! destination supergroups, inviting a second account into each so it
//! inherits read access. See the crate's `DESIGN.md` for module-by-module
//! design notes.

pub mod cli;
pub mod client;
pub mod config;
pub mod destination;
pub mod enumerator;
pub mod error;
pub mod masking;
pub mod migration;
pub mod model;
pub mod orchestrator;
pub mod progress_store;
pub mod ratelimit;
pub mod realtime;
pub mod report;
pub mod session;

/// Initializes the global `tracing` subscriber from `RUST_LOG` (falling
/// back to `log_level`).
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
