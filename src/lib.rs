pub mod completion;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod http_handler;
pub mod json_extract;
pub mod metadata;
pub mod pacing;
pub mod search_context;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use tracing_subscriber::EnvFilter;

/// Initializes tracing for CloudWatch logs.
///
/// Filter comes from `RUST_LOG` (default `info`). Timestamps are left to
/// CloudWatch.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
