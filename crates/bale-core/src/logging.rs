use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,bale_bundles=debug,bale_builder=debug";

/// Install a `tracing` fmt subscriber.
///
/// Respects `RUST_LOG` when present. Returns false if a global subscriber
/// was already installed, in which case that one stays in place.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Keeping the existing subscriber: {}", e);
            false
        }
    }
}
