//! Helpers only meant to be used from `#[cfg(test)]` code or integration
//! test binaries.

use std::sync::Once;

static START: Once = Once::new();

/// Installs a `tracing_subscriber` that prints to stdout, filtered by
/// `RUST_LOG` (defaulting to `debug`). Safe to call from every test in a
/// binary; only the first call has any effect.
pub fn maybe_start_logging() {
    START.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

#[cfg(feature = "future_timeout")]
pub mod timeout {
    use std::future::Future;
    use std::time::Duration;

    /// Awaits `fut`, panicking if it doesn't resolve within `duration`.
    pub async fn with_timeout<F: Future>(duration: Duration, fut: F) -> F::Output {
        tokio::time::timeout(duration, fut)
            .await
            .expect("future did not complete within timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_call_repeatedly() {
        maybe_start_logging();
        maybe_start_logging();
    }
}
