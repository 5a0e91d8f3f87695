//! Tracing subscriber initialization for embedding binaries and tests.
//!
//! Log context (correlation ID, conversation ID, subscriber ID) is
//! propagated via tracing spans; the broadcaster opens a `dispatch` span
//! per envelope so every fan-out log line carries the correlation ID.

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` overrides `level` when set.
///
/// # Arguments
///
/// * `level` - Minimum log level to display. The embedding service
///   typically passes `"info"`.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_subscriber("warn");
        init_subscriber("debug");
        // Second call must not panic or replace the subscriber.
        tracing::debug!("still alive");
    }
}
