//! Opt-in `tracing` subscriber installation.
//!
//! This crate never installs a global subscriber on its own — doing so from
//! a library would fight with whatever the embedding binary wants. Call
//! [`init_tracing`] once at process startup if you want the spans and events
//! emitted by `fst::*` to go anywhere.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` formatter on stderr using `filter` as the
/// default `EnvFilter` directive (overridden by `RUST_LOG` if set).
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic() {
        // Subsequent calls in the same test binary legitimately fail with
        // TryInitError because a global subscriber is already set; we only
        // assert this doesn't panic.
        let _ = init_tracing("fst=debug");
    }
}
