//! Tracing/logging initialization.
//!
//! Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then `info`.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").ok();
        EnvFilter::new(level_directive(level.as_deref()))
    });

    // JSON logs + timestamps; span fields (job_id, kind) ride along.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}

/// Map a `LOG_LEVEL` value onto a filter directive.
///
/// Accepts the conventional upper-case names, including `WARNING` and
/// `CRITICAL`. Anything unrecognised falls back to `info`.
pub fn level_directive(level: Option<&str>) -> &'static str {
    match level.map(|l| l.trim().to_ascii_uppercase()).as_deref() {
        Some("TRACE") => "trace",
        Some("DEBUG") => "debug",
        Some("WARN" | "WARNING") => "warn",
        Some("ERROR" | "CRITICAL") => "error",
        _ => "info",
    }
}
