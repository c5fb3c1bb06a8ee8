//! Tracing subscriber setup shared by binaries, benches and tests.

/// Subscriber construction (filters, formats).
pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide logging filtered by `RUST_LOG` (default `info`).
///
/// JSON unless `STOCKLEDGER_LOG_FORMAT=pretty`. This is safe to call multiple
/// times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env(), "info");
}

/// Human-readable logs captured by the test harness, filtered by `RUST_LOG`
/// (default `debug`).
pub fn init_for_tests() {
    subscriber::init_test_writer("debug");
}
