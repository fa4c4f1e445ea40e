//! Process-wide tracing setup shared by every binary.

/// Initialize tracing/logging from `BLOODBANK_LOG_FORMAT` and `RUST_LOG`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (format, filters).
pub mod tracing;

pub use self::tracing::LogFormat;
