//! Structured events for tablet loads, directory changes and scan sessions.
//!
//! Nothing here installs a subscriber; the embedding server decides where
//! events go. Every event is emitted on target `tablet_store` with an `event`
//! name and the `component` that raised it:
//!
//! - `tablet`: `readers_loaded`, `reader_load_failed`, `tablet_dump`
//! - `directory`: `tablet_added`, `generation_dropped`, `tablet_reclaimed`,
//!   `tablet_release_failed`
//! - `scan`: `scanner_bound`, `tablet_removed`, `scan_closed`
//! - `reader`: `parquet_reader_opened`
//!
//! Tablet-scoped events also carry `range` and `data_version`, so a failed
//! load can be matched to the scans that hit it.

/// `tracing` target of every event below.
pub(crate) const TABLET_TARGET: &str = "tablet_store";

/// Info event on the crate target: lifecycle changes worth keeping.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "scan",
///     event = "tablet_removed",
///     range = %tablet.range(),
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::TABLET_TARGET, $($field)*)
    };
}

/// Debug event on the crate target: per-load and per-scan detail.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::TABLET_TARGET, $($field)*)
    };
}

/// Warn event on the crate target: retryable failures.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::TABLET_TARGET, $($field)*)
    };
}

/// Error event on the crate target: failures nobody can return.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::TABLET_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
