//! Tracing that is compiled in only when the `atlas_debug-trace` feature is enabled.

/// Forwards to [log::trace!] when the `atlas_debug-trace` feature is enabled,
/// and expands to nothing otherwise. The calling crate must depend on `log`.
///
/// # Examples
///
/// ```
/// atlas_utilities::debug_trace!("Freed cell {}", 42);
/// ```
#[macro_export]
#[cfg(feature = "atlas_debug-trace")]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        {
            log::trace!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "atlas_debug-trace"))]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{}};
}
