//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g.
/// `RUST_LOG=voxstream::streaming=debug` to trace cache traffic.
///
/// # Example
/// ```
/// voxstream::core::logging::init();
/// log::info!("Asset streaming started");
/// ```
pub fn init() {
    // Tests and tools may call this more than once
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .format_timestamp_millis()
    .try_init();
}
