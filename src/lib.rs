//! # FlipperKit
//!
//! Event-driven controller core for pinball machines.
//!
//! ## Architecture
//!
//! FlipperKit is organized as a workspace with multiple crates:
//!
//! 1. **flipperkit-core** - Event dispatcher, handlers, queue tokens, errors
//! 2. **flipperkit-settings** - Configuration loading, validation, persistence
//! 3. **flipperkit** - Logging setup and the demo binary
//!
//! Devices and modes talk to each other only through named events posted on
//! an [`EventDispatcher`]. Four event kinds decide how handler results are
//! treated: Regular, Boolean, Relay and Queue.

pub use flipperkit_core::{
    payload, DispatchError, DispatchStatus, DispatcherConfig, EventDispatcher, EventKind, Handler,
    HandlerContext, HandlerKey, HandlerResult, Payload, QueueToken,
};

pub use flipperkit_settings::{Config, LogFormat, LoggingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging from the logging settings
///
/// Sets up structured logging with:
/// - Console output in the configured format (pretty, compact or JSON)
/// - RUST_LOG environment variable support, falling back to `settings.level`
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)?,
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(settings.with_target)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(settings.with_line_number);

    let registry = tracing_subscriber::registry().with(env_filter);
    match settings.format {
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init()?,
        LogFormat::Json => registry.with(fmt_layer.json()).try_init()?,
    }

    Ok(())
}

/// Build a dispatcher configured from `config`
pub fn build_dispatcher(config: &Config) -> EventDispatcher {
    EventDispatcher::with_config(config.dispatcher_config())
}
