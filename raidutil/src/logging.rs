//! Structured, leveled logging for the raid server, initialized once at
//! process start. One terminal sink is enough for this service; nothing
//! downstream (the UI, the load driver) depends on the log format.

use sloggers::types::Severity;
use sloggers::Build;

/// Builds a terminal logger at the default `debug` level.
pub fn init() -> slog::Logger {
    init_with_level(Severity::Debug)
}

/// Builds a terminal logger at the given severity. `config.toml`-style
/// overrides can be layered on top of this the same way `ServerConfig`
/// layers its own overlays, but a fixed terminal sink covers every
/// deployment this service actually runs in.
pub fn init_with_level(level: Severity) -> slog::Logger {
    let mut builder = sloggers::terminal::TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(sloggers::terminal::Destination::Stderr);
    builder
        .build()
        .expect("failed to build terminal logger")
}
