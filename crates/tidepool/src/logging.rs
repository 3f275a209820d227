//! # Logging Bootstrap
//!
//! Installs a `tracing_subscriber` formatter. Libraries in this workspace only emit
//! `tracing` events; binaries and tests call `init` once.

use tracing::Level;

/// Parses a level name, falling back to `INFO` for anything unrecognized.
#[must_use]
pub fn parse_level(name: &str) -> Level {
    name.trim().parse().unwrap_or(Level::INFO)
}

/// Installs the global formatter at `level`.
///
/// Returns false if a subscriber was already installed; calling this twice is
/// harmless.
pub fn init(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// `init` with a level name, as found in a manifest's `[logging]` table.
pub fn init_from_str(level: &str) -> bool {
    init(parse_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_init_is_idempotent() {
        init(Level::WARN);
        assert!(!init_from_str("trace"));
    }
}
