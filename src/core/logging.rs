//! Subscriber setup for the binary. `CELLSCRIPT_DEBUG=1` turns on debug
//! output; `CELLSCRIPT_LOG` names a level explicitly and wins over it.

use tracing::Level;

pub const DEBUG_ENV: &str = "CELLSCRIPT_DEBUG";
pub const LEVEL_ENV: &str = "CELLSCRIPT_LOG";

pub fn level_from(debug: Option<&str>, level: Option<&str>) -> Level {
    if let Some(l) = level.and_then(parse_level) {
        return l;
    }
    if debug == Some("1") {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Installs a stderr fmt subscriber. A second call is a no-op.
pub fn init() {
    let debug = std::env::var(DEBUG_ENV).ok();
    let level = std::env::var(LEVEL_ENV).ok();
    let max = level_from(debug.as_deref(), level.as_deref());
    let _ = tracing_subscriber::fmt()
        .with_max_level(max)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins() {
        assert_eq!(level_from(None, None), Level::WARN);
        assert_eq!(level_from(Some("1"), None), Level::DEBUG);
        assert_eq!(level_from(Some("1"), Some("error")), Level::ERROR);
        assert_eq!(level_from(None, Some("bogus")), Level::WARN);
        assert_eq!(level_from(Some("0"), Some("Trace")), Level::TRACE);
    }
}
