/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix for progress lines
///
/// Returns bright cyan if stdout is a TTY, plain text otherwise.
pub fn batchcache_prefix() -> &'static str {
    if std::io::stdout().is_terminal() {
        "\x1b[96m[batchcache]\x1b[0m"
    } else {
        "[batchcache]"
    }
}
