use tracing::warn;

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Escapes markdown-special characters in outbound notification text.
pub fn escape_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '_' | '*' | '`' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A notification sink. Errors are swallowed internally (wrap-and-swallow
/// with a `warn!` log) — a failed notification must never affect trading.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink: logs only. Swapping in a real chat/webhook sink never
/// touches executor code.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => tracing::info!(title = %notification.title, "{}", notification.body),
            Severity::Warning => warn!(title = %notification.title, "{}", notification.body),
            Severity::Critical => tracing::error!(title = %notification.title, "{}", notification.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_markdown_backslash_escapes_specials() {
        assert_eq!(escape_markdown("bo*ston_celtics"), "bo\\*ston\\_celtics");
    }

    #[test]
    fn escape_markdown_is_identity_on_plain_text() {
        assert_eq!(escape_markdown("nba-bos-mia-2026-01-15"), "nba-bos-mia-2026-01-15");
    }
}
