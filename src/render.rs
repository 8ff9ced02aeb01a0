//! Display glue: timestamp formatting, message rendering, and the
//! mode/quiet-gated printer.
//!
//! Nothing in here touches the connection; the duplex loop hands this
//! module fully filtered events and strings.

use chrono::{DateTime, NaiveDateTime};

use crate::config::Mode;
use crate::protocol::{InboundEvent, MessageEvent};

/// Render an ISO-8601 timestamp as `HH:MM`.
///
/// A trailing `Z` is treated as a UTC offset; timestamps without an
/// offset are accepted too. Anything unparseable renders as `??:??`
/// rather than failing the event.
#[must_use]
pub fn fmt_time(ts: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.format("%H:%M").to_string();
    }
    if let Ok(dt) = ts.parse::<NaiveDateTime>() {
        return dt.format("%H:%M").to_string();
    }
    "??:??".to_string()
}

/// Human-readable rendering for the interactive mode:
/// `[HH:MM] sender: content`.
#[must_use]
pub fn render_plain(msg: &MessageEvent) -> String {
    let ts = fmt_time(msg.timestamp.as_deref().unwrap_or(""));
    format!(
        "[{ts}] {}: {}",
        msg.sender_label(),
        msg.content.as_deref().unwrap_or("")
    )
}

/// One-line JSON rendering for the stream mode. Emits every field of the
/// message schema (nulls included) under `"type":"message"`.
pub fn render_json(msg: &MessageEvent) -> anyhow::Result<String> {
    serde_json::to_string(&InboundEvent::Message(msg.clone()))
        .map_err(|e| anyhow::anyhow!("failed to render message as JSON: {e}"))
}

/// Console printer that honors the operating mode and `--quiet`.
///
/// Info lines (banners, room lists) go to stdout and only appear in
/// interactive mode; warnings go to stderr and are dropped by `--quiet`.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    show_info: bool,
    quiet: bool,
}

impl Printer {
    /// Build a printer for the given mode and quiet flag.
    #[must_use]
    pub fn new(mode: Mode, quiet: bool) -> Self {
        Self {
            show_info: mode.shows_info() && !quiet,
            quiet,
        }
    }

    /// Print an informational line, if this mode shows them.
    pub fn info(&self, text: &str) {
        if self.show_info {
            println!("{text}");
        }
    }

    /// Print a non-fatal warning to stderr, unless quiet.
    pub fn warn(&self, text: &str) {
        if !self.quiet {
            eprintln!("{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_time_utc_suffix() {
        assert_eq!(fmt_time("2024-01-01T10:00:00Z"), "10:00");
    }

    #[test]
    fn test_fmt_time_numeric_offset() {
        // Wall time is rendered in the timestamp's own offset.
        assert_eq!(fmt_time("2024-06-15T23:45:00+02:00"), "23:45");
    }

    #[test]
    fn test_fmt_time_without_offset() {
        assert_eq!(fmt_time("2024-01-01T07:05:00"), "07:05");
    }

    #[test]
    fn test_fmt_time_malformed_never_fails() {
        assert_eq!(fmt_time(""), "??:??");
        assert_eq!(fmt_time("yesterday"), "??:??");
        assert_eq!(fmt_time("2024-13-99T99:99:99Z"), "??:??");
    }

    #[test]
    fn test_render_plain_prefers_display_name() {
        let msg = MessageEvent {
            sender: Some("u1".into()),
            sender_display_name: Some("User One".into()),
            content: Some("hello".into()),
            timestamp: Some("2024-01-01T10:00:00Z".into()),
            ..MessageEvent::default()
        };
        assert_eq!(render_plain(&msg), "[10:00] User One: hello");
    }

    #[test]
    fn test_render_plain_fallbacks() {
        let msg = MessageEvent::default();
        assert_eq!(render_plain(&msg), "[??:??] ?: ");
    }

    #[test]
    fn test_render_json_line() {
        let msg = MessageEvent {
            id: Some("m1".into()),
            room: Some("r1".into()),
            content: Some("hi".into()),
            timestamp: Some("2024-01-01T10:00:00Z".into()),
            ..MessageEvent::default()
        };
        let line = render_json(&msg).unwrap();
        assert!(line.starts_with(r#"{"type":"message""#));
        assert!(line.contains(r#""content":"hi""#));
        assert!(line.contains(r#""timestamp":"2024-01-01T10:00:00Z""#));
        // Unset fields are emitted as nulls, not omitted.
        assert!(line.contains(r#""sender":null"#));
        assert!(!line.contains('\n'));
    }
}
