//! Structured JSON logger
//!
//! - One log line = one event
//! - Deterministic key ordering (event, severity, then fields sorted)
//! - Synchronous, unbuffered
//! - Errors and fatals go to stderr, everything else to stdout

use std::fmt;
use std::io::{self, Write};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable slot or engine condition
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured logger producing one JSON object per event.
///
/// JSON is built by hand so that key ordering is deterministic and logging
/// never allocates through a serializer.
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stdout());
    }

    /// Log to stderr (errors and fatals)
    pub fn log_stderr(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stderr());
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let mut line = String::with_capacity(192);

        line.push_str("{\"event\":\"");
        Self::escape_into(&mut line, event);
        line.push_str("\",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted {
            line.push_str(",\"");
            Self::escape_into(&mut line, key);
            line.push_str("\":\"");
            Self::escape_into(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");

        // One write_all per event so lines never interleave
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    fn escape_into(out: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        }
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log_stderr(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log_stderr(Severity::Fatal, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut buffer = Vec::new();
        Logger::log_to_writer(severity, event, fields, &mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_log_is_valid_json() {
        let output = capture(Severity::Info, "slot_created", &[("slot", "orders")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "slot_created");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["slot"], "orders");
    }

    #[test]
    fn test_log_field_order_deterministic() {
        let a = capture(Severity::Info, "e", &[("z", "1"), ("a", "2")]);
        let b = capture(Severity::Info, "e", &[("a", "2"), ("z", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_log_escapes_quotes() {
        let output = capture(Severity::Warn, "bad \"value\"", &[]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "bad \"value\"");
    }
}
