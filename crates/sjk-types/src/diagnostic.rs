//! Structured diagnostics.
//!
//! A [`Diagnostic`] is the user-facing form of every kernel-side
//! failure: preprocessor errors, compile errors, runtime errors with
//! stack traces, install errors, interrupts. The message body is
//! already cleaned (debugger prefixes stripped); hints are advisory
//! and rendered separately from the message so strict tooling can
//! drop them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity classified from the debugger's error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    /// Classifies severity by substring match, defaulting to `Error`.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("error:") {
            Self::Error
        } else if lower.contains("warning:") {
            Self::Warning
        } else if lower.contains("note:") {
            Self::Note
        } else {
            Self::Error
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Note => write!(f, "note"),
        }
    }
}

/// One Swift-level frame of a runtime-error stack trace.
///
/// Frames without source information are dropped before they reach
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function display name.
    pub function: String,
    /// Source file basename, typically a cell coordinate like
    /// `<Cell 3>`.
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  at {} ({}:{}:{})",
            self.function, self.file, self.line, self.column
        )
    }
}

/// A structured, user-facing diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Short machine-readable name (the Jupyter `ename`).
    pub name: String,
    pub severity: Severity,
    /// Cleaned message body with known debugger prefixes stripped.
    pub message: String,
    /// Swift-level stack frames, innermost first. Empty for compile
    /// errors and interrupts.
    pub frames: Vec<StackFrame>,
    /// Advisory remediation hints. Additive: they never alter the
    /// underlying message.
    pub hints: Vec<String>,
}

impl Diagnostic {
    /// Creates an error-severity diagnostic.
    #[must_use]
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity: Severity::Error,
            message: message.into(),
            frames: Vec::new(),
            hints: Vec::new(),
        }
    }

    /// Attaches stack frames.
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Appends an advisory hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Renders the diagnostic as Jupyter traceback lines: the message,
    /// then formatted frames, then hints.
    #[must_use]
    pub fn traceback(&self) -> Vec<String> {
        let mut lines = vec![self.message.clone()];
        if !self.frames.is_empty() {
            lines.push("Current stack trace:".to_string());
            lines.extend(self.frames.iter().map(|frame| format!("\t{frame}")));
        }
        lines.extend(self.hints.iter().cloned());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert_eq!(Severity::classify("error: bad"), Severity::Error);
        assert_eq!(Severity::classify("warning: meh"), Severity::Warning);
        assert_eq!(Severity::classify("note: fyi"), Severity::Note);
        assert_eq!(Severity::classify("something else"), Severity::Error);
    }

    #[test]
    fn frame_display_format() {
        let frame = StackFrame {
            function: "f".into(),
            file: "<Cell 2>".into(),
            line: 3,
            column: 9,
        };
        assert_eq!(frame.to_string(), "  at f (<Cell 2>:3:9)");
    }

    #[test]
    fn traceback_orders_message_frames_hints() {
        let diag = Diagnostic::error("RuntimeError", "fatal: index out of range")
            .with_frames(vec![StackFrame {
                function: "f".into(),
                file: "<Cell 1>".into(),
                line: 1,
                column: 1,
            }])
            .with_hint("check array bounds");
        let lines = diag.traceback();
        assert_eq!(lines[0], "fatal: index out of range");
        assert_eq!(lines[1], "Current stack trace:");
        assert!(lines[2].starts_with("\t  at f"));
        assert_eq!(lines.last().unwrap(), "check array bounds");
    }
}
