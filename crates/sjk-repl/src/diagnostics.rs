//! Diagnostic formatting.
//!
//! Debugger errors arrive as opaque strings. This module strips the
//! known prefixes, classifies severity, formats Swift-level stack
//! frames, and pattern-matches a small catalog of common Swift
//! mistakes to attach remediation hints. Matching is advisory: hints
//! are appended, never merged into the message.

use crate::debugger::FrameInfo;
use sjk_types::{Diagnostic, Severity, StackFrame};

/// Prefix of compile diagnostics produced by the expression evaluator.
pub const COMPILE_ERROR_PREFIX: &str = "error: <EXPR>:";

/// Preamble of interrupted evaluations.
pub const INTERRUPT_PREFIX: &str = "Execution was interrupted, reason: ";

/// Leading debugger prefixes that are noise to the user.
const STRIP_PREFIXES: &[&str] = &[COMPILE_ERROR_PREFIX, INTERRUPT_PREFIX];

/// Returns whether a raw error description is a compile diagnostic.
#[must_use]
pub fn is_compile_error(raw: &str) -> bool {
    raw.starts_with(COMPILE_ERROR_PREFIX)
}

/// Returns whether a raw error description reports an interruption.
#[must_use]
pub fn is_interrupt(raw: &str) -> bool {
    raw.starts_with(INTERRUPT_PREFIX) || raw.contains("interrupted")
}

/// Strips known debugger prefixes and surrounding whitespace.
#[must_use]
pub fn clean_message(raw: &str) -> String {
    let mut message = raw;
    for prefix in STRIP_PREFIXES {
        if let Some(rest) = message.strip_prefix(prefix) {
            message = rest.trim_start();
        }
    }
    message.trim().to_string()
}

/// Decodes raw debugger bytes defensively: strict UTF-8 first, then
/// UTF-8 with replacement; Latin-1 (which never fails) as the final
/// fallback when replacement would discard everything.
#[must_use]
pub fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(bytes);
            if lossy.chars().all(|c| c == char::REPLACEMENT_CHARACTER) {
                decode_latin1(bytes)
            } else {
                lossy.into_owned()
            }
        }
    }
}

/// Latin-1 decoding; total, byte-per-char.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Converts raw debugger frames into displayable stack frames.
///
/// Frames without source information and compiler-generated
/// specializations are skipped.
#[must_use]
pub fn format_frames(frames: &[FrameInfo]) -> Vec<StackFrame> {
    frames
        .iter()
        .filter_map(|frame| {
            let file = frame.file.as_deref()?;
            if file == "<compiler-generated>" || frame.line == 0 {
                return None;
            }
            let basename = file.rsplit('/').next().unwrap_or(file);
            Some(StackFrame {
                function: if frame.function.is_empty() {
                    "<unknown>".to_string()
                } else {
                    frame.function.clone()
                },
                file: basename.to_string(),
                line: frame.line,
                column: frame.column,
            })
        })
        .collect()
}

/// Builds a compile-error diagnostic from a raw description.
#[must_use]
pub fn compile_diagnostic(raw: &str) -> Diagnostic {
    let message = clean_message(raw);
    let mut diag = Diagnostic {
        name: "CompileError".to_string(),
        severity: Severity::classify(raw),
        message,
        frames: Vec::new(),
        hints: Vec::new(),
    };
    diag.hints = hints_for(&diag.message);
    diag
}

/// Builds a runtime-error diagnostic from a stop reason and captured
/// frames.
#[must_use]
pub fn runtime_diagnostic(reason: &str, frames: &[FrameInfo]) -> Diagnostic {
    let mut diag = Diagnostic::error("RuntimeError", clean_message(reason))
        .with_frames(format_frames(frames));
    diag.hints = hints_for(&diag.message);
    diag
}

/// The fatal diagnostic for an exited or crashed process.
#[must_use]
pub fn fatal_diagnostic() -> Diagnostic {
    Diagnostic::error("FatalError", "Process killed")
        .with_hint("The Swift process is no longer running and cannot be recovered.")
        .with_hint("Restart the kernel; if the problem persists, re-register the kernel.")
}

/// Matches the message against a catalog of common Swift mistakes.
///
/// Returns advisory hints; an empty result means the compiler's own
/// message stands alone.
#[must_use]
pub fn hints_for(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut hints = Vec::new();

    if lower.contains("cannot assign to value:") && lower.contains("is a 'let' constant") {
        hints.push("Tip: declare the variable with 'var' instead of 'let' to make it mutable".into());
    } else if lower.contains("use of unresolved identifier")
        || lower.contains("use of undeclared identifier")
        || lower.contains("cannot find") && lower.contains("in scope")
    {
        hints.push("Tip: make sure the identifier is defined before using it".into());
        hints.push("   - Check for typos, and that the defining cell has been executed".into());
    } else if lower.contains("cannot convert value of type") {
        hints.push("Tip: check the types of your values".into());
        hints.push(
            "   - Convert explicitly where needed, e.g. String(intValue) or Int(stringValue)"
                .into(),
        );
    } else if lower.contains("missing return") {
        hints.push("Tip: every code path in this function must return a value".into());
    } else if lower.contains("value of optional type")
        && (lower.contains("must be unwrapped") || lower.contains("not unwrapped"))
    {
        hints.push("Tip: unwrap the optional before use".into());
        hints.push("   - if let value = optional { ... }, optional ?? defaultValue, or guard let"
            .into());
    } else if lower.contains("unexpectedly found nil") {
        hints.push("Tip: an optional value was nil when it should not be".into());
        hints.push("   - Use nil coalescing (value ?? default) or check for nil first".into());
    } else if lower.contains("cannot call value of non-function type") {
        hints.push("Tip: only functions can be called with ()".into());
    } else if lower.contains("consecutive statements on a line must be separated by") {
        hints.push("Tip: put each statement on its own line, or separate them with semicolons"
            .into());
    } else if lower.contains("expected expression") {
        hints.push("Tip: a value or expression is missing here".into());
        hints.push("   - Check for missing operands and unbalanced brackets".into());
    } else if lower.contains("missing argument") {
        hints.push("Tip: this call needs more arguments; check the function signature".into());
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_prefix_detection() {
        assert!(is_compile_error("error: <EXPR>:2:5: cannot convert"));
        assert!(!is_compile_error("warning: unused variable"));
    }

    #[test]
    fn clean_message_strips_known_prefixes() {
        assert_eq!(
            clean_message("error: <EXPR>: cannot convert value of type 'String'"),
            "cannot convert value of type 'String'"
        );
        assert_eq!(
            clean_message("Execution was interrupted, reason: signal SIGINT."),
            "signal SIGINT."
        );
        assert_eq!(clean_message("  plain  "), "plain");
    }

    #[test]
    fn decode_invalid_utf8_never_fails() {
        let bytes = [b'o', b'k', 0xFF, b'!'];
        let text = decode_bytes(&bytes);
        assert!(text.contains("ok"));
        assert!(text.contains('!'));
    }

    #[test]
    fn decode_latin1_is_total() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(decode_latin1(&all).chars().count(), 256);
    }

    #[test]
    fn frames_without_source_are_dropped() {
        let frames = vec![
            FrameInfo {
                function: "f".into(),
                file: Some("/work/<Cell 2>".into()),
                line: 3,
                column: 1,
            },
            FrameInfo {
                function: "lib".into(),
                file: None,
                line: 0,
                column: 0,
            },
            FrameInfo {
                function: "spec".into(),
                file: Some("<compiler-generated>".into()),
                line: 1,
                column: 1,
            },
        ];
        let formatted = format_frames(&frames);
        assert_eq!(formatted.len(), 1);
        assert_eq!(formatted[0].file, "<Cell 2>");
        assert_eq!(formatted[0].to_string(), "  at f (<Cell 2>:3:1)");
    }

    #[test]
    fn conversion_hint_mentions_explicit_conversion() {
        let diag =
            compile_diagnostic("error: <EXPR>:1:20: cannot convert value of type 'String' to 'Int'");
        assert!(diag.message.contains("cannot convert value of type"));
        assert!(diag.hints.iter().any(|h| h.contains("Convert explicitly")));
    }

    #[test]
    fn unmatched_message_gets_no_hints() {
        assert!(hints_for("something nobody anticipated").is_empty());
    }

    #[test]
    fn fatal_diagnostic_mentions_reregistration() {
        let diag = fatal_diagnostic();
        assert!(diag.hints.iter().any(|h| h.contains("re-register")));
    }
}
