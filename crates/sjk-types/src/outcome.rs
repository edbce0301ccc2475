//! Execution outcomes.
//!
//! Every evaluation of a cell produces exactly one
//! [`ExecutionOutcome`]. Errors are values: nothing in the execution
//! path panics or unwinds across a component boundary on user-code
//! failure.

use crate::Diagnostic;
use serde::{Deserialize, Serialize};

/// Bounded child node harvested from the debugger's value-child
/// enumeration, used for table rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChild {
    /// Field name, dictionary key, or element index.
    pub name: String,
    pub type_name: String,
    pub value: String,
}

/// Structured description of the last expression of a successful cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDescription {
    /// Swift type name as reported by the debugger, e.g. `Array<Int>`.
    pub type_name: String,
    /// Human display of the value with debugger metadata stripped,
    /// e.g. `42` rather than `(Int) $R0 = 42`. This is the plain-text
    /// form published to the client.
    pub summary: String,
    /// Child fields where relevant for display. Capped by the
    /// supervisor before construction.
    pub children: Vec<ValueChild>,
    /// HTML table form, when the value renders as one. The adapter
    /// publishes both forms so the client picks the richer one it
    /// understands.
    pub html: Option<String>,
}

impl ValueDescription {
    /// A plain value with no children.
    #[must_use]
    pub fn plain(type_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            summary: summary.into(),
            children: Vec::new(),
            html: None,
        }
    }
}

/// The result of executing one cell.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Statements that produced an expression result.
    SuccessWithValue(ValueDescription),
    /// Statements that produced no expression result.
    SuccessWithoutValue,
    /// A failure detected before the code reached the debugger.
    PreprocessorError(Diagnostic),
    /// The debugger returned an error beginning with the
    /// compile-diagnostic prefix.
    CompileError(Diagnostic),
    /// The process stopped in a non-exited state.
    RuntimeError {
        diagnostic: Diagnostic,
        /// True when the process exited or crashed and must be
        /// re-launched; the kernel marks itself degraded.
        process_lost: bool,
    },
    /// A pending interrupt intercepted the evaluation.
    Interrupted,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessWithValue(_) | Self::SuccessWithoutValue)
    }

    /// The diagnostic carried by error outcomes, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::PreprocessorError(diag)
            | Self::CompileError(diag)
            | Self::RuntimeError {
                diagnostic: diag, ..
            } => Some(diag),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_variants() {
        assert!(ExecutionOutcome::SuccessWithoutValue.is_success());
        assert!(
            ExecutionOutcome::SuccessWithValue(ValueDescription::plain("Int", "42")).is_success()
        );
        assert!(!ExecutionOutcome::Interrupted.is_success());
    }

    #[test]
    fn diagnostic_accessor() {
        let outcome = ExecutionOutcome::CompileError(Diagnostic::error("CompileError", "bad"));
        assert_eq!(outcome.diagnostic().unwrap().message, "bad");
        assert!(ExecutionOutcome::SuccessWithoutValue.diagnostic().is_none());
    }
}
