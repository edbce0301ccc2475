//! Unified error-code interface.
//!
//! Every SJK error type implements [`DiagnosticCode`] so that the
//! protocol adapter can attach a stable machine-readable name (`ename`)
//! to error replies and so logs can be filtered by code.
//!
//! # Code Format
//!
//! - UPPER_SNAKE_CASE
//! - Prefixed by domain: `INSTALL_`, `REPL_`, `PREPROCESS_`, `PROTOCOL_`
//! - Stable once defined

/// Stable machine-readable code for an SJK error.
pub trait DiagnosticCode {
    /// Returns the machine-readable code, e.g. `"INSTALL_TIMEOUT"`.
    fn code(&self) -> &'static str;

    /// Returns whether retrying (or user action) may succeed.
    ///
    /// A build timeout is recoverable (raise the budget); a malformed
    /// package spec is not (the same input will fail again).
    fn is_recoverable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Sample {
        Transient,
        Permanent,
    }

    impl DiagnosticCode for Sample {
        fn code(&self) -> &'static str {
            match self {
                Self::Transient => "SAMPLE_TRANSIENT",
                Self::Permanent => "SAMPLE_PERMANENT",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(Sample::Transient.code(), "SAMPLE_TRANSIENT");
        assert!(Sample::Transient.is_recoverable());
        assert!(!Sample::Permanent.is_recoverable());
    }
}
