//! Install error taxonomy.

use sjk_types::{Diagnostic, InstallErrorKind};
use thiserror::Error;

/// Errors of the package installer.
///
/// Every variant maps to a sub-kind with fixed remediation text; the
/// kernel renders them as structured diagnostics, never as panics.
#[derive(Debug, Error)]
pub enum InstallError {
    /// A required builder path is absent from the environment.
    #[error("cannot install packages: {0} is not configured")]
    MissingConfig(&'static str),

    /// The install directive itself is malformed.
    #[error("invalid install directive: {0}")]
    BadSpec(String),

    /// Install attempted after Swift source already executed.
    #[error(
        "packages can only be installed before any Swift code has been executed in this session"
    )]
    OrderingViolation,

    /// The external builder failed.
    #[error("swift-build failed: {0}")]
    BuildFailure(String),

    /// The build budget elapsed.
    #[error("package build timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Copying module artifacts into the search path failed.
    #[error("failed to copy Swift module artifacts: {0}")]
    ArtifactCopyFailure(String),

    /// Dynamically loading a produced library failed.
    #[error("failed to load shared library: {0}")]
    LoadFailure(String),
}

impl InstallError {
    /// The user-facing sub-kind, when one applies.
    #[must_use]
    pub fn kind(&self) -> Option<InstallErrorKind> {
        match self {
            Self::MissingConfig(_) => Some(InstallErrorKind::MissingConfig),
            Self::BadSpec(_) => Some(InstallErrorKind::BadSpec),
            Self::OrderingViolation => None,
            Self::BuildFailure(_) => Some(InstallErrorKind::BuildFailure),
            Self::Timeout { .. } => Some(InstallErrorKind::Timeout),
            Self::ArtifactCopyFailure(_) => Some(InstallErrorKind::ArtifactCopyFailure),
            Self::LoadFailure(_) => Some(InstallErrorKind::LoadFailure),
        }
    }

    /// Renders the error as a user-facing diagnostic with the fixed
    /// remediation hints attached.
    #[must_use]
    pub fn diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error("PackageInstallError", self.to_string());
        match self.kind() {
            Some(kind) => {
                for hint in kind.remediation() {
                    diag = diag.with_hint(*hint);
                }
            }
            None => {
                // Ordering violation carries its own restart advice.
                diag = diag
                    .with_hint("Tip: restart the kernel to install packages.")
                    .with_hint("   - %install must run before any other Swift code")
                    .with_hint(
                        "   - The REPL copies module search paths only at startup, so later \
                         installs would leave linkage inconsistent",
                    );
            }
        }
        diag
    }
}
