//! Installed-package records and install error taxonomy.

use crate::{DiagnosticCode, PackageRequest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Record of a successfully installed package, keyed by product name.
///
/// Lifetime is the kernel process lifetime; packages cannot be
/// unloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// The dependency specification that produced this package.
    pub request: PackageRequest,
    /// Fingerprint of the module artifacts copied into the search
    /// path (byte count of the copied set, used only to detect stale
    /// artifacts in logs).
    pub fingerprint: u64,
    /// Shared libraries loaded into the running REPL.
    pub libraries: Vec<PathBuf>,
    /// Additional include directories resolved for this install.
    pub include_dirs: Vec<PathBuf>,
}

/// Sub-taxonomy of package-install failures.
///
/// Each kind carries fixed remediation text; the text is advisory and
/// appended as hints to the diagnostic, never merged into the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallErrorKind {
    MissingConfig,
    BadSpec,
    BuildFailure,
    Timeout,
    ArtifactCopyFailure,
    LoadFailure,
}

impl InstallErrorKind {
    /// Fixed remediation hints for this failure kind.
    #[must_use]
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::MissingConfig => &[
                "Tip: this usually means the kernel was not registered correctly.",
                "   - Re-run the kernel registration tool with --swift-toolchain <path>",
                "   - Check that SWIFT_BUILD_PATH and SWIFT_PACKAGE_PATH are set in kernel.json",
            ],
            Self::BadSpec => &[
                "Tip: %install usage: %install SPEC PRODUCT [PRODUCT ...]",
                "   - SPEC is a SwiftPM dependency clause, e.g. .package(url: \"...\", from: \"1.0.0\")",
            ],
            Self::BuildFailure => &[
                "Tip: troubleshooting a failed build:",
                "   - Check that the package URL is correct and the version/branch exists",
                "   - Check your internet connection",
                "   - Try verbose output: %install-swiftpm-flags -v",
                "   - Some packages may not be compatible with your Swift version",
            ],
            Self::Timeout => &[
                "Tip: large packages may take longer to build.",
                "   - Increase the budget: export SWIFT_JUPYTER_BUILD_TIMEOUT=1200",
                "   - Check your internet connection for slow downloads",
                "   - Pre-warm the build cache by building the package outside the kernel",
            ],
            Self::ArtifactCopyFailure => &[
                "Tip: failed to copy Swift module files.",
                "   - Check permissions on the module search path",
                "   - Ensure you have enough disk space",
                "   - Try cleaning the cached modules directory",
            ],
            Self::LoadFailure => &[
                "Tip: common causes of a failed dynamic load:",
                "   - Missing system libraries (inspect the library with ldd)",
                "   - Incompatible Swift runtime between kernel and package",
                "   - Stale build artifacts (clean the package_base directory)",
                "   - Architecture mismatch (check the toolchain architecture)",
            ],
        }
    }
}

impl DiagnosticCode for InstallErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingConfig => "INSTALL_MISSING_CONFIG",
            Self::BadSpec => "INSTALL_BAD_SPEC",
            Self::BuildFailure => "INSTALL_BUILD_FAILURE",
            Self::Timeout => "INSTALL_TIMEOUT",
            Self::ArtifactCopyFailure => "INSTALL_ARTIFACT_COPY_FAILURE",
            Self::LoadFailure => "INSTALL_LOAD_FAILURE",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout | Self::BuildFailure => true,
            Self::MissingConfig | Self::BadSpec | Self::ArtifactCopyFailure | Self::LoadFailure => {
                false
            }
        }
    }
}
