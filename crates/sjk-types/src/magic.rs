//! Magic directive variants.
//!
//! A magic is a preprocessor directive, prefixed with `%`, handled by
//! the kernel rather than the Swift REPL. Parsing lives in the
//! preprocessor; this module only defines the recognized shapes.
//!
//! | Family | Directives |
//! |---|---|
//! | Install | `%install`, `%install-swiftpm-flags`, `%install-extra-include-command`, `%install-location` |
//! | Source | `%include`, `%system` |
//! | Search paths | `%swift_library_path`, `%swift_module_path`, `%swift_framework_path` |
//! | Linkage | `%swift_link`, `%swift_flags`, `%swift_env`, `%swift_config`, `%swiftir_setup` |
//! | Session | `%help`, `%lsmagic`, `%who`, `%reset`, `%timeit`, `%env`, `%swift-version`, `%load`, `%save`, `%history`, `%enable_completion`, `%disable_completion` |

use serde::{Deserialize, Serialize};

/// A package dependency plus the products to link from it.
///
/// `spec` is a SwiftPM dependency clause, e.g.
/// `.package(url: "https://...", from: "1.0.0")`; `$cwd` in the spec is
/// substituted with the kernel's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequest {
    pub spec: String,
    pub products: Vec<String>,
}

/// A parsed magic directive.
///
/// All directives not representable here are preprocessor errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicDirective {
    /// `%install SPEC PRODUCT [PRODUCT ...]`
    Install(PackageRequest),
    /// `%install-swiftpm-flags FLAGS...`: extra flags for the builder.
    InstallSwiftpmFlags(Vec<String>),
    /// `%install-extra-include-command CMD` - shell command whose stdout
    /// yields additional `-I` include flags.
    InstallExtraIncludeCommand(String),
    /// `%install-location PATH` - override the artifact root.
    InstallLocation(String),
    /// `%include "NAME"` - splice a helper file into the cell.
    Include { name: String, line: usize },
    /// `%system CMD` - first-cell-only shell escape.
    System(String),
    /// Prepend a path to the dynamic loader search path.
    SwiftLibraryPath(String),
    /// Prepend a path to the Swift module search path.
    SwiftModulePath(String),
    /// Prepend a path to the framework search path (Darwin only).
    SwiftFrameworkPath(String),
    /// Declare a symbol that must resolve after subsequent loads.
    SwiftLink(String),
    /// Extra compiler flags forwarded to the package builder.
    SwiftFlags(Vec<String>),
    /// `%swift_env NAME=VALUE` - set an environment variable for the
    /// REPL and builder.
    SwiftEnv { name: String, value: String },
    /// Display a summary of the accumulated setup.
    SwiftConfig,
    /// Composite setup: library/module/framework paths rooted at one
    /// directory.
    SwiftIrSetup(String),
}

impl MagicDirective {
    /// The directive's user-facing name, without the `%` sigil.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::InstallSwiftpmFlags(_) => "install-swiftpm-flags",
            Self::InstallExtraIncludeCommand(_) => "install-extra-include-command",
            Self::InstallLocation(_) => "install-location",
            Self::Include { .. } => "include",
            Self::System(_) => "system",
            Self::SwiftLibraryPath(_) => "swift_library_path",
            Self::SwiftModulePath(_) => "swift_module_path",
            Self::SwiftFrameworkPath(_) => "swift_framework_path",
            Self::SwiftLink(_) => "swift_link",
            Self::SwiftFlags(_) => "swift_flags",
            Self::SwiftEnv { .. } => "swift_env",
            Self::SwiftConfig => "swift_config",
            Self::SwiftIrSetup(_) => "swiftir_setup",
        }
    }

    /// Whether this directive belongs to the install family, subject to
    /// the install-ordering invariant.
    #[must_use]
    pub fn is_install_class(&self) -> bool {
        matches!(
            self,
            Self::Install(_)
                | Self::InstallSwiftpmFlags(_)
                | Self::InstallExtraIncludeCommand(_)
                | Self::InstallLocation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_class_membership() {
        let install = MagicDirective::Install(PackageRequest {
            spec: ".package(path: \"$cwd/pkg\")".into(),
            products: vec!["Pkg".into()],
        });
        assert!(install.is_install_class());
        assert!(MagicDirective::InstallLocation("/tmp".into()).is_install_class());
        assert!(!MagicDirective::SwiftConfig.is_install_class());
        assert!(!MagicDirective::System("ls".into()).is_install_class());
    }

    #[test]
    fn names_match_user_syntax() {
        assert_eq!(
            MagicDirective::SwiftLibraryPath("/lib".into()).name(),
            "swift_library_path"
        );
        assert_eq!(
            MagicDirective::InstallSwiftpmFlags(vec![]).name(),
            "install-swiftpm-flags"
        );
    }
}
