//! Installer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the build budget, in seconds.
pub const BUILD_TIMEOUT_ENV: &str = "SWIFT_JUPYTER_BUILD_TIMEOUT";

/// Default build budget.
const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Options of the package installer, sourced from the environment and
/// mutated by install magics.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Root of the on-disk layout (`package_base/`, `modules/`,
    /// `libs/`). Defaults under the per-user cache dir; overridable
    /// with `%install-location`.
    pub build_root: PathBuf,
    /// Path to the external `swift-build` executable.
    pub swift_build_path: Option<PathBuf>,
    /// Path to the external `swift-package` executable.
    pub swift_package_path: Option<PathBuf>,
    /// Wall-clock budget shared by the fetch/resolve and build phases.
    pub build_timeout: Duration,
}

impl Default for InstallConfig {
    fn default() -> Self {
        let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            build_root: cache.join("sjk"),
            swift_build_path: None,
            swift_package_path: None,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }
}

impl InstallConfig {
    /// Loads configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.swift_build_path = std::env::var_os("SWIFT_BUILD_PATH").map(PathBuf::from);
        config.swift_package_path = std::env::var_os("SWIFT_PACKAGE_PATH").map(PathBuf::from);
        if let Ok(raw) = std::env::var(BUILD_TIMEOUT_ENV) {
            match raw.parse::<u64>() {
                Ok(seconds) => config.build_timeout = Duration::from_secs(seconds),
                Err(_) => warn!(%raw, "ignoring non-integer {BUILD_TIMEOUT_ENV}"),
            }
        }
        config
    }

    /// Directory holding the synthesized throwaway package.
    #[must_use]
    pub fn package_base_dir(&self) -> PathBuf {
        self.build_root.join("package_base")
    }

    /// Consolidated module artifacts referenced by the running REPL.
    #[must_use]
    pub fn modules_dir(&self) -> PathBuf {
        self.build_root.join("modules")
    }

    /// Shared libraries loaded by the installer.
    #[must_use]
    pub fn libs_dir(&self) -> PathBuf {
        self.build_root.join("libs")
    }

    /// Overrides the artifact root (`%install-location`).
    pub fn set_build_root(&mut self, root: impl Into<PathBuf>) {
        self.build_root = root.into();
    }

    /// Platform suffix of dynamic libraries.
    #[must_use]
    pub fn lib_suffix() -> &'static str {
        if cfg!(target_os = "macos") {
            ".dylib"
        } else {
            ".so"
        }
    }

    /// Whether `path` names a dynamic library on this platform.
    #[must_use]
    pub fn is_dylib(path: &Path) -> bool {
        path.to_string_lossy().ends_with(Self::lib_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let mut config = InstallConfig::default();
        config.set_build_root("/tmp/sjk-test");
        assert_eq!(
            config.package_base_dir(),
            PathBuf::from("/tmp/sjk-test/package_base")
        );
        assert_eq!(config.modules_dir(), PathBuf::from("/tmp/sjk-test/modules"));
        assert_eq!(config.libs_dir(), PathBuf::from("/tmp/sjk-test/libs"));
    }

    #[test]
    fn default_timeout_is_ten_minutes() {
        assert_eq!(
            InstallConfig::default().build_timeout,
            Duration::from_secs(600)
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn dylib_suffix_matches_platform() {
        assert!(InstallConfig::is_dylib(Path::new("/x/libFoo.so")));
        assert!(!InstallConfig::is_dylib(Path::new("/x/libFoo.a")));
    }
}
