//! Kernel configuration and accumulated setup state.
//!
//! # Environment Variables
//!
//! - `REPL_SWIFT_PATH`: location of the pre-built Swift REPL
//!   executable (written into kernel.json by the registration tool)
//! - `SWIFT_BUILD_PATH` / `SWIFT_PACKAGE_PATH`: external builder and
//!   package-tool executables
//! - `LD_LIBRARY_PATH`: prepended to the REPL's dynamic-library search
//!   path at launch
//! - `SWIFT_JUPYTER_BUILD_TIMEOUT`: package build budget in seconds
//!   (default 600)

use sjk_install::InstallConfig;
use std::path::{Path, PathBuf};

/// Default cap on `%timeit` iterations.
const DEFAULT_TIMEIT_MAX: u32 = 100;

/// Process-wide kernel configuration, composed once at startup.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Path to the pre-built Swift REPL executable.
    pub repl_path: Option<PathBuf>,
    /// Dynamic-library search path prepended at REPL launch.
    pub ld_library_path: Option<String>,
    /// Directories searched by `%include`.
    pub include_dirs: Vec<PathBuf>,
    /// Installer options.
    pub install: InstallConfig,
    /// Upper bound on `%timeit` iterations.
    pub timeit_max_iterations: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            repl_path: None,
            ld_library_path: None,
            include_dirs: Vec::new(),
            install: InstallConfig::default(),
            timeit_max_iterations: DEFAULT_TIMEIT_MAX,
        }
    }
}

impl KernelConfig {
    /// Loads configuration from the environment.
    ///
    /// `%include` searches the kernel executable's directory, then the
    /// working directory.
    #[must_use]
    pub fn from_env() -> Self {
        let mut include_dirs = Vec::new();
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                include_dirs.push(dir.to_path_buf());
            }
        }
        if let Ok(cwd) = std::env::current_dir() {
            include_dirs.push(cwd);
        }

        Self {
            repl_path: std::env::var_os("REPL_SWIFT_PATH").map(PathBuf::from),
            ld_library_path: std::env::var("LD_LIBRARY_PATH").ok(),
            include_dirs,
            install: InstallConfig::from_env(),
            timeit_max_iterations: DEFAULT_TIMEIT_MAX,
        }
    }
}

/// Search-path, linkage, and environment state accumulated from the
/// `%swift_*` magic family. Applied at REPL launch and merged into
/// builder invocations.
#[derive(Debug, Clone, Default)]
pub struct SetupState {
    /// Prepended to the dynamic loader search path.
    pub library_paths: Vec<PathBuf>,
    /// Prepended to the Swift module search path.
    pub module_paths: Vec<PathBuf>,
    /// Prepended to the framework search path (Darwin only).
    pub framework_paths: Vec<PathBuf>,
    /// Symbols that must resolve after subsequent loads
    /// (`%swift_link`).
    pub linked_symbols: Vec<String>,
    /// Extra compiler flags forwarded to the builder
    /// (`%swift_flags`).
    pub extra_flags: Vec<String>,
    /// Environment overrides (`%swift_env`).
    pub env: Vec<(String, String)>,
}

impl SetupState {
    /// Applies the composite `%swiftir_setup` convention: library,
    /// module, and framework paths rooted at one toolchain directory.
    pub fn apply_ir_root(&mut self, root: &Path) {
        self.library_paths.insert(0, root.join("lib"));
        self.module_paths.insert(0, root.join("modules"));
        if cfg!(target_os = "macos") {
            self.framework_paths.insert(0, root.join("frameworks"));
        }
    }

    /// Summary rendered by `%swift_config`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::from("Accumulated Swift setup:\n");
        let path_list = |paths: &[PathBuf]| {
            if paths.is_empty() {
                "(none)".to_string()
            } else {
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            }
        };
        out.push_str(&format!("  library paths:   {}\n", path_list(&self.library_paths)));
        out.push_str(&format!("  module paths:    {}\n", path_list(&self.module_paths)));
        out.push_str(&format!(
            "  framework paths: {}\n",
            path_list(&self.framework_paths)
        ));
        out.push_str(&format!(
            "  linked symbols:  {}\n",
            if self.linked_symbols.is_empty() {
                "(none)".to_string()
            } else {
                self.linked_symbols.join(", ")
            }
        ));
        out.push_str(&format!(
            "  compiler flags:  {}\n",
            if self.extra_flags.is_empty() {
                "(none)".to_string()
            } else {
                self.extra_flags.join(" ")
            }
        ));
        for (name, value) in &self.env {
            out.push_str(&format!("  env:             {name}={value}\n"));
        }
        out
    }
}
