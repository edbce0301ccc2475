//! Runtime package installation for the SJK Swift kernel.
//!
//! The Swift REPL cannot resolve external packages on its own.
//! Installing one while the kernel is alive means:
//!
//! 1. synthesize a throwaway package that depends on everything the
//!    user requested ([`manifest`]),
//! 2. build it out of process with the external Swift package builder,
//! 3. verify the builder actually ran (its `build.db`),
//! 4. lift the fresh `.swiftmodule`/`.swiftdoc`/`.swiftinterface` and
//!    `module.modulemap` artifacts into a search path the REPL was
//!    configured with at startup,
//! 5. dynamically load the produced shared library into the running
//!    process so its symbols resolve.
//!
//! Each phase emits a progress message through [`InstallReporter`] so
//! long builds stay visible. Steps 2 and 3 share a wall-clock budget.
//!
//! Installs are rejected once any Swift source has been successfully
//! evaluated in the session: the synthetic build copies flags and
//! module search paths the REPL receives only at startup, and mixing
//! orders produces symbol aliasing and inconsistent linkage.

mod config;
mod error;
pub mod manifest;

mod installer;

pub use config::InstallConfig;
pub use error::InstallError;
pub use installer::{InstallReporter, InstallRequest, ModuleLoader, PackageInstaller};
