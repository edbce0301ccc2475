//! The five-phase package installer.

use crate::manifest;
use crate::{InstallConfig, InstallError};
use sjk_types::{InstalledPackage, PackageRequest};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Receives per-phase progress and raw builder output.
///
/// The kernel maps phases to `[N/5]` stream messages so long-running
/// builds stay visible in the notebook.
pub trait InstallReporter {
    fn phase(&mut self, step: u8, message: &str);
    fn output(&mut self, line: &str);
}

/// Loads a shared library into the running REPL process.
///
/// Implemented by the kernel over the REPL supervisor: the load is an
/// in-process `dlopen` evaluated inside the REPL, so the library's
/// symbols become visible to subsequent `import` statements.
pub trait ModuleLoader {
    fn load_library(&mut self, path: &Path) -> Result<(), String>;
}

/// Everything collected from one cell's install-class directives.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub packages: Vec<PackageRequest>,
    pub swiftpm_flags: Vec<String>,
    pub extra_include_commands: Vec<String>,
    pub install_location: Option<PathBuf>,
}

impl InstallRequest {
    /// Whether the request carries any install-class work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.swiftpm_flags.is_empty()
            && self.extra_include_commands.is_empty()
            && self.install_location.is_none()
    }
}

/// Synthesizes, builds, relocates, and loads Swift packages at
/// runtime.
pub struct PackageInstaller {
    config: InstallConfig,
    records: HashMap<String, InstalledPackage>,
}

impl PackageInstaller {
    #[must_use]
    pub fn new(config: InstallConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut InstallConfig {
        &mut self.config
    }

    /// Installed-package records keyed by product name.
    #[must_use]
    pub fn records(&self) -> &HashMap<String, InstalledPackage> {
        &self.records
    }

    /// Runs the five-phase install protocol.
    ///
    /// `executed_any` enforces the ordering invariant: once any Swift
    /// source has been successfully evaluated, installs are rejected.
    /// A failed install leaves no record and does not affect
    /// previously installed packages; already-loaded libraries remain
    /// loaded.
    pub fn install(
        &mut self,
        request: &InstallRequest,
        executed_any: bool,
        reporter: &mut dyn InstallReporter,
        loader: &mut dyn ModuleLoader,
    ) -> Result<Vec<String>, InstallError> {
        if request.packages.is_empty() {
            return Ok(Vec::new());
        }
        if executed_any {
            return Err(InstallError::OrderingViolation);
        }
        let swift_build = self
            .config
            .swift_build_path
            .clone()
            .ok_or(InstallError::MissingConfig("SWIFT_BUILD_PATH"))?;

        if let Some(location) = &request.install_location {
            self.config.set_build_root(location);
        }
        let package_base = self.config.package_base_dir();
        let modules_dir = self.config.modules_dir();
        let libs_dir = self.config.libs_dir();
        for dir in [&package_base, &modules_dir, &libs_dir] {
            std::fs::create_dir_all(dir).map_err(|err| {
                InstallError::ArtifactCopyFailure(format!("{}: {err}", dir.display()))
            })?;
        }

        reporter.output(&format!(
            "Installing packages:\n{}",
            manifest::describe(&request.packages)
        ));
        if !request.swiftpm_flags.is_empty() {
            reporter.output(&format!("SwiftPM flags: {:?}\n", request.swiftpm_flags));
        }

        let include_dirs = resolve_extra_includes(request, reporter)?;

        // Phase 1: manifest synthesis.
        reporter.phase(1, "Creating Package.swift");
        let manifest_text = manifest::render(&request.packages);
        std::fs::write(package_base.join("Package.swift"), &manifest_text)
            .map_err(|err| InstallError::ArtifactCopyFailure(err.to_string()))?;
        std::fs::write(
            package_base.join(manifest::DUMMY_SOURCE),
            manifest::dummy_source(),
        )
        .map_err(|err| InstallError::ArtifactCopyFailure(err.to_string()))?;

        // Phases 2+3: fetch, resolve, build - one builder invocation
        // under a shared wall-clock budget.
        reporter.phase(2, "Resolving and fetching dependencies (this may take a while)");
        reporter.phase(3, "Building packages");
        let started = Instant::now();
        let status =
            self.run_builder(&swift_build, &request.swiftpm_flags, &package_base, reporter)?;

        let bin_dir = self
            .bin_path(&swift_build, &request.swiftpm_flags, &package_base)
            .unwrap_or_else(|| package_base.join(".build").join("debug"));
        let build_db_present = [
            bin_dir.parent().map(|parent| parent.join("build.db")),
            Some(package_base.join(".build").join("build.db")),
        ]
        .into_iter()
        .flatten()
        .any(|candidate| candidate.exists());

        if !status.success() {
            let mut message = format!(
                "swift-build returned nonzero exit code {}",
                status
                    .code()
                    .map_or_else(|| "?".to_string(), |c| c.to_string())
            );
            if build_db_present {
                message.push_str(" (the build ran but resolved no artifacts)");
            }
            return Err(InstallError::BuildFailure(message));
        }
        if !build_db_present {
            return Err(InstallError::BuildFailure(
                "build.db is missing from the build directory; the build may have failed silently"
                    .to_string(),
            ));
        }
        reporter.output(&format!(
            "Build completed in {:.1}s\n",
            started.elapsed().as_secs_f64()
        ));

        // Phase 4: artifact copy.
        reporter.phase(4, "Copying Swift modules");
        let fingerprint = copy_artifacts(&package_base, &modules_dir)?;

        // Phase 5: dynamic load.
        reporter.phase(5, "Loading packages into the Swift REPL");
        let lib_name = format!("lib{}{}", manifest::PACKAGE_NAME, InstallConfig::lib_suffix());
        let built_lib = bin_dir.join(&lib_name);
        if !built_lib.exists() {
            return Err(InstallError::LoadFailure(format!(
                "expected shared library {} was not produced",
                built_lib.display()
            )));
        }
        let loaded_lib = libs_dir.join(&lib_name);
        std::fs::copy(&built_lib, &loaded_lib)
            .map_err(|err| InstallError::ArtifactCopyFailure(err.to_string()))?;
        loader
            .load_library(&loaded_lib)
            .map_err(InstallError::LoadFailure)?;

        // Only now, with every phase complete, store the records.
        let mut products = Vec::new();
        for package in &request.packages {
            for product in &package.products {
                self.records.insert(
                    product.clone(),
                    InstalledPackage {
                        request: package.clone(),
                        fingerprint,
                        libraries: vec![loaded_lib.clone()],
                        include_dirs: include_dirs.clone(),
                    },
                );
                products.push(product.clone());
            }
        }
        info!(products = ?products, "package install complete");
        reporter.output(&format!(
            "Successfully installed: {}\n",
            products.join(", ")
        ));
        Ok(products)
    }

    /// Spawns the builder, streams its merged output, and enforces the
    /// build budget. On timeout the child is killed.
    fn run_builder(
        &self,
        swift_build: &Path,
        flags: &[String],
        package_base: &Path,
        reporter: &mut dyn InstallReporter,
    ) -> Result<ExitStatus, InstallError> {
        let mut child = Command::new(swift_build)
            .args(flags)
            .current_dir(package_base)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| InstallError::BuildFailure(format!("could not spawn builder: {err}")))?;

        let (line_tx, line_rx) = mpsc::channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            std::thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let budget = self.config.build_timeout;
        let deadline = Instant::now() + budget;
        loop {
            match line_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(line) => reporter.output(&line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if Instant::now() >= deadline {
                return Err(self.kill_on_timeout(&mut child, budget));
            }
            if let Ok(Some(status)) = child.try_wait() {
                while let Ok(line) = line_rx.try_recv() {
                    reporter.output(&line);
                }
                return Ok(status);
            }
        }

        // Output streams closed; wait for exit within the budget.
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Err(self.kill_on_timeout(&mut child, budget));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    return Err(InstallError::BuildFailure(format!(
                        "builder wait failed: {err}"
                    )))
                }
            }
        }
    }

    fn kill_on_timeout(&self, child: &mut std::process::Child, budget: Duration) -> InstallError {
        warn!(seconds = budget.as_secs(), "builder exceeded budget; killing");
        let _ = child.kill();
        let _ = child.wait();
        InstallError::Timeout {
            seconds: budget.as_secs(),
        }
    }

    /// Asks the builder where its products landed.
    fn bin_path(
        &self,
        swift_build: &Path,
        flags: &[String],
        package_base: &Path,
    ) -> Option<PathBuf> {
        let output = Command::new(swift_build)
            .arg("--show-bin-path")
            .args(flags)
            .current_dir(package_base)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

/// Runs each `%install-extra-include-command`, parsing its stdout as
/// `-I` include flags.
fn resolve_extra_includes(
    request: &InstallRequest,
    reporter: &mut dyn InstallReporter,
) -> Result<Vec<PathBuf>, InstallError> {
    let mut include_dirs = Vec::new();
    for command in &request.extra_include_commands {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|err| InstallError::BadSpec(format!("{command}: {err}")))?;
        if !output.status.success() {
            return Err(InstallError::BadSpec(format!(
                "extra-include command returned nonzero exit code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        for token in String::from_utf8_lossy(&output.stdout).split_whitespace() {
            match token.strip_prefix("-I") {
                Some(dir) if !dir.is_empty() => include_dirs.push(PathBuf::from(dir)),
                _ => {
                    warn!(token, "ignoring non -I output from extra-include command");
                    reporter.output(&format!(
                        "warning: ignoring non -I output from extra-include command: {token}\n"
                    ));
                }
            }
        }
    }
    Ok(include_dirs)
}

/// Copies freshly produced module artifacts into the module search
/// path. Existing files are overwritten; any error aborts the install.
fn copy_artifacts(package_base: &Path, modules_dir: &Path) -> Result<u64, InstallError> {
    let mut fingerprint = 0u64;
    for entry in WalkDir::new(package_base.join(".build"))
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let is_module_artifact = [".swiftmodule", ".swiftdoc", ".swiftinterface"]
            .iter()
            .any(|suffix| file_name.ends_with(suffix));

        if is_module_artifact {
            let dest = modules_dir.join(file_name);
            let copied = std::fs::copy(path, &dest)
                .map_err(|err| InstallError::ArtifactCopyFailure(format!("{file_name}: {err}")))?;
            fingerprint = fingerprint.wrapping_add(copied);
            debug!(artifact = file_name, "copied module artifact");
        } else if file_name == "module.modulemap" {
            relocate_modulemap(path, modules_dir)?;
        }
    }
    Ok(fingerprint)
}

/// Relocates a `module.modulemap` into its own directory under the
/// module search path, making relative header paths absolute (the
/// file moves, its headers do not).
fn relocate_modulemap(path: &Path, modules_dir: &Path) -> Result<(), InstallError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| InstallError::ArtifactCopyFailure(format!("modulemap: {err}")))?;
    let base = path.parent().unwrap_or(Path::new("."));
    let rewritten = absolutize_headers(&contents, base);
    let module_name = parse_module_name(&rewritten).unwrap_or_else(|| "unnamed".to_string());

    // One directory per module: the importer requires every map to be
    // named module.modulemap, and repeated installs must not shadow
    // each other.
    let dest_dir = modules_dir.join(format!("modulemap-{module_name}"));
    std::fs::create_dir_all(&dest_dir)
        .map_err(|err| InstallError::ArtifactCopyFailure(err.to_string()))?;
    std::fs::write(dest_dir.join("module.modulemap"), rewritten)
        .map_err(|err| InstallError::ArtifactCopyFailure(err.to_string()))?;
    Ok(())
}

/// Rewrites relative `header "..."` paths against `base`.
fn absolutize_headers(contents: &str, base: &Path) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        let rewritten = match line.find("header \"") {
            Some(index) => {
                let start = index + "header \"".len();
                match line[start..].find('"') {
                    Some(len) => {
                        let header = &line[start..start + len];
                        if Path::new(header).is_absolute() {
                            line.to_string()
                        } else {
                            format!(
                                "{}{}{}",
                                &line[..start],
                                base.join(header).display(),
                                &line[start + len..]
                            )
                        }
                    }
                    None => line.to_string(),
                }
            }
            None => line.to_string(),
        };
        out.push_str(&rewritten);
        out.push('\n');
    }
    out
}

/// Extracts the module name from modulemap contents.
fn parse_module_name(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("module ") {
            let name = rest.split_whitespace().next()?;
            return Some(name.trim_end_matches('{').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingReporter {
        phases: Vec<(u8, String)>,
        output: Vec<String>,
    }

    impl InstallReporter for RecordingReporter {
        fn phase(&mut self, step: u8, message: &str) {
            self.phases.push((step, message.to_string()));
        }

        fn output(&mut self, line: &str) {
            self.output.push(line.to_string());
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        loaded: Vec<PathBuf>,
        fail: bool,
    }

    impl ModuleLoader for FakeLoader {
        fn load_library(&mut self, path: &Path) -> Result<(), String> {
            if self.fail {
                return Err("undefined symbol: _foo".to_string());
            }
            self.loaded.push(path.to_path_buf());
            Ok(())
        }
    }

    fn request() -> InstallRequest {
        InstallRequest {
            packages: vec![PackageRequest {
                spec: ".package(path: \"/tmp/F\")".into(),
                products: vec!["F".into()],
            }],
            ..Default::default()
        }
    }

    #[cfg(unix)]
    fn write_stub_builder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("swift-build");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    fn good_builder_body() -> String {
        format!(
            r#"if [ "$1" = "--show-bin-path" ]; then
  echo "$PWD/.build/debug"
  exit 0
fi
mkdir -p .build/debug
echo ok > .build/build.db
echo mod > .build/debug/F.swiftmodule
echo doc > .build/debug/F.swiftdoc
printf 'module F {{ header "F.h" }}\n' > .build/debug/module.modulemap
echo lib > ".build/debug/lib{}{}"
echo "Build complete!"
"#,
            manifest::PACKAGE_NAME,
            InstallConfig::lib_suffix()
        )
    }

    #[cfg(unix)]
    fn installer_with_builder(root: &Path, builder_body: &str) -> PackageInstaller {
        let builder = write_stub_builder(root, builder_body);
        let mut config = InstallConfig::default();
        config.set_build_root(root.join("cache"));
        config.swift_build_path = Some(builder);
        PackageInstaller::new(config)
    }

    #[test]
    fn empty_request_is_a_noop() {
        let mut installer = PackageInstaller::new(InstallConfig::default());
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();
        let products = installer
            .install(&InstallRequest::default(), false, &mut reporter, &mut loader)
            .unwrap();
        assert!(products.is_empty());
        assert!(reporter.phases.is_empty());
    }

    #[test]
    fn install_after_execution_is_rejected() {
        let mut installer = PackageInstaller::new(InstallConfig::default());
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();
        let err = installer
            .install(&request(), true, &mut reporter, &mut loader)
            .unwrap_err();
        assert!(matches!(err, InstallError::OrderingViolation));
    }

    #[test]
    fn missing_builder_path_is_missing_config() {
        let mut installer = PackageInstaller::new(InstallConfig::default());
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();
        let err = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::MissingConfig("SWIFT_BUILD_PATH")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn successful_install_runs_five_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = installer_with_builder(dir.path(), &good_builder_body());
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();

        let products = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap();

        assert_eq!(products, vec!["F".to_string()]);
        let steps: Vec<u8> = reporter.phases.iter().map(|(step, _)| *step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert!(reporter.output.iter().any(|l| l.contains("Build complete!")));

        // Artifacts relocated and library loaded.
        let modules = installer.config().modules_dir();
        assert!(modules.join("F.swiftmodule").exists());
        assert!(modules
            .join("modulemap-F")
            .join("module.modulemap")
            .exists());
        assert_eq!(loader.loaded.len(), 1);
        assert!(loader.loaded[0].starts_with(installer.config().libs_dir()));
        assert!(installer.records().contains_key("F"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer =
            installer_with_builder(dir.path(), "echo 'error: no such package'\nexit 1\n");
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();

        let err = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap_err();
        assert!(matches!(err, InstallError::BuildFailure(_)));
        assert!(installer.records().is_empty());
        assert!(reporter
            .output
            .iter()
            .any(|l| l.contains("no such package")));
    }

    #[cfg(unix)]
    #[test]
    fn missing_build_db_after_success_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = installer_with_builder(dir.path(), "mkdir -p .build/debug\nexit 0\n");
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();

        let err = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap_err();
        match err {
            InstallError::BuildFailure(message) => assert!(message.contains("build.db")),
            other => panic!("expected build failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_builder() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = installer_with_builder(dir.path(), "sleep 30\n");
        installer.config_mut().build_timeout = Duration::from_millis(200);
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader::default();

        let start = Instant::now();
        let err = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap_err();
        assert!(matches!(err, InstallError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn load_failure_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = installer_with_builder(dir.path(), &good_builder_body());
        let mut reporter = RecordingReporter::default();
        let mut loader = FakeLoader {
            fail: true,
            ..Default::default()
        };

        let err = installer
            .install(&request(), false, &mut reporter, &mut loader)
            .unwrap_err();
        assert!(matches!(err, InstallError::LoadFailure(_)));
        assert!(installer.records().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn extra_include_commands_yield_include_dirs() {
        let mut reporter = RecordingReporter::default();
        let request = InstallRequest {
            extra_include_commands: vec!["echo -I/usr/include/foo -I/opt/bar stray".to_string()],
            ..Default::default()
        };
        let dirs = resolve_extra_includes(&request, &mut reporter).unwrap();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/include/foo"),
                PathBuf::from("/opt/bar")
            ]
        );
        // The stray token is reported, not fatal.
        assert!(reporter.output.iter().any(|l| l.contains("stray")));
    }

    #[test]
    fn absolutize_rewrites_relative_headers_only() {
        let contents = "module F {\n  header \"F.h\"\n  header \"/abs/G.h\"\n}\n";
        let out = absolutize_headers(contents, Path::new("/src/pkg"));
        assert!(out.contains("header \"/src/pkg/F.h\""));
        assert!(out.contains("header \"/abs/G.h\""));
    }

    #[test]
    fn module_name_parsing() {
        assert_eq!(
            parse_module_name("module CFoo [system] {\n}").as_deref(),
            Some("CFoo")
        );
        assert_eq!(parse_module_name("module Bar{\n}").as_deref(), Some("Bar"));
        assert!(parse_module_name("// nothing").is_none());
    }
}
