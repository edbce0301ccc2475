//! The session composition root.
//!
//! One [`Session`] exists per kernel process. It owns the debugger
//! backend, the (lazily launched) REPL supervisor, the package
//! installer, the execution counter, the cell history, and the
//! best-effort declaration tracker. Helper threads and the control
//! channel share only the bridge handles; everything else is mutated
//! exclusively from the shell event loop.

use crate::config::{KernelConfig, SetupState};
use crate::preprocess;
use serde_json::{Map, Value};
use sjk_install::{InstallError, InstallReporter, InstallRequest, ModuleLoader, PackageInstaller};
use sjk_protocol::{
    CompleteReply, ErrorContent, ExecuteReply, ExecuteRequest, ExecuteResult, Header, HelpLink,
    IoPubSession, KernelInfoReply, LanguageInfo, ReplyStatus, StreamName, PROTOCOL_VERSION,
};
use sjk_repl::debugger::{DebuggerBackend, LaunchSpec};
use sjk_repl::{BridgeHandles, ExecutionGuard, ReplSupervisor};
use sjk_types::{Cell, Diagnostic, ExecutionOutcome, PackageRequest, ValueDescription};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One retained cell submission.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub number: u32,
    pub code: String,
}

/// Process-wide kernel state.
pub struct Session {
    config: KernelConfig,
    backend: Box<dyn DebuggerBackend>,
    bridge: BridgeHandles,
    supervisor: Option<ReplSupervisor>,
    installer: PackageInstaller,
    setup: SetupState,
    execution_count: u32,
    executed_any: bool,
    launch_failed: bool,
    completion_enabled: bool,
    history: Vec<HistoryEntry>,
    declarations: Vec<(String, String)>,
    sticky_swiftpm_flags: Vec<String>,
    sticky_include_commands: Vec<String>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: KernelConfig,
        backend: Box<dyn DebuggerBackend>,
        bridge: BridgeHandles,
    ) -> Self {
        let installer = PackageInstaller::new(config.install.clone());
        Self {
            config,
            backend,
            bridge,
            supervisor: None,
            installer,
            setup: SetupState::default(),
            execution_count: 0,
            executed_any: false,
            launch_failed: false,
            completion_enabled: true,
            history: Vec::new(),
            declarations: Vec::new(),
            sticky_swiftpm_flags: Vec::new(),
            sticky_include_commands: Vec::new(),
        }
    }

    // === Accessors used by the adapter and the magic handlers ===

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn declarations(&self) -> &[(String, String)] {
        &self.declarations
    }

    #[must_use]
    pub fn guard(&self) -> Arc<ExecutionGuard> {
        Arc::clone(&self.bridge.guard)
    }

    #[must_use]
    pub fn bridge(&self) -> &BridgeHandles {
        &self.bridge
    }

    #[must_use]
    pub fn repl_started(&self) -> bool {
        self.supervisor.is_some()
    }

    #[must_use]
    pub fn executed_any(&self) -> bool {
        self.executed_any
    }

    #[must_use]
    pub fn completion_enabled(&self) -> bool {
        self.completion_enabled
    }

    pub fn set_completion_enabled(&mut self, enabled: bool) {
        self.completion_enabled = enabled;
    }

    pub fn setup_mut(&mut self) -> &mut SetupState {
        &mut self.setup
    }

    #[must_use]
    pub fn setup(&self) -> &SetupState {
        &self.setup
    }

    #[must_use]
    pub fn installer(&self) -> &PackageInstaller {
        &self.installer
    }

    pub fn add_sticky_swiftpm_flags(&mut self, flags: &[String]) {
        self.sticky_swiftpm_flags.extend(flags.iter().cloned());
    }

    pub fn add_sticky_include_command(&mut self, command: &str) {
        self.sticky_include_commands.push(command.to_string());
    }

    pub fn set_install_location(&mut self, location: &Path) {
        self.installer.config_mut().set_build_root(location);
    }

    // === Stream helpers ===

    pub fn stream_stdout(&self, header: &Header, text: &str) {
        self.bridge
            .iopub
            .stream(StreamName::Stdout, text, Some(header));
    }

    pub fn stream_stderr(&self, header: &Header, text: &str) {
        self.bridge
            .iopub
            .stream(StreamName::Stderr, text, Some(header));
    }

    fn publish_error(&self, header: &Header, diagnostic: &Diagnostic) {
        self.bridge.iopub.error(
            &ErrorContent {
                ename: diagnostic.name.clone(),
                evalue: diagnostic.message.clone(),
                traceback: diagnostic.traceback(),
            },
            Some(header),
        );
    }

    fn error_reply(&self, diagnostic: &Diagnostic) -> ExecuteReply {
        ExecuteReply::error(
            self.execution_count,
            diagnostic.name.clone(),
            diagnostic.message.clone(),
            diagnostic.traceback(),
        )
    }

    // === Shell handlers (invoked with the session locked) ===

    /// Handles one `execute_request` end to end.
    pub fn handle_execute(&mut self, header: &Header, request: ExecuteRequest) -> ExecuteReply {
        // Empty cells reply ok without initializing Swift, so a user
        // still gets to `%install` afterwards.
        if request.code.trim().is_empty() {
            return ExecuteReply::ok(self.execution_count);
        }

        if !request.silent {
            self.execution_count += 1;
        }
        let cell = Cell::new(self.execution_count, request.code.as_str());

        if request.store_history && !request.code.trim_start().starts_with('%') {
            self.history.push(HistoryEntry {
                number: self.execution_count,
                code: request.code.clone(),
            });
        }

        let mut cell = cell;
        let pre = match preprocess::run(self, header, &mut cell) {
            Ok(pre) => pre,
            Err(diagnostic) => {
                self.publish_error(header, &diagnostic);
                return self.error_reply(&diagnostic);
            }
        };

        if !pre.packages.is_empty() {
            if let Err(err) = self.handle_install(header, pre.packages) {
                let diagnostic = err.diagnostic();
                self.publish_error(header, &diagnostic);
                return self.error_reply(&diagnostic);
            }
        }

        if pre.handled || pre.source.trim().is_empty() {
            return ExecuteReply::ok(self.execution_count);
        }

        let outcome = self.execute_swift(&cell, &pre.source);
        self.reply_for_outcome(header, outcome, request.silent)
    }

    fn reply_for_outcome(
        &mut self,
        header: &Header,
        outcome: ExecutionOutcome,
        silent: bool,
    ) -> ExecuteReply {
        match outcome {
            ExecutionOutcome::SuccessWithValue(value) => {
                if !silent {
                    self.publish_value(header, &value);
                }
                ExecuteReply::ok(self.execution_count)
            }
            ExecutionOutcome::SuccessWithoutValue => ExecuteReply::ok(self.execution_count),
            ExecutionOutcome::PreprocessorError(diagnostic)
            | ExecutionOutcome::CompileError(diagnostic)
            | ExecutionOutcome::RuntimeError { diagnostic, .. } => {
                self.publish_error(header, &diagnostic);
                self.error_reply(&diagnostic)
            }
            ExecutionOutcome::Interrupted => {
                let diagnostic =
                    Diagnostic::error("ExecutionInterrupted", "execution was interrupted");
                self.publish_error(header, &diagnostic);
                self.error_reply(&diagnostic)
            }
        }
    }

    fn publish_value(&self, header: &Header, value: &ValueDescription) {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), Value::String(value.summary.clone()));
        if let Some(html) = &value.html {
            data.insert("text/html".to_string(), Value::String(html.clone()));
        }
        self.bridge.iopub.execute_result(
            &ExecuteResult {
                execution_count: self.execution_count,
                data,
                metadata: Map::new(),
            },
            Some(header),
        );
    }

    /// Handles a `complete_request`. Positions are Unicode code
    /// points.
    pub fn handle_complete(&mut self, code: &str, cursor_pos: usize) -> CompleteReply {
        if self.bridge.guard.is_executing() || !self.completion_enabled {
            return CompleteReply::empty(cursor_pos);
        }
        // Completion never launches the REPL: doing so would burn the
        // session's install window on a tab-press.
        let Some(supervisor) = self.supervisor.as_mut() else {
            return CompleteReply::empty(cursor_pos);
        };

        let chars: Vec<char> = code.chars().collect();
        let pos = cursor_pos.min(chars.len());
        let prefix: String = chars[..pos].iter().collect();

        let completion = supervisor.complete(&prefix);
        let common = completion.common_prefix.chars().count().min(pos);
        let mut metadata = Map::new();
        metadata.insert(
            "display_matches".to_string(),
            Value::Array(
                completion
                    .matches
                    .iter()
                    .map(|m| Value::String(m.display.clone()))
                    .collect(),
            ),
        );
        CompleteReply {
            status: ReplyStatus::Ok,
            matches: completion
                .matches
                .into_iter()
                .map(|m| m.insertion)
                .collect(),
            cursor_start: pos - common,
            cursor_end: pos,
            metadata,
        }
    }

    /// Builds the `kernel_info_reply`.
    pub fn handle_kernel_info(&mut self) -> KernelInfoReply {
        let version = probe_swift_version_output()
            .as_deref()
            .and_then(parse_swift_version)
            .unwrap_or_else(|| "unknown".to_string());
        KernelInfoReply {
            status: ReplyStatus::Ok,
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: "sjk".to_string(),
            implementation_version: version.clone(),
            language_info: LanguageInfo {
                name: "swift".to_string(),
                version: version.clone(),
                mimetype: "text/x-swift".to_string(),
                file_extension: ".swift".to_string(),
                pygments_lexer: "swift".to_string(),
                codemirror_mode: "swift".to_string(),
            },
            banner: format!("Swift {version} - SJK kernel"),
            help_links: vec![HelpLink {
                text: "Swift Documentation".to_string(),
                url: "https://docs.swift.org".to_string(),
            }],
        }
    }

    /// Terminates the debugger session and helper threads.
    pub fn shutdown(&mut self) {
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.shutdown();
        }
    }

    // === Swift execution ===

    /// Evaluates residual Swift through the supervisor, tracking
    /// session effects of successful cells.
    pub fn execute_swift(&mut self, cell: &Cell, source: &str) -> ExecutionOutcome {
        if let Err(diagnostic) = self.ensure_repl() {
            return ExecutionOutcome::RuntimeError {
                diagnostic,
                process_lost: true,
            };
        }
        let Some(supervisor) = self.supervisor.as_mut() else {
            return ExecutionOutcome::RuntimeError {
                diagnostic: startup_failure_diagnostic("supervisor unavailable"),
                process_lost: true,
            };
        };
        let outcome = supervisor.execute(cell, source);
        if outcome.is_success() {
            self.executed_any = true;
            self.track_declarations(source);
        }
        outcome
    }

    /// Launches the REPL if it is not already running.
    ///
    /// A failed launch leaves the kernel up: every subsequent
    /// execution returns the startup diagnostic until `%reset`.
    fn ensure_repl(&mut self) -> Result<(), Diagnostic> {
        if self.supervisor.is_some() {
            return Ok(());
        }
        if self.launch_failed {
            return Err(startup_failure_diagnostic("previous launch attempt failed"));
        }
        let Some(repl_path) = self.config.repl_path.clone() else {
            self.launch_failed = true;
            return Err(startup_failure_diagnostic("REPL_SWIFT_PATH is not set"));
        };

        let spec = self.launch_spec(repl_path);
        match ReplSupervisor::launch(self.backend.as_ref(), &spec, self.bridge.clone()) {
            Ok(supervisor) => {
                info!("Swift REPL launched");
                self.supervisor = Some(supervisor);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "REPL launch failed; kernel degraded");
                self.launch_failed = true;
                Err(startup_failure_diagnostic(&err.to_string()))
            }
        }
    }

    fn launch_spec(&self, repl_path: PathBuf) -> LaunchSpec {
        let mut module_search_paths = vec![self.installer.config().modules_dir()];
        module_search_paths.extend(self.setup.module_paths.iter().cloned());

        LaunchSpec {
            repl_path,
            arch: std::env::consts::ARCH.to_string(),
            env: self.launch_env(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            module_search_paths,
        }
    }

    /// Child environment: the session environment minus the kernel's
    /// own bootstrap variable, with the dynamic-library search path
    /// and `%swift_env` overrides applied.
    fn launch_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| key != "REPL_SWIFT_PATH")
            .collect();

        let lib_key = if cfg!(target_os = "macos") {
            "DYLD_LIBRARY_PATH"
        } else {
            "LD_LIBRARY_PATH"
        };
        let mut parts: Vec<String> = self
            .setup
            .library_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if let Some(base) = &self.config.ld_library_path {
            parts.push(base.clone());
        } else if let Some((_, existing)) = env.iter().find(|(key, _)| key == lib_key) {
            parts.push(existing.clone());
        }
        if !parts.is_empty() {
            upsert(&mut env, lib_key, &parts.join(":"));
        }

        for (name, value) in &self.setup.env {
            upsert(&mut env, name, value);
        }
        env
    }

    fn track_declarations(&mut self, source: &str) {
        for line in source.lines() {
            let trimmed = line.trim_start();
            let mut tokens = trimmed.split_whitespace();
            let Some(first) = tokens.next() else { continue };
            if !matches!(first, "let" | "var" | "func" | "struct" | "class") {
                continue;
            }
            let Some(token) = tokens.next() else { continue };
            let name: String = token
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if name.is_empty() {
                continue;
            }
            if !self.declarations.iter().any(|(_, n)| n == &name) {
                self.declarations.push((first.to_string(), name));
            }
        }
    }

    // === Install flow ===

    /// Runs the installer for the packages extracted from one cell.
    ///
    /// Flags and extra-include commands accumulate across cells; the
    /// per-cell packages are handed over here.
    fn handle_install(
        &mut self,
        header: &Header,
        packages: Vec<PackageRequest>,
    ) -> Result<Vec<String>, InstallError> {
        let mut swiftpm_flags = self.sticky_swiftpm_flags.clone();
        swiftpm_flags.extend(self.setup.extra_flags.iter().cloned());
        let request = InstallRequest {
            packages,
            swiftpm_flags,
            extra_include_commands: self.sticky_include_commands.clone(),
            install_location: None,
        };
        let executed = self.executed_any;

        // The loader needs the session (to launch the REPL and dlopen
        // inside it), so the installer steps out for the duration.
        let config = self.installer.config().clone();
        let mut installer = std::mem::replace(&mut self.installer, PackageInstaller::new(config));
        let mut reporter = StreamReporter {
            iopub: Arc::clone(&self.bridge.iopub),
            parent: header.clone(),
        };
        let result = {
            let mut loader = SessionLoader { session: self };
            installer.install(&request, executed, &mut reporter, &mut loader)
        };
        self.installer = installer;

        if matches!(&result, Ok(products) if !products.is_empty()) {
            self.verify_linked_symbols(header);
        }
        result
    }

    /// Best-effort `%swift_link` check after a load.
    fn verify_linked_symbols(&mut self, header: &Header) {
        let symbols = self.setup.linked_symbols.clone();
        let mut unresolved = Vec::new();
        if let Some(supervisor) = self.supervisor.as_mut() {
            for symbol in symbols {
                match supervisor.verify_symbol(&symbol) {
                    Ok(true) => {}
                    Ok(false) => unresolved.push(symbol),
                    Err(err) => {
                        warn!(%symbol, %err, "symbol verification failed");
                    }
                }
            }
        }
        for symbol in unresolved {
            self.stream_stderr(
                header,
                &format!("warning: linked symbol '{symbol}' did not resolve\n"),
            );
        }
    }

    // === Reset ===

    /// Discards the Swift process and resets the counter. History is
    /// preserved; installs become possible again.
    pub fn reset(&mut self) {
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.shutdown();
        }
        self.execution_count = 0;
        self.executed_any = false;
        self.launch_failed = false;
        self.declarations.clear();
    }
}

fn upsert(env: &mut Vec<(String, String)>, key: &str, value: &str) {
    match env.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value.to_string(),
        None => env.push((key.to_string(), value.to_string())),
    }
}

fn startup_failure_diagnostic(detail: &str) -> Diagnostic {
    Diagnostic::error(
        "ReplStartupError",
        format!("Could not start the Swift REPL: {detail}"),
    )
    .with_hint("Tip: the kernel may not be registered correctly.")
    .with_hint("   - Check REPL_SWIFT_PATH in kernel.json")
    .with_hint("   - Re-register the kernel with the registration tool")
}

/// Streams install progress as `[N/5]` lines.
struct StreamReporter {
    iopub: Arc<dyn IoPubSession>,
    parent: Header,
}

impl InstallReporter for StreamReporter {
    fn phase(&mut self, step: u8, message: &str) {
        self.iopub.stream(
            StreamName::Stdout,
            &format!("[{step}/5] {message}\n"),
            Some(&self.parent),
        );
    }

    fn output(&mut self, line: &str) {
        let text = if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{line}\n")
        };
        self.iopub
            .stream(StreamName::Stdout, &text, Some(&self.parent));
    }
}

/// Loads a built library by launching the REPL (if needed) and
/// evaluating `dlopen` inside it.
struct SessionLoader<'a> {
    session: &'a mut Session,
}

impl ModuleLoader for SessionLoader<'_> {
    fn load_library(&mut self, path: &Path) -> Result<(), String> {
        self.session
            .ensure_repl()
            .map_err(|diag| diag.message.clone())?;
        match self.session.supervisor.as_mut() {
            Some(supervisor) => supervisor.load_shared_library(path),
            None => Err("REPL unavailable".to_string()),
        }
    }
}

fn probe_swift_version_output() -> Option<String> {
    let output = std::process::Command::new("swift")
        .arg("--version")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts a dotted version from `swift --version` output, e.g.
/// `Swift version 5.9.2 (...)` → `5.9.2`.
pub(crate) fn parse_swift_version(output: &str) -> Option<String> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        if !token.eq_ignore_ascii_case("version") {
            continue;
        }
        if let Some(next) = tokens.get(index + 1) {
            let version: String = next
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let version = version.trim_end_matches('.').to_string();
            if version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return Some(version);
            }
        }
    }
    None
}

/// Full `swift --version` report plus kernel environment, rendered by
/// `%swift-version`.
pub(crate) fn swift_version_report(session: &Session) -> String {
    let mut out = String::from("Swift toolchain\n");
    match probe_swift_version_output() {
        Some(text) => {
            for line in text.lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
        None => out.push_str("  swift not found in PATH\n"),
    }
    out.push_str("Kernel environment\n");
    out.push_str(&format!(
        "  REPL_SWIFT_PATH:    {}\n",
        session
            .config()
            .repl_path
            .as_ref()
            .map_or_else(|| "not set".to_string(), |p| p.display().to_string())
    ));
    out.push_str(&format!(
        "  SWIFT_BUILD_PATH:   {}\n",
        session
            .installer()
            .config()
            .swift_build_path
            .as_ref()
            .map_or_else(|| "not set".to_string(), |p| p.display().to_string())
    ));
    out.push_str(&format!(
        "  SWIFT_PACKAGE_PATH: {}\n",
        session
            .installer()
            .config()
            .swift_package_path
            .as_ref()
            .map_or_else(|| "not set".to_string(), |p| p.display().to_string())
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sjk_protocol::testing::LoopbackSession;
    use sjk_protocol::ParentSlot;
    use sjk_repl::testing::ScriptedBackend;
    use sjk_repl::InterruptController;

    pub(crate) fn test_session(backend: ScriptedBackend) -> (Session, Arc<LoopbackSession>) {
        let guard = Arc::new(ExecutionGuard::new());
        let interrupts = Arc::new(InterruptController::new(Arc::clone(&guard)));
        let iopub = Arc::new(LoopbackSession::new());
        let bridge = BridgeHandles {
            guard,
            interrupts,
            iopub: iopub.clone(),
            parent: ParentSlot::new(),
        };
        let mut config = KernelConfig::default();
        config.repl_path = Some(PathBuf::from("/usr/bin/repl_swift"));
        let session = Session::new(config, Box::new(backend), bridge);
        (session, iopub)
    }

    fn header() -> Header {
        Header::new("execute_request", "session", "user")
    }

    #[test]
    fn counter_increments_without_gaps() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        for expected in 1..=3 {
            let reply = session.handle_execute(&header(), ExecuteRequest::code("let x = 1"));
            assert!(matches!(reply.status, ReplyStatus::Ok));
            assert_eq!(reply.execution_count, expected);
        }
    }

    #[test]
    fn empty_cell_does_not_increment() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        let reply = session.handle_execute(&header(), ExecuteRequest::code("   \n  "));
        assert_eq!(reply.execution_count, 0);
        assert!(!session.repl_started());
    }

    #[test]
    fn silent_execute_keeps_counter_and_publishes_nothing() {
        let (mut session, iopub) = test_session(ScriptedBackend::new());
        let mut request = ExecuteRequest::code("1 + 1");
        request.silent = true;
        let reply = session.handle_execute(&header(), request);
        assert_eq!(reply.execution_count, 0);
        assert!(iopub.of_type("execute_result").is_empty());
    }

    #[test]
    fn reset_preserves_history_and_reopens_install_window() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        session.handle_execute(&header(), ExecuteRequest::code("let x = 1"));
        assert!(session.executed_any());
        assert_eq!(session.history().len(), 1);

        session.reset();
        assert_eq!(session.execution_count(), 0);
        assert!(!session.executed_any());
        assert!(!session.repl_started());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn declarations_are_tracked_textually() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        session.handle_execute(
            &header(),
            ExecuteRequest::code("let x = 1\nvar y = 2\nfunc f() {}\nprint(x)"),
        );
        let names: Vec<&str> = session
            .declarations()
            .iter()
            .map(|(_, name)| name.as_str())
            .collect();
        assert_eq!(names, vec!["x", "y", "f"]);
    }

    #[test]
    fn launch_failure_degrades_but_replies() {
        let (mut session, iopub) = test_session(ScriptedBackend::failing());
        let reply = session.handle_execute(&header(), ExecuteRequest::code("print(1)"));
        assert!(matches!(reply.status, ReplyStatus::Error));
        assert_eq!(reply.ename, "ReplStartupError");
        assert!(!iopub.of_type("error").is_empty());

        // Kernel stays up; the next request gets the same diagnostic.
        let reply = session.handle_execute(&header(), ExecuteRequest::code("print(1)"));
        assert!(matches!(reply.status, ReplyStatus::Error));
    }

    #[test]
    fn missing_repl_path_is_a_startup_failure() {
        let guard = Arc::new(ExecutionGuard::new());
        let interrupts = Arc::new(InterruptController::new(Arc::clone(&guard)));
        let iopub = Arc::new(LoopbackSession::new());
        let bridge = BridgeHandles {
            guard,
            interrupts,
            iopub,
            parent: ParentSlot::new(),
        };
        let mut session = Session::new(
            KernelConfig::default(),
            Box::new(ScriptedBackend::new()),
            bridge,
        );
        let reply = session.handle_execute(&header(), ExecuteRequest::code("1"));
        assert!(matches!(reply.status, ReplyStatus::Error));
        assert!(reply.evalue.contains("REPL_SWIFT_PATH"));
    }

    #[test]
    fn kernel_info_conforms() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        let info = session.handle_kernel_info();
        assert!(info.protocol_version.as_str() >= "5.4");
        assert_eq!(info.language_info.name, "swift");
        assert_eq!(info.language_info.file_extension, ".swift");
        assert_eq!(info.language_info.mimetype, "text/x-swift");
    }

    #[test]
    fn swift_version_parsing() {
        assert_eq!(
            parse_swift_version("Swift version 5.9.2 (swift-5.9.2-RELEASE)").as_deref(),
            Some("5.9.2")
        );
        assert_eq!(
            parse_swift_version("Apple Swift version 6.0 (swiftlang...)").as_deref(),
            Some("6.0")
        );
        assert!(parse_swift_version("no versions here").is_none());
        assert!(parse_swift_version("version next").is_none());
    }

    #[test]
    fn completion_uses_code_points() {
        let backend = ScriptedBackend::new();
        backend.set_completion(sjk_repl::testing::completion("pri", &["print"]));
        let (mut session, _) = test_session(backend);
        // Start the REPL first.
        session.handle_execute(&header(), ExecuteRequest::code("let x = 1"));

        let code = "💡let x = 5\nx.pri";
        let pos = code.chars().count();
        let reply = session.handle_complete(code, pos);
        assert!(matches!(reply.status, ReplyStatus::Ok));
        assert_eq!(reply.matches, vec!["print".to_string()]);
        assert_eq!(reply.cursor_end, pos);
        assert_eq!(reply.cursor_end - reply.cursor_start, 3);
    }

    #[test]
    fn completion_without_repl_is_empty() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        let reply = session.handle_complete("x.", 2);
        assert!(reply.matches.is_empty());
        assert!(!session.repl_started());
    }

    #[test]
    fn completion_cursor_is_clamped_to_code_length() {
        let (mut session, _) = test_session(ScriptedBackend::new());
        session.handle_execute(&header(), ExecuteRequest::code("let x = 1"));
        let reply = session.handle_complete("ab", 99);
        assert_eq!(reply.cursor_start, 2);
        assert_eq!(reply.cursor_end, 2);
    }
}
