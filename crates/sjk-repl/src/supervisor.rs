//! The REPL supervisor.
//!
//! Owns the single long-lived Swift process and the classification of
//! evaluation results into execution outcomes. The debugger is only
//! ever touched from the caller's thread (the kernel event loop); the
//! stdout pump reads concurrently through its documented-safe API.

use crate::debugger::{
    Completion, DebugProcess, DebugSession, DebuggerBackend, DebuggerError, EvalResult,
    ProcessState,
};
use crate::diagnostics::{
    self, compile_diagnostic, fatal_diagnostic, is_compile_error, is_interrupt,
    runtime_diagnostic,
};
use crate::io_bridge::{ExecutionGuard, InterruptController, StdoutPump};
use crate::render::{render, RenderedValue};
use sjk_protocol::{IoPubSession, ParentSlot};
use sjk_types::{Cell, Diagnostic, ExecutionOutcome};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use crate::debugger::LaunchSpec;

/// Shared bridge state the supervisor cooperates with.
#[derive(Clone)]
pub struct BridgeHandles {
    pub guard: Arc<ExecutionGuard>,
    pub interrupts: Arc<InterruptController>,
    pub iopub: Arc<dyn IoPubSession>,
    pub parent: ParentSlot,
}

/// Supervises the embedded Swift REPL process.
pub struct ReplSupervisor {
    session: Box<dyn DebugSession>,
    process: Arc<dyn DebugProcess>,
    pump: Option<StdoutPump>,
    bridge: BridgeHandles,
    degraded: bool,
}

impl ReplSupervisor {
    /// Launches the REPL through the debugger backend and starts the
    /// stdout pump.
    pub fn launch(
        backend: &dyn DebuggerBackend,
        spec: &LaunchSpec,
        bridge: BridgeHandles,
    ) -> Result<Self, DebuggerError> {
        info!(
            repl = %spec.repl_path.display(),
            arch = %spec.arch,
            "launching Swift REPL"
        );
        let session = backend.launch(spec)?;
        let process = session.process();
        bridge.interrupts.attach(Arc::clone(&process));
        let pump = StdoutPump::spawn(
            Arc::clone(&process),
            Arc::clone(&bridge.iopub),
            bridge.parent.clone(),
            Arc::clone(&bridge.guard),
        );
        Ok(Self {
            session,
            process,
            pump: Some(pump),
            bridge,
            degraded: false,
        })
    }

    /// Whether the process was lost; a degraded supervisor returns the
    /// fatal diagnostic for every execution.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Evaluates one cell's residual Swift source.
    ///
    /// Prepends the cell's source-location directive, installs the
    /// interrupt latch, evaluates, drains outstanding stdout, and
    /// classifies the raw result.
    pub fn execute(&mut self, cell: &Cell, source: &str) -> ExecutionOutcome {
        if self.degraded {
            return ExecutionOutcome::RuntimeError {
                diagnostic: fatal_diagnostic(),
                process_lost: true,
            };
        }

        let with_location = cell.source_with_location(source);
        self.bridge.guard.begin_execution();
        let evaluated = self.session.evaluate(&with_location);
        // Drain before classifying so stream output precedes the
        // reply.
        self.drain_stdout();
        self.bridge.guard.end_execution();
        let interrupted = self.bridge.guard.take_interrupt();

        let result = match evaluated {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "debugger evaluation failed");
                let lost = !self.process.state().is_alive();
                if lost {
                    self.mark_degraded();
                }
                return ExecutionOutcome::RuntimeError {
                    diagnostic: Diagnostic::error("DebuggerError", err.to_string()),
                    process_lost: lost,
                };
            }
        };

        self.classify(result, interrupted)
    }

    fn classify(&mut self, result: EvalResult, interrupted: bool) -> ExecutionOutcome {
        match self.process.state() {
            ProcessState::Exited { code } => {
                warn!(?code, "Swift process exited during evaluation");
                self.mark_degraded();
                ExecutionOutcome::RuntimeError {
                    diagnostic: fatal_diagnostic(),
                    process_lost: true,
                }
            }
            ProcessState::StoppedOnSignal { reason } => {
                let frames = self.process.frames();
                // Resume so the REPL remains usable for the next cell.
                if let Err(err) = self.process.resume() {
                    error!(%err, "failed to resume stopped process");
                }
                if interrupted {
                    ExecutionOutcome::Interrupted
                } else {
                    ExecutionOutcome::RuntimeError {
                        diagnostic: runtime_diagnostic(&reason, &frames),
                        process_lost: false,
                    }
                }
            }
            ProcessState::AtRepl | ProcessState::Running => match result.error {
                Some(raw) if interrupted || is_interrupt(&raw) => ExecutionOutcome::Interrupted,
                Some(raw) if is_compile_error(&raw) => {
                    ExecutionOutcome::CompileError(compile_diagnostic(&raw))
                }
                Some(raw) => {
                    // An error without the compile prefix and without a
                    // stopped process: report it as a runtime error
                    // with no frames.
                    ExecutionOutcome::RuntimeError {
                        diagnostic: runtime_diagnostic(&raw, &[]),
                        process_lost: false,
                    }
                }
                None => match result.value {
                    Some(value) => {
                        let rendered = render(&value);
                        debug!(type_name = %rendered.description.type_name, "expression value");
                        ExecutionOutcome::SuccessWithValue(rendered.description)
                    }
                    None => ExecutionOutcome::SuccessWithoutValue,
                },
            },
        }
    }

    /// Renders a value description back into display forms.
    ///
    /// The adapter publishes both the plain text and the HTML form so
    /// the client picks the richer one it understands.
    #[must_use]
    pub fn render_value(value: &crate::debugger::ValueNode) -> RenderedValue {
        render(value)
    }

    /// Completion of a code prefix. Failures are swallowed into an
    /// empty result.
    pub fn complete(&mut self, prefix: &str) -> Completion {
        if self.degraded {
            return Completion::default();
        }
        match self.session.complete(prefix) {
            Ok(completion) => completion,
            Err(err) => {
                debug!(%err, "completion query failed");
                Completion::default()
            }
        }
    }

    /// Evaluates raw code without a cell coordinate (installer
    /// plumbing, symbol checks).
    pub fn evaluate_raw(&mut self, source: &str) -> Result<EvalResult, DebuggerError> {
        self.bridge.guard.begin_execution();
        let result = self.session.evaluate(source);
        self.drain_stdout();
        self.bridge.guard.end_execution();
        let _ = self.bridge.guard.take_interrupt();
        result
    }

    /// Loads a shared library into the running process by evaluating a
    /// `dlopen` call inside the REPL, with lazy binding and global
    /// symbol visibility.
    pub fn load_shared_library(&mut self, path: &Path) -> Result<(), String> {
        let module = if cfg!(target_os = "macos") {
            "Darwin"
        } else {
            "Glibc"
        };
        let quoted = serde_json::to_string(&path.to_string_lossy())
            .map_err(|err| format!("could not encode library path: {err}"))?;
        let code = format!(
            "import func {module}.dlopen\n\
             import var {module}.RTLD_LAZY\n\
             import var {module}.RTLD_GLOBAL\n\
             dlopen({quoted}, RTLD_LAZY | RTLD_GLOBAL)"
        );

        let result = self
            .evaluate_raw(&code)
            .map_err(|err| format!("dlopen evaluation failed: {err}"))?;
        if let Some(error) = result.error {
            return Err(diagnostics::clean_message(&error));
        }
        match result.value {
            Some(value) if value.value.ends_with("nil") => {
                Err("dlopen returned nil (library load failed)".to_string())
            }
            Some(_) => Ok(()),
            None => Err("dlopen produced no value".to_string()),
        }
    }

    /// Best-effort check that a symbol declared with `%swift_link`
    /// resolves in the running process.
    pub fn verify_symbol(&mut self, symbol: &str) -> Result<bool, String> {
        let module = if cfg!(target_os = "macos") {
            "Darwin"
        } else {
            "Glibc"
        };
        let quoted = serde_json::to_string(symbol)
            .map_err(|err| format!("could not encode symbol name: {err}"))?;
        let code = format!(
            "import func {module}.dlsym\n\
             import var {module}.RTLD_DEFAULT\n\
             dlsym(RTLD_DEFAULT, {quoted}) != nil"
        );
        let result = self
            .evaluate_raw(&code)
            .map_err(|err| format!("dlsym evaluation failed: {err}"))?;
        Ok(result
            .value
            .map(|value| value.value.contains("true"))
            .unwrap_or(false))
    }

    fn drain_stdout(&self) {
        if let Some(pump) = &self.pump {
            pump.drain_now();
        }
    }

    fn mark_degraded(&mut self) {
        self.degraded = true;
        self.bridge.interrupts.detach();
    }

    /// Terminates the debugger session and stops the pump thread.
    pub fn shutdown(&mut self) {
        info!("terminating debugger session");
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.session.terminate();
        self.bridge.interrupts.detach();
        self.degraded = true;
    }
}

impl Drop for ReplSupervisor {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
    }
}
