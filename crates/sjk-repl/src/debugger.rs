//! The debugger trait contract.
//!
//! The kernel drives the embedded Swift REPL through a native
//! debugger's scripting API. That binding is an external collaborator;
//! this module pins down exactly what the kernel consumes from it:
//!
//! - launch a target process from the pre-built REPL executable,
//! - evaluate an expression synchronously and get back a value tree or
//!   an error description,
//! - query process state, resume a stopped process, deliver an
//!   asynchronous interrupt,
//! - enumerate stack frames of the stopped thread,
//! - read buffered process stdout without blocking (the one operation
//!   documented as safe concurrently with evaluation),
//! - complete a code prefix.
//!
//! [`crate::testing`] provides a scriptable implementation for tests.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the debugger binding.
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// Creating the debugger, target, or process failed.
    #[error("could not launch REPL: {0}")]
    Launch(String),

    /// The evaluate-expression operation itself failed (distinct from
    /// the expression producing an error result).
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The completion API failed. Swallowed by callers.
    #[error("completion failed: {0}")]
    Completion(String),
}

/// State of the embedded Swift process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Stopped at the REPL entry breakpoint, ready for a submission.
    AtRepl,
    /// Executing user code.
    Running,
    /// Stopped in a non-exited state (signal, exception).
    StoppedOnSignal {
        /// Debugger-provided stop reason, e.g. `signal SIGABRT`.
        reason: String,
    },
    /// The process exited or crashed; it must be re-launched.
    Exited { code: Option<i32> },
}

impl ProcessState {
    /// Whether the process can still run code (after a resume where
    /// needed).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Exited { .. })
    }
}

/// One frame of the stopped thread.
///
/// `file` is `None` for frames without source information (library
/// frames, expression-evaluation plumbing); those are dropped before
/// display.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub function: String,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// A node of the debugger's value-child enumeration.
#[derive(Debug, Clone, Default)]
pub struct ValueNode {
    /// Field name, dictionary-entry role (`key`/`value`), or element
    /// index.
    pub name: String,
    pub type_name: String,
    /// Scalar rendering of this node, already stripped of debugger
    /// metadata.
    pub value: String,
    pub children: Vec<ValueNode>,
}

impl ValueNode {
    /// A leaf node.
    #[must_use]
    pub fn leaf(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }
}

/// Raw result of evaluating one expression.
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    /// The produced value, when the submission was an expression.
    pub value: Option<ValueNode>,
    /// Non-empty when the debugger reported an error for the
    /// submission.
    pub error: Option<String>,
}

impl EvalResult {
    #[must_use]
    pub fn success_without_value() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(value: ValueNode) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(error.into()),
        }
    }
}

/// One completion candidate as a (display, insertion) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMatch {
    pub display: String,
    pub insertion: String,
}

/// Result of the debugger's code-completion API.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Common prefix of all candidates; determines the cursor-start
    /// offset.
    pub common_prefix: String,
    pub matches: Vec<CompletionMatch>,
}

/// Everything needed to launch the REPL process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Path to the pre-built Swift REPL executable.
    pub repl_path: PathBuf,
    /// Host architecture descriptor (`aarch64` or `x86_64`).
    pub arch: String,
    /// Environment for the child, dynamic-library search path already
    /// prepended.
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
    /// Swift module search paths the target is configured with at
    /// startup. Installed packages land in one of these.
    pub module_search_paths: Vec<PathBuf>,
}

/// Handle to the launched process.
///
/// Shared with the stdout pump thread and the interrupt controller,
/// hence `Send + Sync`; implementations use interior mutability.
pub trait DebugProcess: Send + Sync {
    fn state(&self) -> ProcessState;

    /// Resumes a process stopped on a signal so the REPL remains
    /// usable.
    fn resume(&self) -> Result<(), DebuggerError>;

    /// Delivers the debugger's asynchronous interrupt. Non-blocking;
    /// the actual stop may take seconds.
    fn async_interrupt(&self);

    /// Non-blocking read of buffered stdout into `buf`; returns the
    /// number of bytes read (0 when the buffer is empty). Documented
    /// safe to call concurrently with evaluation.
    fn read_stdout(&self, buf: &mut [u8]) -> usize;

    /// Frames of the stopped main thread, innermost first.
    fn frames(&self) -> Vec<FrameInfo>;
}

/// A live debugger session owning one target.
pub trait DebugSession: Send {
    /// Synchronously evaluates `source` in REPL mode.
    fn evaluate(&mut self, source: &str) -> Result<EvalResult, DebuggerError>;

    /// Completes the given code prefix.
    fn complete(&mut self, prefix: &str) -> Result<Completion, DebuggerError>;

    /// Handle to the embedded process.
    fn process(&self) -> Arc<dyn DebugProcess>;

    /// Terminates the debugger session. Idempotent.
    fn terminate(&mut self);
}

/// Factory for debugger sessions; the seam the LLDB binding plugs
/// into.
pub trait DebuggerBackend: Send {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn DebugSession>, DebuggerError>;
}
