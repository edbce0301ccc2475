//! Scriptable in-memory debugger.
//!
//! [`ScriptedBackend`] implements the [`crate::debugger`] traits with
//! fully programmable behavior: each evaluation pops the next
//! [`ScriptedEval`] step (defaulting to a plain success), pushes its
//! stdout bytes into the process buffer, and applies its resulting
//! process state. Tests across the workspace drive the whole kernel
//! through this backend without a Swift toolchain.

use crate::debugger::{
    Completion, CompletionMatch, DebugProcess, DebugSession, DebuggerBackend, DebuggerError,
    EvalResult, FrameInfo, LaunchSpec, ProcessState, ValueNode,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a blocking scripted evaluation waits for an interrupt
/// before giving up (tests should never get near this).
const BLOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// One scripted evaluation step.
#[derive(Debug, Clone)]
pub enum ScriptedEval {
    /// Produce a result immediately (optionally after a delay).
    Step {
        stdout: Vec<u8>,
        result: EvalResult,
        state: ProcessState,
        frames: Vec<FrameInfo>,
        delay: Option<Duration>,
    },
    /// Emulate `while true {}`: block until an async interrupt
    /// arrives, then report an interrupted evaluation with the process
    /// stopped on SIGINT.
    BlockUntilInterrupt,
    /// Emit stdout in timed stages while "executing", so the pump
    /// observes multiple batches; then succeed without a value.
    StagedPrint { chunks: Vec<(Vec<u8>, Duration)> },
}

impl ScriptedEval {
    /// Success without a value.
    #[must_use]
    pub fn unit() -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::success_without_value(),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// Success with a scalar value.
    #[must_use]
    pub fn value(type_name: &str, summary: &str) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_value(ValueNode::leaf("", type_name, summary)),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// Success with a full value tree.
    #[must_use]
    pub fn value_node(node: ValueNode) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_value(node),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// Emit stdout, then succeed without a value.
    #[must_use]
    pub fn print(text: &str) -> Self {
        Self::Step {
            stdout: text.as_bytes().to_vec(),
            result: EvalResult::success_without_value(),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// Emit raw stdout bytes (not necessarily valid UTF-8), then
    /// succeed.
    #[must_use]
    pub fn print_bytes(bytes: &[u8]) -> Self {
        Self::Step {
            stdout: bytes.to_vec(),
            result: EvalResult::success_without_value(),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// A compile diagnostic.
    #[must_use]
    pub fn compile_error(description: &str) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_error(description),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// A runtime stop: the process ends up stopped on a signal with
    /// the given frames.
    #[must_use]
    pub fn runtime_stop(reason: &str, frames: Vec<FrameInfo>) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_error(reason),
            state: ProcessState::StoppedOnSignal {
                reason: reason.to_string(),
            },
            frames,
            delay: None,
        }
    }

    /// The process exits during evaluation.
    #[must_use]
    pub fn exited(code: Option<i32>) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_error("process exited"),
            state: ProcessState::Exited { code },
            frames: Vec::new(),
            delay: None,
        }
    }

    /// An already-interrupted evaluation (interrupt landed before the
    /// scripted step ran).
    #[must_use]
    pub fn interrupted() -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::with_error(
                "Execution was interrupted, reason: signal SIGINT.",
            ),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: None,
        }
    }

    /// Emit each chunk of stdout, pausing afterwards, so the pump
    /// thread picks the chunks up as separate batches.
    #[must_use]
    pub fn staged_print(chunks: &[(&str, u64)]) -> Self {
        Self::StagedPrint {
            chunks: chunks
                .iter()
                .map(|(text, millis)| (text.as_bytes().to_vec(), Duration::from_millis(*millis)))
                .collect(),
        }
    }

    /// Succeed after sleeping, for race tests.
    #[must_use]
    pub fn sleep_then_unit(millis: u64) -> Self {
        Self::Step {
            stdout: Vec::new(),
            result: EvalResult::success_without_value(),
            state: ProcessState::AtRepl,
            frames: Vec::new(),
            delay: Some(Duration::from_millis(millis)),
        }
    }
}

/// In-memory process handle.
pub struct ScriptedProcess {
    stdout: Mutex<VecDeque<u8>>,
    state: Mutex<ProcessState>,
    frames: Mutex<Vec<FrameInfo>>,
    interrupts: AtomicUsize,
    resumes: AtomicUsize,
}

impl ScriptedProcess {
    /// A process parked at the REPL breakpoint.
    #[must_use]
    pub fn at_repl() -> Self {
        Self {
            stdout: Mutex::new(VecDeque::new()),
            state: Mutex::new(ProcessState::AtRepl),
            frames: Mutex::new(Vec::new()),
            interrupts: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    /// Appends bytes to the stdout buffer.
    pub fn push_stdout(&self, bytes: &[u8]) {
        self.stdout.lock().extend(bytes.iter().copied());
    }

    pub fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }

    pub fn set_frames(&self, frames: Vec<FrameInfo>) {
        *self.frames.lock() = frames;
    }

    #[must_use]
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl DebugProcess for ScriptedProcess {
    fn state(&self) -> ProcessState {
        self.state.lock().clone()
    }

    fn resume(&self) -> Result<(), DebuggerError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = ProcessState::AtRepl;
        Ok(())
    }

    fn async_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }

    fn read_stdout(&self, buf: &mut [u8]) -> usize {
        let mut stdout = self.stdout.lock();
        let mut count = 0;
        while count < buf.len() {
            match stdout.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    fn frames(&self) -> Vec<FrameInfo> {
        self.frames.lock().clone()
    }
}

struct BackendState {
    steps: Mutex<VecDeque<ScriptedEval>>,
    submissions: Mutex<Vec<String>>,
    completion: Mutex<Completion>,
    completion_fails: AtomicBool,
    process: Arc<ScriptedProcess>,
    fail_launch: bool,
    launches: AtomicUsize,
}

/// Scriptable debugger backend shared with the test.
///
/// Cloning shares state, so tests keep a handle while the supervisor
/// owns the launched session.
#[derive(Clone)]
pub struct ScriptedBackend {
    state: Arc<BackendState>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_fail_launch(false)
    }

    /// A backend whose launch always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_fail_launch(true)
    }

    fn with_fail_launch(fail_launch: bool) -> Self {
        Self {
            state: Arc::new(BackendState {
                steps: Mutex::new(VecDeque::new()),
                submissions: Mutex::new(Vec::new()),
                completion: Mutex::new(Completion::default()),
                completion_fails: AtomicBool::new(false),
                process: Arc::new(ScriptedProcess::at_repl()),
                fail_launch,
                launches: AtomicUsize::new(0),
            }),
        }
    }

    /// A plausible launch spec for tests.
    #[must_use]
    pub fn spec() -> LaunchSpec {
        LaunchSpec {
            repl_path: PathBuf::from("/usr/bin/repl_swift"),
            arch: std::env::consts::ARCH.to_string(),
            env: Vec::new(),
            cwd: PathBuf::from("."),
            module_search_paths: Vec::new(),
        }
    }

    /// Queues the next evaluation step.
    pub fn push(&self, step: ScriptedEval) {
        self.state.steps.lock().push_back(step);
    }

    /// Sets the completion result returned by subsequent queries.
    pub fn set_completion(&self, completion: Completion) {
        *self.state.completion.lock() = completion;
    }

    /// Makes all completion queries fail.
    pub fn fail_completions(&self) {
        self.state.completion_fails.store(true, Ordering::SeqCst);
    }

    /// All sources submitted to `evaluate`, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<String> {
        self.state.submissions.lock().clone()
    }

    /// The shared process handle.
    #[must_use]
    pub fn process(&self) -> Arc<ScriptedProcess> {
        Arc::clone(&self.state.process)
    }

    /// Number of launches performed.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }
}

impl DebuggerBackend for ScriptedBackend {
    fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn DebugSession>, DebuggerError> {
        if self.state.fail_launch {
            return Err(DebuggerError::Launch(
                "scripted backend configured to fail".to_string(),
            ));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        self.state.process.set_state(ProcessState::AtRepl);
        Ok(Box::new(ScriptedSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedSession {
    state: Arc<BackendState>,
}

impl DebugSession for ScriptedSession {
    fn evaluate(&mut self, source: &str) -> Result<EvalResult, DebuggerError> {
        self.state.submissions.lock().push(source.to_string());

        let step = self
            .state
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(ScriptedEval::unit);

        match step {
            ScriptedEval::Step {
                stdout,
                result,
                state,
                frames,
                delay,
            } => {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
                self.state.process.push_stdout(&stdout);
                self.state.process.set_frames(frames);
                self.state.process.set_state(state);
                Ok(result)
            }
            ScriptedEval::StagedPrint { chunks } => {
                for (bytes, pause) in chunks {
                    self.state.process.push_stdout(&bytes);
                    std::thread::sleep(pause);
                }
                self.state.process.set_state(ProcessState::AtRepl);
                Ok(EvalResult::success_without_value())
            }
            ScriptedEval::BlockUntilInterrupt => {
                let before = self.state.process.interrupt_count();
                let start = Instant::now();
                while self.state.process.interrupt_count() == before {
                    if start.elapsed() > BLOCK_TIMEOUT {
                        return Err(DebuggerError::Evaluation(
                            "scripted block timed out waiting for interrupt".to_string(),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.state.process.set_state(ProcessState::StoppedOnSignal {
                    reason: "signal SIGINT".to_string(),
                });
                Ok(EvalResult::with_error(
                    "Execution was interrupted, reason: signal SIGINT.",
                ))
            }
        }
    }

    fn complete(&mut self, _prefix: &str) -> Result<Completion, DebuggerError> {
        if self.state.completion_fails.load(Ordering::SeqCst) {
            return Err(DebuggerError::Completion("scripted failure".to_string()));
        }
        Ok(self.state.completion.lock().clone())
    }

    fn process(&self) -> Arc<dyn DebugProcess> {
        Arc::clone(&self.state.process) as Arc<dyn DebugProcess>
    }

    fn terminate(&mut self) {
        self.state
            .process
            .set_state(ProcessState::Exited { code: Some(0) });
    }
}

/// Convenience constructor for completion fixtures.
#[must_use]
pub fn completion(common_prefix: &str, matches: &[&str]) -> Completion {
    Completion {
        common_prefix: common_prefix.to_string(),
        matches: matches
            .iter()
            .map(|m| CompletionMatch {
                display: (*m).to_string(),
                insertion: (*m).to_string(),
            })
            .collect(),
    }
}
