//! Async I/O bridge: stdout drain, interruption, completion
//! serialization.
//!
//! Three concerns share this module because they share state:
//!
//! - a reader thread pumps the process's buffered stdout to the client
//!   while an execution is in progress,
//! - two interrupt paths (message-based and signal-based) funnel into
//!   one [`InterruptController::interrupt`],
//! - an execution-in-progress flag serializes completion queries
//!   against evaluation.
//!
//! The interrupt latch and the execution flag are two primitive
//! booleans guarded by a single mutex ([`ExecutionGuard`]).

use crate::debugger::DebugProcess;
use crate::diagnostics::decode_bytes;
use parking_lot::Mutex;
use sjk_protocol::{IoPubSession, ParentSlot, StreamName};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

/// ANSI clear-whole-display sequence; translated into `clear_output`.
const CLEAR_SEQUENCE: &str = "\u{1b}[2J";

/// Read chunk size for the non-blocking stdout reads.
const READ_CHUNK: usize = 1024;

/// Poll interval of the stdout pump thread.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Flags {
    executing: bool,
    interrupt_pending: bool,
}

/// The execution-in-progress flag and the interrupt latch.
#[derive(Default)]
pub struct ExecutionGuard {
    flags: Mutex<Flags>,
}

impl ExecutionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an evaluation as in flight and clears any stale interrupt
    /// latch left over from a previous cell.
    pub fn begin_execution(&self) {
        let mut flags = self.flags.lock();
        flags.executing = true;
        flags.interrupt_pending = false;
    }

    pub fn end_execution(&self) {
        self.flags.lock().executing = false;
    }

    /// Whether an `execute_request` is currently mid-flight.
    ///
    /// Completion requests observed while this is raised must return
    /// an empty match list without touching the debugger.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.flags.lock().executing
    }

    /// Sets the interrupt latch.
    pub fn raise_interrupt(&self) {
        self.flags.lock().interrupt_pending = true;
    }

    /// Reads the latch without consuming it. `%timeit`-style loops
    /// check this between iterations.
    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.flags.lock().interrupt_pending
    }

    /// Consumes the latch.
    #[must_use]
    pub fn take_interrupt(&self) -> bool {
        std::mem::take(&mut self.flags.lock().interrupt_pending)
    }
}

/// Funnel for both interrupt paths.
///
/// Holds the current process handle (if any); `interrupt` is
/// idempotent and a warning-level no-op when no process exists.
#[derive(Default)]
pub struct InterruptController {
    guard: Arc<ExecutionGuard>,
    process: Mutex<Option<Arc<dyn DebugProcess>>>,
    delivered: AtomicU64,
}

impl InterruptController {
    #[must_use]
    pub fn new(guard: Arc<ExecutionGuard>) -> Self {
        Self {
            guard,
            process: Mutex::new(None),
            delivered: AtomicU64::new(0),
        }
    }

    /// Installs the process handle after launch.
    pub fn attach(&self, process: Arc<dyn DebugProcess>) {
        *self.process.lock() = Some(process);
    }

    /// Drops the process handle on teardown.
    pub fn detach(&self) {
        *self.process.lock() = None;
    }

    #[must_use]
    pub fn has_process(&self) -> bool {
        self.process.lock().is_some()
    }

    /// Delivers an asynchronous interrupt to the Swift process.
    ///
    /// Sets the latch, then issues the debugger's async-interrupt
    /// operation. Returns `false` when no process exists.
    pub fn interrupt(&self) -> bool {
        let process = self.process.lock().clone();
        match process {
            Some(process) => {
                self.guard.raise_interrupt();
                process.async_interrupt();
                let count = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(count, "delivered async interrupt");
                true
            }
            None => {
                warn!("interrupt requested but no Swift process exists");
                false
            }
        }
    }

    /// Number of interrupts delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn guard(&self) -> Arc<ExecutionGuard> {
        Arc::clone(&self.guard)
    }
}

/// Drains all currently buffered stdout and forwards it to the
/// client, keyed to the current parent header.
///
/// The clear-screen ANSI sequence is translated into a `clear_output`
/// message, splitting the surrounding text.
pub fn drain_stdout(
    process: &dyn DebugProcess,
    session: &dyn IoPubSession,
    parent: &ParentSlot,
) -> bool {
    let mut collected = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let read = process.read_stdout(&mut chunk);
        if read == 0 {
            break;
        }
        collected.extend_from_slice(&chunk[..read]);
    }
    if collected.is_empty() {
        return false;
    }

    let text = decode_bytes(&collected);
    let parent_header = parent.current();
    send_stdout(session, &text, parent_header.as_ref());
    true
}

fn send_stdout(session: &dyn IoPubSession, text: &str, parent: Option<&sjk_protocol::Header>) {
    if let Some(index) = text.find(CLEAR_SEQUENCE) {
        let (before, rest) = text.split_at(index);
        if !before.is_empty() {
            session.stream(StreamName::Stdout, before, parent);
        }
        session.clear_output(false, parent);
        let after = &rest[CLEAR_SEQUENCE.len()..];
        if !after.is_empty() {
            send_stdout(session, after, parent);
        }
    } else if !text.is_empty() {
        session.stream(StreamName::Stdout, text, parent);
    }
}

/// Background stdout pump.
///
/// Reads the debugger's stdout buffer in small non-blocking chunks
/// whenever an execution is in progress, sleeping briefly between
/// polls. Stops at the next poll boundary once the stop flag is set,
/// after a final drain.
pub struct StdoutPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    process: Arc<dyn DebugProcess>,
    session: Arc<dyn IoPubSession>,
    parent: ParentSlot,
}

impl StdoutPump {
    /// Spawns the reader thread.
    #[must_use]
    pub fn spawn(
        process: Arc<dyn DebugProcess>,
        session: Arc<dyn IoPubSession>,
        parent: ParentSlot,
        guard: Arc<ExecutionGuard>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_process = Arc::clone(&process);
        let thread_session = Arc::clone(&session);
        let thread_parent = parent.clone();
        let handle = std::thread::Builder::new()
            .name("sjk-stdout".to_string())
            .spawn(move || {
                loop {
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if guard.is_executing() {
                        drain_stdout(
                            thread_process.as_ref(),
                            thread_session.as_ref(),
                            &thread_parent,
                        );
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                // Final drain so trailing output is not lost.
                drain_stdout(
                    thread_process.as_ref(),
                    thread_session.as_ref(),
                    &thread_parent,
                );
            });

        match handle {
            Ok(handle) => Self {
                stop,
                handle: Some(handle),
                process,
                session,
                parent,
            },
            Err(err) => {
                error!(%err, "failed to spawn stdout pump thread");
                Self {
                    stop,
                    handle: None,
                    process,
                    session,
                    parent,
                }
            }
        }
    }

    /// Synchronously drains outstanding stdout on the caller's thread.
    ///
    /// The supervisor calls this after evaluation returns and before
    /// classifying the outcome, which is what orders stream messages
    /// before the execute reply.
    pub fn drain_now(&self) -> bool {
        drain_stdout(self.process.as_ref(), self.session.as_ref(), &self.parent)
    }

    /// Signals the thread to stop and joins it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("stdout pump thread panicked");
            }
        }
    }
}

/// Spawns the legacy signal-based interrupt watcher (Unix only).
///
/// The watcher invokes the same [`InterruptController::interrupt`] as
/// the message-based path. On non-Unix hosts this is a no-op task.
pub fn spawn_sigint_watcher(
    controller: Arc<InterruptController>,
) -> tokio::task::JoinHandle<()> {
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut stream = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, "could not install SIGINT watcher");
                    return;
                }
            };
            loop {
                if stream.recv().await.is_none() {
                    break;
                }
                debug!("SIGINT received; delivering interrupt");
                controller.interrupt();
            }
        })
    }
    #[cfg(not(unix))]
    {
        let _ = controller;
        tokio::spawn(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProcess;
    use sjk_protocol::testing::LoopbackSession;

    #[test]
    fn guard_flags_transitions() {
        let guard = ExecutionGuard::new();
        assert!(!guard.is_executing());

        guard.raise_interrupt();
        guard.begin_execution();
        // begin clears the stale latch
        assert!(guard.is_executing());
        assert!(!guard.interrupt_pending());

        guard.raise_interrupt();
        assert!(guard.interrupt_pending());
        assert!(guard.take_interrupt());
        assert!(!guard.take_interrupt());

        guard.end_execution();
        assert!(!guard.is_executing());
    }

    #[test]
    fn interrupt_without_process_is_noop() {
        let controller = InterruptController::new(Arc::new(ExecutionGuard::new()));
        assert!(!controller.interrupt());
        assert_eq!(controller.delivered(), 0);
    }

    #[test]
    fn interrupt_with_process_sets_latch_and_counts() {
        let guard = Arc::new(ExecutionGuard::new());
        let controller = InterruptController::new(Arc::clone(&guard));
        let process = Arc::new(ScriptedProcess::at_repl());
        controller.attach(process.clone());

        assert!(controller.interrupt());
        assert!(controller.interrupt());
        assert_eq!(controller.delivered(), 2);
        assert!(guard.interrupt_pending());
        assert_eq!(process.interrupt_count(), 2);
    }

    #[test]
    fn drain_decodes_invalid_utf8() {
        let process = ScriptedProcess::at_repl();
        process.push_stdout(b"ok\xFF!");
        let session = LoopbackSession::new();
        let parent = ParentSlot::new();

        assert!(drain_stdout(&process, &session, &parent));
        let text = session.stream_text("stdout");
        assert!(text.contains("ok"));
        assert!(text.contains('!'));
    }

    #[test]
    fn clear_sequence_becomes_clear_output() {
        let process = ScriptedProcess::at_repl();
        process.push_stdout(b"before\x1b[2Jafter");
        let session = LoopbackSession::new();
        let parent = ParentSlot::new();

        drain_stdout(&process, &session, &parent);

        let published = session.published();
        let types: Vec<&str> = published.iter().map(|p| p.msg_type.as_str()).collect();
        assert_eq!(types, ["stream", "clear_output", "stream"]);
        assert_eq!(published[0].content["text"], "before");
        assert_eq!(published[2].content["text"], "after");
    }

    #[test]
    fn pump_stops_at_poll_boundary() {
        let process = Arc::new(ScriptedProcess::at_repl());
        let session = Arc::new(LoopbackSession::new());
        let guard = Arc::new(ExecutionGuard::new());
        let pump = StdoutPump::spawn(
            process.clone(),
            session.clone(),
            ParentSlot::new(),
            guard,
        );

        process.push_stdout(b"tail");
        pump.stop();
        // The final drain picks up trailing output.
        assert_eq!(session.stream_text("stdout"), "tail");
    }
}
