//! Protocol adapter.
//!
//! Binds the protocol seam's shell and control handlers to the
//! [`Session`]. The shell side owns the session behind a mutex and
//! runs each execution on the blocking pool so the dispatcher keeps
//! breathing (it answers racing completion requests with empty
//! results); the control side holds only the interrupt controller and
//! never blocks.

use crate::config::KernelConfig;
use crate::session::Session;
use async_trait::async_trait;
use parking_lot::Mutex;
use sjk_protocol::{
    CompleteReply, CompleteRequest, ControlHandler, ExecuteReply, ExecuteRequest, Header,
    InterruptReply, IoPubSession, KernelInfoReply, ParentSlot, ReplyStatus, ShellHandler,
    ShutdownReply, ShutdownRequest,
};
use sjk_repl::debugger::DebuggerBackend;
use sjk_repl::{BridgeHandles, ExecutionGuard, InterruptController};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

/// Shell-channel handler: owns the session.
pub struct KernelShell {
    session: Arc<Mutex<Session>>,
    parent: ParentSlot,
    guard: Arc<ExecutionGuard>,
}

impl KernelShell {
    /// Shared session handle (console harness, tests).
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }
}

/// Control-channel handler: interrupts and shutdown signaling only.
/// Must not block.
pub struct KernelControl {
    interrupts: Arc<InterruptController>,
    shutdown_requested: Arc<AtomicBool>,
}

impl KernelControl {
    #[must_use]
    pub fn interrupts(&self) -> Arc<InterruptController> {
        Arc::clone(&self.interrupts)
    }

    /// Whether a control-channel shutdown has been requested.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

/// Composes the kernel: bridge state, session, and both handlers.
#[must_use]
pub fn build(
    config: KernelConfig,
    backend: Box<dyn DebuggerBackend>,
    iopub: Arc<dyn IoPubSession>,
) -> (KernelShell, KernelControl) {
    let guard = Arc::new(ExecutionGuard::new());
    let interrupts = Arc::new(InterruptController::new(Arc::clone(&guard)));
    let parent = ParentSlot::new();
    let bridge = BridgeHandles {
        guard: Arc::clone(&guard),
        interrupts: Arc::clone(&interrupts),
        iopub,
        parent: parent.clone(),
    };
    let session = Session::new(config, backend, bridge);
    (
        KernelShell {
            session: Arc::new(Mutex::new(session)),
            parent,
            guard,
        },
        KernelControl {
            interrupts,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        },
    )
}

#[async_trait]
impl ShellHandler for KernelShell {
    async fn execute(&mut self, header: &Header, content: ExecuteRequest) -> ExecuteReply {
        self.parent.set(header.clone());
        let session = Arc::clone(&self.session);
        let header_for_task = header.clone();
        let reply = tokio::task::spawn_blocking(move || {
            session.lock().handle_execute(&header_for_task, content)
        })
        .await
        .unwrap_or_else(|err| {
            error!(%err, "execute task failed");
            ExecuteReply::error(
                0,
                "KernelError",
                "internal error during execution",
                vec!["internal error during execution".to_string()],
            )
        });
        self.parent.clear();
        reply
    }

    async fn complete(&mut self, _header: &Header, content: CompleteRequest) -> CompleteReply {
        // Never touch the debugger while an execution is in flight.
        if self.guard.is_executing() {
            return CompleteReply::empty(content.cursor_pos);
        }
        match self.session.try_lock() {
            Some(mut session) => session.handle_complete(&content.code, content.cursor_pos),
            None => CompleteReply::empty(content.cursor_pos),
        }
    }

    async fn kernel_info(&mut self, _header: &Header) -> KernelInfoReply {
        let session = Arc::clone(&self.session);
        match tokio::task::spawn_blocking(move || session.lock().handle_kernel_info()).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(%err, "kernel_info task failed");
                let mut session = self.session.lock();
                session.handle_kernel_info()
            }
        }
    }

    async fn shutdown(&mut self, _header: &Header, content: ShutdownRequest) -> ShutdownReply {
        let session = Arc::clone(&self.session);
        let _ = tokio::task::spawn_blocking(move || session.lock().shutdown()).await;
        ShutdownReply {
            status: ReplyStatus::Ok,
            restart: content.restart,
        }
    }
}

impl ControlHandler for KernelControl {
    fn interrupt(&self, _header: &Header) -> InterruptReply {
        if self.interrupts.interrupt() {
            InterruptReply::ok()
        } else {
            InterruptReply::error("NoProcess", "no Swift process currently running")
        }
    }

    fn shutdown(&self, _header: &Header, restart: bool) -> ShutdownReply {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        ShutdownReply {
            status: ReplyStatus::Ok,
            restart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sjk_protocol::testing::LoopbackSession;
    use sjk_repl::testing::ScriptedBackend;

    #[test]
    fn interrupt_without_process_replies_no_process() {
        let iopub = Arc::new(LoopbackSession::new());
        let (_shell, control) = build(
            KernelConfig::default(),
            Box::new(ScriptedBackend::new()),
            iopub,
        );
        let reply = control.interrupt(&Header::new("interrupt_request", "s", "u"));
        assert!(matches!(reply.status, ReplyStatus::Error));
        assert_eq!(reply.ename, "NoProcess");
    }

    #[test]
    fn control_shutdown_sets_flag() {
        let iopub = Arc::new(LoopbackSession::new());
        let (_shell, control) = build(
            KernelConfig::default(),
            Box::new(ScriptedBackend::new()),
            iopub,
        );
        assert!(!control.shutdown_requested());
        let reply = control.shutdown(&Header::new("shutdown_request", "s", "u"), true);
        assert!(reply.restart);
        assert!(control.shutdown_requested());
    }
}
