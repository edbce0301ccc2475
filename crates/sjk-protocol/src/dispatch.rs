//! Request dispatch to named handlers.
//!
//! The kernel-protocol library parses wire messages and delivers them
//! as request records on two channels. Each channel has its own
//! dispatcher task:
//!
//! ```text
//! shell socket ──► mpsc ──► ShellDispatcher ──► ShellHandler (owns Session)
//! control socket ► mpsc ──► ControlDispatcher ► ControlHandler (interrupts)
//! ```
//!
//! The shell dispatcher runs the handler to completion per request, so
//! a long `execute_request` suspends the shell loop; the control
//! dispatcher keeps running on its own task, which is what makes
//! message-based interrupts live during execution.

use crate::{
    CompleteReply, CompleteRequest, ExecuteReply, ExecuteRequest, Header, InterruptReply,
    KernelInfoReply, ShutdownReply, ShutdownRequest,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Parsed request delivered on the shell channel.
#[derive(Debug, Clone)]
pub enum ShellRequest {
    Execute {
        header: Header,
        content: ExecuteRequest,
    },
    Complete {
        header: Header,
        content: CompleteRequest,
    },
    KernelInfo {
        header: Header,
    },
    Shutdown {
        header: Header,
        content: ShutdownRequest,
    },
}

/// Parsed request delivered on the control channel.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    Interrupt {
        header: Header,
    },
    Shutdown {
        header: Header,
        content: ShutdownRequest,
    },
}

/// Reply produced by the shell dispatcher, tagged with its parent.
#[derive(Debug, Clone)]
pub enum ShellReply {
    Execute(Header, ExecuteReply),
    Complete(Header, CompleteReply),
    KernelInfo(Header, KernelInfoReply),
    Shutdown(Header, ShutdownReply),
}

/// Reply produced by the control dispatcher.
#[derive(Debug, Clone)]
pub enum ControlReply {
    Interrupt(Header, InterruptReply),
    Shutdown(Header, ShutdownReply),
}

/// Named handlers for shell-channel requests.
///
/// The handler owns the session state; the dispatcher guarantees
/// requests are handled one at a time, in arrival order.
#[async_trait]
pub trait ShellHandler: Send {
    async fn execute(&mut self, header: &Header, content: ExecuteRequest) -> ExecuteReply;
    async fn complete(&mut self, header: &Header, content: CompleteRequest) -> CompleteReply;
    async fn kernel_info(&mut self, header: &Header) -> KernelInfoReply;
    async fn shutdown(&mut self, header: &Header, content: ShutdownRequest) -> ShutdownReply;
}

/// Named handlers for control-channel requests.
///
/// Handlers must not block: they run concurrently with shell handling
/// and are the interrupt path of last resort.
pub trait ControlHandler: Send + Sync {
    fn interrupt(&self, header: &Header) -> InterruptReply;
    fn shutdown(&self, header: &Header, restart: bool) -> ShutdownReply;
}

/// Creates a bounded shell channel plus its dispatcher and reply
/// stream.
#[must_use]
pub fn shell_channel(
    capacity: usize,
) -> (
    mpsc::Sender<ShellRequest>,
    ShellDispatcher,
    mpsc::UnboundedReceiver<ShellReply>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        tx,
        ShellDispatcher {
            rx,
            replies: reply_tx,
        },
        reply_rx,
    )
}

/// Creates a bounded control channel plus its dispatcher and reply
/// stream.
#[must_use]
pub fn control_channel(
    capacity: usize,
) -> (
    mpsc::Sender<ControlRequest>,
    ControlDispatcher,
    mpsc::UnboundedReceiver<ControlReply>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        tx,
        ControlDispatcher {
            rx,
            replies: reply_tx,
        },
        reply_rx,
    )
}

/// Dispatches shell requests to a [`ShellHandler`], one at a time.
///
/// With one exception: while an `execute_request` is in flight, an
/// incoming `complete_request` is answered immediately with an empty
/// match list instead of queuing behind the execution. Completion must
/// never block on, nor touch, a busy debugger. All other requests
/// received mid-execute are buffered and handled afterwards in order.
pub struct ShellDispatcher {
    rx: mpsc::Receiver<ShellRequest>,
    replies: mpsc::UnboundedSender<ShellReply>,
}

impl ShellDispatcher {
    /// Runs until the request channel closes or a shutdown request is
    /// handled.
    pub async fn run<H: ShellHandler>(mut self, handler: &mut H) {
        let mut buffered: std::collections::VecDeque<ShellRequest> =
            std::collections::VecDeque::new();
        loop {
            let request = match buffered.pop_front() {
                Some(request) => request,
                None => match self.rx.recv().await {
                    Some(request) => request,
                    None => break,
                },
            };
            let stop = matches!(request, ShellRequest::Shutdown { .. });
            let reply = match request {
                ShellRequest::Execute { header, content } => {
                    debug!(msg_id = %header.msg_id, "dispatching execute_request");
                    let rx = &mut self.rx;
                    let replies = &self.replies;
                    let handler_header = header.clone();
                    let fut = handler.execute(&handler_header, content);
                    tokio::pin!(fut);
                    let mut rx_closed = false;
                    let reply = loop {
                        tokio::select! {
                            reply = &mut fut => break reply,
                            incoming = rx.recv(), if !rx_closed => match incoming {
                                Some(ShellRequest::Complete { header, content }) => {
                                    debug!("complete_request during execution; replying empty");
                                    let _ = replies.send(ShellReply::Complete(
                                        header,
                                        CompleteReply::empty(content.cursor_pos),
                                    ));
                                }
                                Some(other) => buffered.push_back(other),
                                None => rx_closed = true,
                            }
                        }
                    };
                    ShellReply::Execute(header, reply)
                }
                ShellRequest::Complete { header, content } => {
                    let reply = handler.complete(&header, content).await;
                    ShellReply::Complete(header, reply)
                }
                ShellRequest::KernelInfo { header } => {
                    let reply = handler.kernel_info(&header).await;
                    ShellReply::KernelInfo(header, reply)
                }
                ShellRequest::Shutdown { header, content } => {
                    info!(restart = content.restart, "dispatching shutdown_request");
                    let reply = handler.shutdown(&header, content).await;
                    ShellReply::Shutdown(header, reply)
                }
            };
            if self.replies.send(reply).is_err() {
                break;
            }
            if stop {
                break;
            }
        }
    }
}

/// Dispatches control requests to a [`ControlHandler`].
pub struct ControlDispatcher {
    rx: mpsc::Receiver<ControlRequest>,
    replies: mpsc::UnboundedSender<ControlReply>,
}

impl ControlDispatcher {
    /// Runs until the request channel closes or a shutdown request is
    /// handled.
    pub async fn run<H: ControlHandler>(mut self, handler: &H) {
        while let Some(request) = self.rx.recv().await {
            let stop = matches!(request, ControlRequest::Shutdown { .. });
            let reply = match request {
                ControlRequest::Interrupt { header } => {
                    debug!(msg_id = %header.msg_id, "dispatching interrupt_request");
                    let reply = handler.interrupt(&header);
                    ControlReply::Interrupt(header, reply)
                }
                ControlRequest::Shutdown { header, content } => {
                    let reply = handler.shutdown(&header, content.restart);
                    ControlReply::Shutdown(header, reply)
                }
            };
            if self.replies.send(reply).is_err() {
                break;
            }
            if stop {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplyStatus;

    struct EchoHandler;

    #[async_trait]
    impl ShellHandler for EchoHandler {
        async fn execute(&mut self, _header: &Header, _content: ExecuteRequest) -> ExecuteReply {
            ExecuteReply::ok(1)
        }

        async fn complete(&mut self, _header: &Header, content: CompleteRequest) -> CompleteReply {
            CompleteReply::empty(content.cursor_pos)
        }

        async fn kernel_info(&mut self, _header: &Header) -> KernelInfoReply {
            unimplemented!("not exercised")
        }

        async fn shutdown(&mut self, _header: &Header, content: ShutdownRequest) -> ShutdownReply {
            ShutdownReply {
                status: ReplyStatus::Ok,
                restart: content.restart,
            }
        }
    }

    struct NoProcessControl;

    impl ControlHandler for NoProcessControl {
        fn interrupt(&self, _header: &Header) -> InterruptReply {
            InterruptReply::error("NoProcess", "no Swift process currently running")
        }

        fn shutdown(&self, _header: &Header, restart: bool) -> ShutdownReply {
            ShutdownReply {
                status: ReplyStatus::Ok,
                restart,
            }
        }
    }

    #[tokio::test]
    async fn shell_dispatch_replies_in_order() {
        let (tx, dispatcher, mut replies) = shell_channel(8);
        tx.send(ShellRequest::Execute {
            header: Header::new("execute_request", "s", "u"),
            content: ExecuteRequest::code("print(1)"),
        })
        .await
        .unwrap();
        tx.send(ShellRequest::Shutdown {
            header: Header::new("shutdown_request", "s", "u"),
            content: ShutdownRequest { restart: false },
        })
        .await
        .unwrap();

        let mut handler = EchoHandler;
        dispatcher.run(&mut handler).await;

        assert!(matches!(replies.recv().await, Some(ShellReply::Execute(..))));
        match replies.recv().await {
            Some(ShellReply::Shutdown(_, reply)) => {
                assert!(matches!(reply.status, ReplyStatus::Ok));
                assert!(!reply.restart);
            }
            other => panic!("expected shutdown reply, got {other:?}"),
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl ShellHandler for SlowHandler {
        async fn execute(&mut self, _header: &Header, _content: ExecuteRequest) -> ExecuteReply {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            ExecuteReply::ok(1)
        }

        async fn complete(&mut self, _header: &Header, content: CompleteRequest) -> CompleteReply {
            // Only reached when no execution is in flight.
            CompleteReply {
                status: ReplyStatus::Ok,
                matches: vec!["handled".to_string()],
                cursor_start: 0,
                cursor_end: content.cursor_pos,
                metadata: Default::default(),
            }
        }

        async fn kernel_info(&mut self, _header: &Header) -> KernelInfoReply {
            unimplemented!("not exercised")
        }

        async fn shutdown(&mut self, _header: &Header, content: ShutdownRequest) -> ShutdownReply {
            ShutdownReply {
                status: ReplyStatus::Ok,
                restart: content.restart,
            }
        }
    }

    #[tokio::test]
    async fn complete_during_execute_returns_empty_before_execute_reply() {
        let (tx, dispatcher, mut replies) = shell_channel(8);
        tx.send(ShellRequest::Execute {
            header: Header::new("execute_request", "s", "u"),
            content: ExecuteRequest::code("while true {}"),
        })
        .await
        .unwrap();

        let dispatch = tokio::spawn(async move {
            let mut handler = SlowHandler;
            dispatcher.run(&mut handler).await;
        });

        // Let the execute begin, then race a completion.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(ShellRequest::Complete {
            header: Header::new("complete_request", "s", "u"),
            content: CompleteRequest {
                code: "x.".to_string(),
                cursor_pos: 2,
            },
        })
        .await
        .unwrap();

        // The complete reply must arrive first, and be empty.
        match replies.recv().await {
            Some(ShellReply::Complete(_, reply)) => {
                assert!(reply.matches.is_empty());
                assert_eq!(reply.cursor_start, 2);
            }
            other => panic!("expected racing complete reply first, got {other:?}"),
        }
        assert!(matches!(replies.recv().await, Some(ShellReply::Execute(..))));

        drop(tx);
        dispatch.await.unwrap();
    }

    #[tokio::test]
    async fn control_dispatch_interrupt() {
        let (tx, dispatcher, mut replies) = control_channel(8);
        tx.send(ControlRequest::Interrupt {
            header: Header::new("interrupt_request", "s", "u"),
        })
        .await
        .unwrap();
        drop(tx);

        dispatcher.run(&NoProcessControl).await;
        match replies.recv().await {
            Some(ControlReply::Interrupt(_, reply)) => {
                assert!(matches!(reply.status, ReplyStatus::Error));
                assert_eq!(reply.ename, "NoProcess");
            }
            other => panic!("expected interrupt reply, got {other:?}"),
        }
    }
}
