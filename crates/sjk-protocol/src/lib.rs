//! Kernel-protocol seam for SJK.
//!
//! The Jupyter wire protocol itself (ZeroMQ sockets, HMAC signing,
//! heartbeat) is supplied by an external kernel-protocol library. This
//! crate defines the boundary the SJK core consumes from it:
//!
//! - parsed request records delivered on shell and control channels
//!   ([`ShellRequest`], [`ControlRequest`]) and routed to named
//!   handlers ([`ShellHandler`], [`ControlHandler`]),
//! - a session object that signs and publishes io-pub messages
//!   ([`IoPubSession`]),
//! - a handle to the current parent header for use by the stdout
//!   thread ([`ParentSlot`]).
//!
//! # Channel separation
//!
//! Shell and control requests arrive on distinct channels and are
//! dispatched by distinct tasks. This is load-bearing: the control
//! channel must keep servicing `interrupt_request` while an
//! `execute_request` holds the shell loop (Protocol 5.4
//! `interrupt_mode = "message"`).
//!
//! # Testing
//!
//! [`testing`] provides a loopback session that records published
//! messages in order, so ordering guarantees are assertable without a
//! wire transport.

mod content;
mod dispatch;
mod error;
mod header;
mod session;
pub mod testing;

pub use content::{
    ClearOutput, CompleteReply, CompleteRequest, DisplayData, ErrorContent, ExecuteRequest,
    ExecuteReply, ExecuteResult, HelpLink, InterruptReply, KernelInfoReply, LanguageInfo,
    ReplyStatus, ShutdownReply, ShutdownRequest, StreamContent, StreamName,
};
pub use dispatch::{
    control_channel, shell_channel, ControlDispatcher, ControlHandler, ControlReply,
    ControlRequest, ShellDispatcher, ShellHandler, ShellReply, ShellRequest,
};
pub use error::ProtocolError;
pub use header::{Header, PROTOCOL_VERSION};
pub use session::{IoPubSession, ParentSlot};
