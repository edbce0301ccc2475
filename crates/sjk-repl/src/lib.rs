//! Debugger-hosted Swift REPL supervision for SJK.
//!
//! This crate owns the single long-lived Swift process at the heart of
//! the kernel. It is split along the seams the kernel specification
//! draws:
//!
//! - [`debugger`] - the trait contract consumed from the native
//!   debugger's scripting API (an external collaborator; the LLDB
//!   binding implements these traits out of tree),
//! - [`ReplSupervisor`] - launches the REPL, submits code, classifies
//!   outcomes, renders expression values, extracts stack traces,
//! - [`io_bridge`] - cooperative stdout capture on a reader thread,
//!   both interrupt paths, and the completion/execution race guard,
//! - [`diagnostics`] - turning opaque debugger error strings into
//!   structured, human-readable diagnostics,
//! - [`testing`] - a fully scriptable in-memory debugger used by the
//!   test suites of every downstream crate.
//!
//! # Threading
//!
//! The debugger is treated as single-threaded: only the event loop
//! invokes evaluation, completion, or lifecycle operations. The stdout
//! pump thread uses the one API the debugger documents as safe to call
//! concurrently with evaluation (`read_stdout`), and writes only to the
//! thread-safe io-pub session.

pub mod debugger;
pub mod diagnostics;
pub mod io_bridge;
pub mod render;
mod supervisor;
pub mod testing;

pub use io_bridge::{ExecutionGuard, InterruptController, StdoutPump};
pub use supervisor::{BridgeHandles, LaunchSpec, ReplSupervisor};
