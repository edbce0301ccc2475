//! The SJK kernel core.
//!
//! Ties the pieces together: the [`Session`] composition root owns the
//! REPL supervisor, the package installer, and the session state
//! (counter, history, declaration tracker); the [`preprocess`] module
//! splits magics from Swift through a closed dispatch table; the
//! [`adapter`] binds both to the protocol seam's shell and control
//! handlers.
//!
//! # Control flow for one cell
//!
//! ```text
//! execute_request ─► adapter ─► preprocessor ─┬─► installer (install cells)
//!                                             └─► supervisor (Swift)
//!                                  stdout pump ──► io-pub (concurrent)
//!                    adapter ◄─ outcome ◄─ diagnostic formatter
//! ```

pub mod adapter;
pub mod config;
pub mod preprocess;
pub mod session;

pub use adapter::{build, KernelControl, KernelShell};
pub use config::{KernelConfig, SetupState};
pub use session::{HistoryEntry, Session};
