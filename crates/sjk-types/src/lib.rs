//! Core types for the SJK Swift kernel.
//!
//! This crate holds the data model shared by every other SJK crate:
//! cells, magic directives, execution outcomes, diagnostics, and
//! installed-package records.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Model Layer                            │
//! │  sjk-types    : Cell, MagicDirective, ExecutionOutcome ◄──  │
//! │  sjk-protocol : Jupyter message records, io-pub seam        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      Runtime Layer                          │
//! │  sjk-repl     : debugger seam, supervisor, I/O bridge       │
//! │  sjk-install  : package installer                           │
//! │  sjk-kernel   : preprocessor, adapter, session              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      Frontend Layer                         │
//! │  sjk-cli      : binary, console harness                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design
//!
//! Execution outcomes are a tagged variant, not a class hierarchy: the
//! kernel converts every user-visible failure into a value and never
//! unwinds across a component boundary. Diagnostics carry a short name,
//! a cleaned message, optional stack frames, and *additive* hints that
//! strict tooling can strip.

mod cell;
mod code;
mod diagnostic;
mod magic;
mod outcome;
mod package;

pub use cell::Cell;
pub use code::DiagnosticCode;
pub use diagnostic::{Diagnostic, Severity, StackFrame};
pub use magic::{MagicDirective, PackageRequest};
pub use outcome::{ExecutionOutcome, ValueChild, ValueDescription};
pub use package::{InstallErrorKind, InstalledPackage};
