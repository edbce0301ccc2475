//! Message content records.
//!
//! These mirror the content dictionaries of the Jupyter messaging
//! protocol for the message types the kernel handles or publishes.
//! The wire library owns framing and signing; these records only shape
//! the `content` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reply status shared by all reply records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// `execute_request` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
    #[serde(default)]
    pub allow_stdin: bool,
}

fn default_true() -> bool {
    true
}

impl ExecuteRequest {
    /// A plain, non-silent request (the common case in tests).
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            allow_stdin: false,
        }
    }
}

/// `execute_reply` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    pub execution_count: u32,
    #[serde(default)]
    pub ename: String,
    #[serde(default)]
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

impl ExecuteReply {
    #[must_use]
    pub fn ok(execution_count: u32) -> Self {
        Self {
            status: ReplyStatus::Ok,
            execution_count,
            ename: String::new(),
            evalue: String::new(),
            traceback: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(
        execution_count: u32,
        ename: impl Into<String>,
        evalue: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        Self {
            status: ReplyStatus::Error,
            execution_count,
            ename: ename.into(),
            evalue: evalue.into(),
            traceback,
        }
    }
}

/// `complete_request` content. `cursor_pos` is measured in Unicode
/// code points, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
    pub cursor_pos: usize,
}

/// `complete_reply` content. Cursor bounds are code points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReply {
    pub status: ReplyStatus,
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CompleteReply {
    /// The empty reply used when completion is unavailable or racing
    /// an execution.
    #[must_use]
    pub fn empty(cursor_pos: usize) -> Self {
        Self {
            status: ReplyStatus::Ok,
            matches: Vec::new(),
            cursor_start: cursor_pos,
            cursor_end: cursor_pos,
            metadata: Map::new(),
        }
    }
}

/// `language_info` of the kernel-info reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub file_extension: String,
    pub pygments_lexer: String,
    pub codemirror_mode: String,
}

/// One entry of `help_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

/// `kernel_info_reply` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelInfoReply {
    pub status: ReplyStatus,
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub banner: String,
    #[serde(default)]
    pub help_links: Vec<HelpLink>,
}

/// `interrupt_reply` content (control channel, Protocol 5.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub ename: String,
    #[serde(default)]
    pub evalue: String,
}

impl InterruptReply {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            ename: String::new(),
            evalue: String::new(),
        }
    }

    #[must_use]
    pub fn error(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            ename: ename.into(),
            evalue: evalue.into(),
        }
    }
}

/// `shutdown_request` content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default)]
    pub restart: bool,
}

/// `shutdown_reply` content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShutdownReply {
    pub status: ReplyStatus,
    pub restart: bool,
}

/// Stream name for `stream` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// `stream` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamContent {
    pub name: StreamName,
    pub text: String,
}

/// `execute_result` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub execution_count: u32,
    /// Mimetype to content, e.g. `text/plain` and `text/html`.
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// `display_data` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayData {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub transient: Map<String, Value>,
}

/// `error` content published on io-pub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContent {
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}

/// `clear_output` content, emitted when the stdout stream contains the
/// ANSI clear-screen sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClearOutput {
    pub wait: bool,
}
