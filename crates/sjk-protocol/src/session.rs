//! The io-pub publishing seam and the shared parent-header slot.

use crate::{
    ClearOutput, DisplayData, ErrorContent, ExecuteResult, Header, StreamContent, StreamName,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Session object supplied by the kernel-protocol library.
///
/// `send` signs the message and publishes it on the io-pub channel;
/// the SJK core never constructs wire frames itself. Implementations
/// must be callable from the stdout pump thread concurrently with the
/// event loop, hence `Send + Sync`.
pub trait IoPubSession: Send + Sync {
    /// Publishes a signed io-pub message.
    fn send(&self, msg_type: &str, content: Value, parent: Option<&Header>);

    /// Publishes a `stream` message.
    fn stream(&self, name: StreamName, text: &str, parent: Option<&Header>) {
        let content = StreamContent {
            name,
            text: text.to_string(),
        };
        match serde_json::to_value(&content) {
            Ok(value) => self.send("stream", value, parent),
            Err(err) => warn!(%err, "failed to serialize stream content"),
        }
    }

    /// Publishes an `execute_result` message.
    fn execute_result(&self, result: &ExecuteResult, parent: Option<&Header>) {
        match serde_json::to_value(result) {
            Ok(value) => self.send("execute_result", value, parent),
            Err(err) => warn!(%err, "failed to serialize execute_result"),
        }
    }

    /// Publishes a `display_data` message.
    fn display_data(&self, data: &DisplayData, parent: Option<&Header>) {
        match serde_json::to_value(data) {
            Ok(value) => self.send("display_data", value, parent),
            Err(err) => warn!(%err, "failed to serialize display_data"),
        }
    }

    /// Publishes an `error` message.
    fn error(&self, content: &ErrorContent, parent: Option<&Header>) {
        match serde_json::to_value(content) {
            Ok(value) => self.send("error", value, parent),
            Err(err) => warn!(%err, "failed to serialize error content"),
        }
    }

    /// Publishes a `clear_output` message.
    fn clear_output(&self, wait: bool, parent: Option<&Header>) {
        match serde_json::to_value(ClearOutput { wait }) {
            Ok(value) => self.send("clear_output", value, parent),
            Err(err) => warn!(%err, "failed to serialize clear_output"),
        }
    }
}

/// Shared handle to the current parent header.
///
/// The adapter sets the slot when it starts handling a request and
/// clears it afterwards; the stdout pump reads it so stream output is
/// keyed to the currently executing cell.
#[derive(Clone, Default)]
pub struct ParentSlot(Arc<Mutex<Option<Header>>>);

impl ParentSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the header of the request now being handled.
    pub fn set(&self, header: Header) {
        *self.0.lock() = Some(header);
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    /// Snapshot of the current parent header, if any.
    #[must_use]
    pub fn current(&self) -> Option<Header> {
        self.0.lock().clone()
    }
}

impl std::fmt::Debug for ParentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentSlot")
            .field("set", &self.0.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_slot_set_and_clear() {
        let slot = ParentSlot::new();
        assert!(slot.current().is_none());

        let header = Header::new("execute_request", "s", "u");
        slot.set(header.clone());
        assert_eq!(slot.current().unwrap().msg_id, header.msg_id);

        slot.clear();
        assert!(slot.current().is_none());
    }

    #[test]
    fn parent_slot_clones_share_state() {
        let slot = ParentSlot::new();
        let other = slot.clone();
        slot.set(Header::new("execute_request", "s", "u"));
        assert!(other.current().is_some());
    }
}
