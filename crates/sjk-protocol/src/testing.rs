//! Loopback test session.
//!
//! [`LoopbackSession`] implements [`IoPubSession`] by recording every
//! published message, in publication order, in memory. Integration
//! tests assert on the recorded sequence instead of a wire transport.

use crate::{Header, IoPubSession};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// One recorded io-pub publication.
#[derive(Debug, Clone)]
pub struct Published {
    pub msg_type: String,
    pub content: Value,
    /// `msg_id` of the parent header the message was keyed to.
    pub parent_msg_id: Option<String>,
}

/// An in-memory io-pub session that records publications in order.
#[derive(Clone, Default)]
pub struct LoopbackSession {
    published: Arc<Mutex<Vec<Published>>>,
}

impl LoopbackSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All publications so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Publications of one message type, in order.
    #[must_use]
    pub fn of_type(&self, msg_type: &str) -> Vec<Published> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.msg_type == msg_type)
            .cloned()
            .collect()
    }

    /// Concatenated text of all `stream` messages for the given stream
    /// name.
    #[must_use]
    pub fn stream_text(&self, name: &str) -> String {
        self.published
            .lock()
            .iter()
            .filter(|p| p.msg_type == "stream" && p.content["name"] == name)
            .filter_map(|p| p.content["text"].as_str().map(str::to_string))
            .collect()
    }

    /// Index of the first publication whose type matches and whose
    /// content satisfies the predicate.
    pub fn position<F>(&self, msg_type: &str, predicate: F) -> Option<usize>
    where
        F: Fn(&Value) -> bool,
    {
        self.published
            .lock()
            .iter()
            .position(|p| p.msg_type == msg_type && predicate(&p.content))
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl IoPubSession for LoopbackSession {
    fn send(&self, msg_type: &str, content: Value, parent: Option<&Header>) {
        self.published.lock().push(Published {
            msg_type: msg_type.to_string(),
            content,
            parent_msg_id: parent.map(|h| h.msg_id.clone()),
        });
    }
}
