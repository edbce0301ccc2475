//! Message headers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Jupyter messaging protocol version implemented by the kernel.
pub const PROTOCOL_VERSION: &str = "5.4";

/// A Jupyter message header.
///
/// Headers identify messages and, as parent headers, tie published
/// io-pub messages to the request that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: String,
    pub msg_type: String,
    pub session: String,
    pub username: String,
    pub date: DateTime<Utc>,
    pub version: String,
}

impl Header {
    /// Creates a header with a fresh message id.
    #[must_use]
    pub fn new(
        msg_type: impl Into<String>,
        session: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            session: session.into(),
            username: username.into(),
            date: Utc::now(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids() {
        let a = Header::new("execute_request", "s", "user");
        let b = Header::new("execute_request", "s", "user");
        assert_ne!(a.msg_id, b.msg_id);
        assert_eq!(a.version, PROTOCOL_VERSION);
    }

    #[test]
    fn header_roundtrips_through_json() {
        let header = Header::new("kernel_info_request", "session-1", "user");
        let json = serde_json::to_string(&header).unwrap();
        let back: Header = serde_json::from_str(&json).unwrap();
        assert_eq!(header, back);
    }
}
