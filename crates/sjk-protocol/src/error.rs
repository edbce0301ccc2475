//! Protocol seam errors.

use thiserror::Error;

/// Errors at the protocol boundary.
///
/// These are logged and handed back to the protocol library; they
/// never terminate the kernel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A request or reply channel closed unexpectedly.
    #[error("protocol channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Content serialization failed.
    #[error("content serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
