//! Outbound chat sink shared by the log forwarder and command replies.

use async_trait::async_trait;

use crate::common::error::RelayResult;

/// Destination for relay output.
///
/// Implementations must accept concurrent calls; each call delivers one
/// whole message.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: &str) -> RelayResult<()>;
}
