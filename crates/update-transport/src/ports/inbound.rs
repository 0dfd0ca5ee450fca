//! # Inbound Port
//!
//! What the sync engine needs from a transport.

use async_trait::async_trait;
use tokio::sync::broadcast;
use update_protocol::Scope;

use crate::domain::{ManualCheckResult, TransportMessage, TransportResult, UpdateTopics};

/// Update transport API.
#[async_trait]
pub trait UpdateTransportApi: Send + Sync {
    /// Topics of the configured scope.
    fn topics(&self) -> UpdateTopics;

    /// Configured scope.
    fn scope(&self) -> Scope;

    /// Receive every normalized message from now on.
    fn subscribe(&self) -> broadcast::Receiver<TransportMessage>;

    /// Join topics, start the event pump and the poll loop, poll once.
    async fn start(&self) -> TransportResult<()>;

    /// Stop background work and leave topics and peer feeds.
    async fn stop(&self);

    /// Strict poll reporting connectivity and messages observed meanwhile.
    async fn manual_check(&self) -> ManualCheckResult;

    /// Switch between foreground and background poll cadence.
    fn set_foreground(&self, foreground: bool);
}
