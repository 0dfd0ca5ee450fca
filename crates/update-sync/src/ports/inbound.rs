//! # Inbound Port
//!
//! What a host app drives the update engine through.

use async_trait::async_trait;
use tokio::sync::watch;
use update_store::{UpdateSnapshot, UpdateStoreState};
use update_transport::TransportMessage;

use crate::domain::SyncError;

/// Update sync API.
#[async_trait]
pub trait UpdateSyncApi: Send + Sync {
    /// Record the installed version, start the transport and resume any
    /// staged or pending install.
    async fn start(&self) -> Result<(), SyncError>;

    /// Stop the transport and forget per-session dedupe state.
    async fn stop(&self);

    /// Process one normalized transport message.
    async fn handle_message(&self, message: &TransportMessage);

    /// Time-boxed transport check followed by a promotion pass.
    async fn manual_check(&self) -> UpdateSnapshot;

    /// Re-read the installed package version into the store.
    async fn sync_installed_version_now(&self, channel: Option<&str>, platform: Option<&str>);

    /// Open the platform store page.
    async fn trigger_store_upgrade(&self, app_store_url: Option<&str>, test_flight_url: Option<&str>) -> bool;

    /// App moved between foreground and background.
    async fn set_foreground(&self, foreground: bool);

    /// Current snapshot.
    fn snapshot(&self) -> UpdateSnapshot;

    /// Every store change from now on.
    fn subscribe(&self) -> watch::Receiver<UpdateStoreState>;
}
