//! # Inbound Port
//!
//! What an admin surface drives the publisher through.

use async_trait::async_trait;
use update_protocol::{KillSwitch, Manifest, Revocation};

use crate::domain::{PublishOptions, PublishResult, PublisherResult};

/// Update publishing API.
#[async_trait]
pub trait UpdatePublisherApi: Send + Sync {
    /// Seal `manifest` onto the scope chain and publish it. The chain head
    /// advances when gossip accepts it.
    async fn publish_manifest(&self, manifest: Manifest, options: PublishOptions) -> PublisherResult<PublishResult>;

    /// Seal and publish a revocation.
    async fn publish_revoke(&self, revocation: Revocation, options: PublishOptions) -> PublisherResult<PublishResult>;

    /// Seal and publish a kill-switch.
    async fn publish_kill_switch(&self, kill_switch: KillSwitch, options: PublishOptions) -> PublisherResult<PublishResult>;
}
