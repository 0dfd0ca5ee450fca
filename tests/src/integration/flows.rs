//! # Release Flows
//!
//! Everything here goes through the real publisher, the real envelope and
//! VRF chain code, the device transport's normalization and the sync
//! orchestrator. Only the wire and the platform plugin are mocked.
//!
//! ## Scenarios
//!
//! 1. **Dual-carrier release**: a manifest is applied once both carriers saw it
//! 2. **Release stream**: consecutive publishes extend one chain on both nodes
//! 3. **Revocation**: a revoke published after a release takes it back
//! 4. **Kill-switch**: an active switch blocks the next release
//! 5. **Replay**: a re-broadcast gossip envelope is dropped
//! 6. **History gap**: a release that skips ahead waits for the missing one
//! 7. **Tampering**: an altered gossip copy never counts as a carrier
//! 8. **Early control**: a revocation relayed before its history waits, then
//!    the chain catches up through it

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use update_protocol::{Carrier, KillSwitch, Revocation};
    use update_publisher::{PublishOptions, UpdatePublisherApi};
    use update_store::{CandidateStatus, LifecycleState};
    use update_sync::{metrics, SyncConfig};

    use crate::integration::harness::{gateway_url, UpdateNetwork};

    const BOTH: [Carrier; 2] = [Carrier::Gossip, Carrier::Feed];

    // =============================================================================
    // RELEASES
    // =============================================================================

    #[tokio::test]
    async fn test_release_applied_after_both_carriers() {
        let net = UpdateNetwork::new();
        let result = net
            .publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();
        assert!(result.ok && result.pubsub_ok && result.feed_ok);

        assert_eq!(net.deliver(0, &[Carrier::Gossip]).await, 1);
        let snapshot = net.snapshot();
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::WaitingCarrier);
        assert_eq!(snapshot.vrf_candidate_carriers, BTreeSet::from([Carrier::Gossip]));
        assert!(net.applier.state().https_requests.is_empty());

        assert_eq!(net.deliver(0, &[Carrier::Feed]).await, 1);
        let snapshot = net.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("2.0.1"));
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::Confirmed);
        assert_eq!(net.metric(metrics::APPLY_SUCCESS), 1);
        assert_eq!(net.applier.state().https_requests, vec![gateway_url(1)]);

        let published = net.publisher_store.vrf_chain_state("stable", "android");
        let accepted = net.sync.store().vrf_chain_state("stable", "android");
        assert_eq!(accepted.last_sequence, 1);
        assert_eq!(accepted.last_manifest_hash, published.last_manifest_hash);
        assert_eq!(accepted.last_vrf_output_hex, published.last_vrf_output_hex);
    }

    #[tokio::test]
    async fn test_release_stream_shares_one_chain() {
        let net = UpdateNetwork::new();
        for sequence in 1..=3 {
            net.publisher
                .publish_manifest(net.manifest(sequence), PublishOptions::default())
                .await
                .unwrap();
            assert_eq!(net.deliver_pending().await, 2);
            assert_eq!(
                net.snapshot().current_version,
                Some(format!("2.0.{}", sequence))
            );
        }

        assert_eq!(net.metric(metrics::VRF_MANIFEST_ACCEPTED), 3);
        assert_eq!(net.metric(metrics::APPLY_SUCCESS), 3);
        let published = net.publisher_store.vrf_chain_state("stable", "android");
        let accepted = net.sync.store().vrf_chain_state("stable", "android");
        assert_eq!(accepted.last_sequence, 3);
        assert_eq!(accepted.last_manifest_hash, published.last_manifest_hash);
        assert_eq!(accepted.last_vrf_output_hex, published.last_vrf_output_hex);
    }

    #[tokio::test]
    async fn test_single_carrier_quorum() {
        let net = UpdateNetwork::with_sync_config(
            SyncConfig::for_testing().with_quorum(vec![Carrier::Gossip], 1),
        );
        net.publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();

        net.deliver(0, &[Carrier::Gossip]).await;
        assert_eq!(net.snapshot().state, LifecycleState::Applied);
    }

    // =============================================================================
    // CONTROL MESSAGES
    // =============================================================================

    #[tokio::test]
    async fn test_revocation_takes_back_release() {
        let net = UpdateNetwork::new();
        net.publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();
        net.deliver_pending().await;
        assert_eq!(net.snapshot().state, LifecycleState::Applied);

        let revocation = Revocation::parse(&serde_json::json!({
            "kind": "revocation_v2",
            "manifest_id": "m-1",
            "reason": "bad build"
        }))
        .unwrap();
        let result = net
            .publisher
            .publish_revoke(revocation, PublishOptions::for_scope("stable", "android"))
            .await
            .unwrap();
        assert_eq!(result.topic, "/updates/v2/stable/android/revoke");

        net.deliver(1, &[Carrier::Gossip]).await;
        assert_eq!(net.sync.waiting_control_messages(), 1);
        assert_eq!(net.snapshot().state, LifecycleState::Applied);

        net.deliver(1, &[Carrier::Feed]).await;
        let snapshot = net.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Revoked);
        assert_eq!(snapshot.last_error.as_deref(), Some("revocation:bad build"));
        assert!(net.sync.store().is_manifest_revoked("m-1"));
        assert_eq!(net.metric(metrics::REVOKE_APPLIED), 1);
        assert_eq!(net.sync.store().vrf_chain_state("stable", "android").last_sequence, 2);
    }

    #[tokio::test]
    async fn test_kill_switch_blocks_next_release() {
        let net = UpdateNetwork::new();
        let kill_switch = KillSwitch::parse(&serde_json::json!({
            "kind": "killswitch_v2",
            "enabled": true,
            "reason": "incident"
        }))
        .unwrap();
        net.publisher
            .publish_kill_switch(kill_switch, PublishOptions::for_scope("stable", "android"))
            .await
            .unwrap();
        net.deliver_pending().await;
        assert!(net.sync.store().kill_switch_active("stable", "android"));

        // Sequence 1 is taken by the switch; the publisher moves the release up.
        net.publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(net.publisher_store.vrf_chain_state("stable", "android").last_sequence, 2);
        net.deliver_pending().await;

        let snapshot = net.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Revoked);
        assert_eq!(snapshot.last_error.as_deref(), Some("killswitch active"));
        assert!(net.applier.state().https_requests.is_empty());
    }

    // =============================================================================
    // HOSTILE AND UNORDERED DELIVERY
    // =============================================================================

    #[tokio::test]
    async fn test_rebroadcast_gossip_is_dropped() {
        let net = UpdateNetwork::new();
        net.publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();
        net.deliver_pending().await;
        assert_eq!(net.metric(metrics::ANTIREPLAY_DROP), 0);

        net.deliver(0, &[Carrier::Gossip]).await;
        assert_eq!(net.metric(metrics::ANTIREPLAY_DROP), 1);
        assert_eq!(net.metric(metrics::APPLY_SUCCESS), 1);
        assert_eq!(net.snapshot().state, LifecycleState::Applied);
    }

    #[tokio::test]
    async fn test_gap_waits_for_missing_release() {
        let net = UpdateNetwork::new();
        for sequence in 1..=3 {
            net.publisher
                .publish_manifest(net.manifest(sequence), PublishOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(net.publications(), 3);

        net.deliver(0, &BOTH).await;
        net.deliver(2, &BOTH).await;
        let snapshot = net.snapshot();
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::WaitingHistory);
        assert_eq!(snapshot.current_version.as_deref(), Some("2.0.1"));
        assert_eq!(net.metric(metrics::VRF_GAP_BLOCK), 1);

        net.deliver(1, &BOTH).await;
        let snapshot = net.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("2.0.3"));
        assert_eq!(net.sync.store().vrf_chain_state("stable", "android").last_sequence, 3);
    }

    #[tokio::test]
    async fn test_control_relayed_early_is_replayed_in_order() {
        let net = UpdateNetwork::new();
        for sequence in 1..=2 {
            net.publisher
                .publish_manifest(net.manifest(sequence), PublishOptions::default())
                .await
                .unwrap();
        }
        let revocation = Revocation::parse(&serde_json::json!({
            "kind": "revocation_v2",
            "manifest_id": "m-0",
            "reason": "withdrawn"
        }))
        .unwrap();
        net.publisher
            .publish_revoke(revocation, PublishOptions::for_scope("stable", "android"))
            .await
            .unwrap();
        net.publisher
            .publish_manifest(net.manifest(4), PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(net.publisher_store.vrf_chain_state("stable", "android").last_sequence, 4);

        net.deliver(0, &BOTH).await;
        net.deliver(2, &BOTH).await;
        net.deliver(3, &BOTH).await;
        assert_eq!(net.sync.waiting_control_messages(), 1);
        assert_eq!(net.snapshot().current_version.as_deref(), Some("2.0.1"));

        net.deliver(1, &BOTH).await;
        let snapshot = net.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("2.0.4"));
        assert!(net.sync.store().is_manifest_revoked("m-0"));
        assert_eq!(net.sync.waiting_control_messages(), 0);
        assert_eq!(net.metric(metrics::VRF_VERIFY_FAIL), 0);

        let published = net.publisher_store.vrf_chain_state("stable", "android");
        let accepted = net.sync.store().vrf_chain_state("stable", "android");
        assert_eq!(accepted.last_sequence, 4);
        assert_eq!(accepted.last_manifest_hash, published.last_manifest_hash);
    }

    #[tokio::test]
    async fn test_tampered_gossip_is_not_a_carrier() {
        let net = UpdateNetwork::new();
        net.publisher
            .publish_manifest(net.manifest(1), PublishOptions::default())
            .await
            .unwrap();

        let (topic, mut wire) = net.gossip_wire(0);
        wire["payload"]["version"] = serde_json::json!("9.9.9");
        assert!(net.ingest_gossip(&topic, &wire.to_string()));
        net.process().await;
        assert_eq!(net.metric(metrics::ANTIREPLAY_DROP), 1);

        net.deliver(0, &[Carrier::Feed]).await;
        let snapshot = net.snapshot();
        assert_ne!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.vrf_candidate_carriers, BTreeSet::from([Carrier::Feed]));
        assert!(net.applier.state().https_requests.is_empty());
    }
}
