//! Buffered revocations and kill-switches.
//!
//! A control message waits here until its carrier quorum is met and the
//! chain head reaches the sequence before it. The promotion loop in
//! `service.rs` drains this pool together with the manifest candidates.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use update_protocol::{
    current_timestamp_ms, fields, hash_control_payload, parse_vrf_proof, Carrier, ChainHead, KillSwitch, Revocation,
};
use update_store::{KillSwitchEntry, LifecycleState};
use update_verifier::{check_vrf_proof, VerifyError};

use super::service::SyncInner;
use crate::algorithms::control_key;
use crate::domain::metrics;

/// Kind of control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ControlKind {
    Revoke,
    KillSwitch,
}

impl ControlKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ControlKind::Revoke => "revoke",
            ControlKind::KillSwitch => "killswitch",
        }
    }
}

/// Control message waiting for carriers or for its turn on the chain.
#[derive(Clone, Debug)]
pub(crate) struct PendingControl {
    pub(crate) key: String,
    pub(crate) kind: ControlKind,
    pub(crate) channel: String,
    pub(crate) platform: String,
    pub(crate) sequence: u64,
    pub(crate) vrf_output_hex: String,
    pub(crate) payload: Map<String, Value>,
    pub(crate) carriers: BTreeSet<Carrier>,
    pub(crate) seen_at_ms: u64,
}

impl PendingControl {
    fn in_scope(&self, channel: &str, platform: &str) -> bool {
        self.channel.trim().eq_ignore_ascii_case(channel.trim())
            && self.platform.trim().eq_ignore_ascii_case(platform.trim())
    }
}

/// Expire, then evict the oldest controls of one scope until `max_entries`
/// remain. Returns how many were dropped.
pub(crate) fn prune_controls(
    pool: &mut HashMap<String, PendingControl>,
    channel: &str,
    platform: &str,
    max_entries: usize,
    ttl_ms: u64,
    now_ms: u64,
) -> usize {
    let before = pool.len();
    if ttl_ms > 0 {
        pool.retain(|_, c| !c.in_scope(channel, platform) || c.seen_at_ms.saturating_add(ttl_ms) > now_ms);
    }
    let mut scoped: Vec<(u64, String)> = pool
        .values()
        .filter(|c| c.in_scope(channel, platform))
        .map(|c| (c.seen_at_ms, c.key.clone()))
        .collect();
    if scoped.len() > max_entries {
        scoped.sort_unstable();
        let excess = scoped.len() - max_entries;
        for (_, key) in scoped.into_iter().take(excess) {
            pool.remove(&key);
        }
    }
    before - pool.len()
}

impl SyncInner {
    pub(crate) fn count_dropped(&self, dropped: usize) {
        for _ in 0..dropped {
            self.store.increment_metric(metrics::PENDING_DROPPED);
        }
    }

    /// Whether `sequence` may wait in a pending pool under `head`.
    pub(crate) fn within_window(&self, head: &ChainHead, sequence: u64) -> bool {
        head.is_genesis() || sequence.saturating_sub(head.last_sequence) <= self.config.pending_window
    }

    /// Buffer a control message and record the carrier it came on. Returns
    /// whether it now has its carrier quorum.
    pub(crate) fn stage_control(
        &self,
        kind: ControlKind,
        payload: &Map<String, Value>,
        channel: &str,
        platform: &str,
        carrier: Carrier,
    ) -> bool {
        let sequence = match fields::sequence(payload, &["sequence"]) {
            Ok(Some(sequence)) if sequence > 0 => sequence,
            _ => {
                debug!("[update-sync] {} control has no usable sequence", kind.as_str());
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                return false;
            }
        };
        let head = self.store.vrf_chain_state(channel, platform);
        if !head.is_genesis() && sequence <= head.last_sequence {
            debug!(
                "[update-sync] {} control at {} is behind head {}",
                kind.as_str(),
                sequence,
                head.last_sequence
            );
            self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
            return false;
        }
        if !self.within_window(&head, sequence) {
            debug!(
                "[update-sync] {} control at {} is too far past head {}",
                kind.as_str(),
                sequence,
                head.last_sequence
            );
            self.count_dropped(1);
            return false;
        }
        let proof = match payload.get("vrf").map(parse_vrf_proof) {
            Some(Ok(vrf)) => check_vrf_proof(&vrf),
            _ => Err(VerifyError::VrfMissing),
        };
        let vrf_output_hex = match proof {
            Ok(output) => output,
            Err(reason) => {
                debug!("[update-sync] {} control rejected: {}", kind.as_str(), reason);
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                return false;
            }
        };

        let key = control_key(kind.as_str(), channel, platform, sequence, &hash_control_payload(payload));
        let now = current_timestamp_ms();
        let (ready, dropped) = {
            let mut session = self.session.lock();
            let pending = session
                .pending_controls
                .entry(key.clone())
                .or_insert_with(|| PendingControl {
                    key: key.clone(),
                    kind,
                    channel: channel.to_string(),
                    platform: platform.to_string(),
                    sequence,
                    vrf_output_hex,
                    payload: payload.clone(),
                    carriers: BTreeSet::new(),
                    seen_at_ms: now,
                });
            pending.carriers.insert(carrier);
            pending.seen_at_ms = now;
            let ready = self.quorum.is_met(pending.carriers.iter());
            let dropped = prune_controls(
                &mut session.pending_controls,
                channel,
                platform,
                self.config.max_pending_controls,
                self.config.pending_ttl_ms,
                now,
            );
            (ready && session.pending_controls.contains_key(&key), dropped)
        };
        self.count_dropped(dropped);
        if !ready {
            debug!("[update-sync] {} control at {} waiting for carriers", kind.as_str(), sequence);
            self.store.increment_metric(metrics::VRF_CARRIER_WAIT);
        }
        ready
    }

    /// Controls of a scope that met their carrier quorum.
    pub(crate) fn ready_controls(&self, channel: &str, platform: &str) -> Vec<PendingControl> {
        self.session
            .lock()
            .pending_controls
            .values()
            .filter(|c| c.in_scope(channel, platform) && self.quorum.is_met(c.carriers.iter()))
            .cloned()
            .collect()
    }

    /// Drop buffered controls of a scope at or below `sequence`.
    pub(crate) fn clear_controls_through(&self, channel: &str, platform: &str, sequence: u64) -> usize {
        let mut session = self.session.lock();
        let before = session.pending_controls.len();
        session
            .pending_controls
            .retain(|_, c| !c.in_scope(channel, platform) || c.sequence > sequence);
        before - session.pending_controls.len()
    }

    /// Verify a ready control against `head`, advance the chain and apply
    /// its effect. The control leaves the pool either way. Returns whether
    /// the head advanced.
    pub(crate) fn promote_control(&self, control: &PendingControl, head: &ChainHead) -> bool {
        self.session.lock().pending_controls.remove(&control.key);
        let advance = match self
            .verifier
            .verify_control_vrf(&control.payload, &control.channel, &control.platform, head)
        {
            Ok(advance) => advance,
            Err(reason) => {
                debug!(
                    "[update-sync] {} control at {} rejected: {}",
                    control.kind.as_str(),
                    control.sequence,
                    reason
                );
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                return false;
            }
        };
        self.store.set_vrf_chain_state(
            &control.channel,
            &control.platform,
            &ChainHead::at(
                advance.sequence,
                &advance.manifest_hash,
                &advance.vrf_output_hex,
                current_timestamp_ms(),
            ),
        );
        info!(
            "[update-sync] accepted {} control (seq {}) for {}|{}",
            control.kind.as_str(),
            advance.sequence,
            control.channel,
            control.platform
        );
        let payload = Value::Object(control.payload.clone());
        match control.kind {
            ControlKind::Revoke => match Revocation::parse(&payload) {
                Ok(revocation) => self.apply_revocation(&revocation),
                Err(e) => debug!("[update-sync] revocation unreadable after verification: {}", e),
            },
            ControlKind::KillSwitch => match KillSwitch::parse(&payload) {
                Ok(kill_switch) => self.apply_kill_switch(&kill_switch),
                Err(e) => debug!("[update-sync] kill-switch unreadable after verification: {}", e),
            },
        }
        true
    }

    fn revoke_current(&self, reason: &str) {
        warn!("[update-sync] current manifest revoked: {}", reason);
        self.store.clear_staged_file();
        self.store.set_state_only(LifecycleState::Revoked, Some(reason));
        self.store.increment_metric(metrics::VRF_CONTROL_APPLIED);
        self.store.increment_metric(metrics::REVOKE_APPLIED);
    }

    fn apply_revocation(&self, revocation: &Revocation) {
        for manifest_id in revocation.revoked_ids() {
            self.store.add_revoked_manifest(&manifest_id);
        }
        let current = self.store.read(|state| state.manifest.clone());
        if current.map_or(false, |m| revocation.applies_to(&m)) {
            self.revoke_current(&format!("revocation:{}", revocation.reason));
        }
    }

    fn apply_kill_switch(&self, kill_switch: &KillSwitch) {
        self.store.upsert_kill_switch(KillSwitchEntry {
            channel: kill_switch.channel.clone(),
            platform: kill_switch.platform.clone(),
            enabled: kill_switch.enabled,
            expires_at_ms: kill_switch.expires_at_ms,
            reason: kill_switch.reason.clone(),
        });
        let current = self.store.read(|state| state.manifest.clone());
        let covered = current.map_or(false, |m| {
            kill_switch.is_active(current_timestamp_ms()) && kill_switch.applies_to(&m.channel, &m.platform)
        });
        if covered {
            self.revoke_current(&format!("killswitch:{}", kill_switch.reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(key: &str, channel: &str, sequence: u64, seen_at_ms: u64) -> PendingControl {
        PendingControl {
            key: key.to_string(),
            kind: ControlKind::Revoke,
            channel: channel.to_string(),
            platform: "android".to_string(),
            sequence,
            vrf_output_hex: "a".repeat(64),
            payload: Map::new(),
            carriers: BTreeSet::from([Carrier::Gossip]),
            seen_at_ms,
        }
    }

    #[test]
    fn test_prune_controls_expires_then_evicts_oldest() {
        let mut pool: HashMap<String, PendingControl> = [
            control("a", "stable", 2, 100),
            control("b", "stable", 3, 900),
            control("c", "stable", 4, 500),
            control("d", "stable", 5, 700),
            control("z", "beta", 2, 1),
        ]
        .into_iter()
        .map(|c| (c.key.clone(), c))
        .collect();

        assert_eq!(prune_controls(&mut pool, "Stable", "android", 2, 1_000, 1_150), 2);
        let mut left: Vec<&str> = pool.keys().map(String::as_str).collect();
        left.sort_unstable();
        assert_eq!(left, vec!["b", "d", "z"]);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ControlKind::Revoke.as_str(), "revoke");
        assert_eq!(ControlKind::KillSwitch.as_str(), "killswitch");
    }
}
