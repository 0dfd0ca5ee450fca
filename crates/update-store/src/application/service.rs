//! # Version Store Service
//!
//! Single owner of update state. Each mutation runs under one lock and is
//! broadcast to subscribers before the lock is released, so observers see
//! mutations in order. Persistence through [`StateStoragePort`] happens
//! after the state lock is released: readers never wait on the disk, and a
//! write that lost the race to a newer one is skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};
use update_protocol::{current_timestamp_ms, Carrier, ChainHead, Manifest};

use crate::config::StoreConfig;
use crate::domain::{
    hydrate_state, CandidateStatus, KillSwitchEntry, LifecycleState, PendingCandidate, ScopedVersionState,
    UpdateSnapshot, UpdateStoreState,
};
use crate::ports::StateStoragePort;

/// Persisted, observable update state.
pub struct VersionStore {
    genesis: ChainHead,
    state: Mutex<UpdateStoreState>,
    storage: Option<Arc<dyn StateStoragePort>>,
    updates: watch::Sender<UpdateStoreState>,
    /// Bumped under the state lock by every mutation.
    generation: AtomicU64,
    /// Generation last written to storage.
    persisted: Mutex<u64>,
}

impl VersionStore {
    /// Store backed by `storage`, rehydrated from it.
    pub fn new(config: StoreConfig, storage: Option<Arc<dyn StateStoragePort>>) -> Self {
        let genesis = config.genesis_head();
        let state = match storage.as_ref().map(|s| s.load()) {
            Some(Ok(Some(document))) => hydrate_state(&document, &genesis).unwrap_or_else(|| {
                warn!("[update-store] persisted state is not an object, starting fresh");
                UpdateStoreState::default()
            }),
            Some(Ok(None)) | None => UpdateStoreState::default(),
            Some(Err(e)) => {
                warn!("[update-store] failed to load persisted state: {}", e);
                UpdateStoreState::default()
            }
        };
        let (updates, _) = watch::channel(state.clone());
        Self {
            genesis,
            state: Mutex::new(state),
            storage,
            updates,
            generation: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    /// Store with no persistence.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(config, None)
    }

    /// Receive every state after each mutation. The current state is
    /// available immediately.
    pub fn subscribe(&self) -> watch::Receiver<UpdateStoreState> {
        self.updates.subscribe()
    }

    /// Copy of the whole state.
    pub fn state(&self) -> UpdateStoreState {
        self.state.lock().clone()
    }

    /// Copy of the snapshot.
    pub fn snapshot(&self) -> UpdateSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Read without copying the state.
    pub fn read<R>(&self, f: impl FnOnce(&UpdateStoreState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Configured genesis head.
    pub fn genesis(&self) -> &ChainHead {
        &self.genesis
    }

    /// Apply a mutation, persist and broadcast.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut UpdateStoreState) -> R) -> R {
        let (result, pending) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            state.snapshot.updated_at_ms = current_timestamp_ms();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let copy = state.clone();
            let pending = self.storage.is_some().then(|| (generation, copy.clone()));
            self.updates.send_replace(copy);
            (result, pending)
        };
        if let Some((generation, state)) = pending {
            self.persist(generation, &state);
        }
        result
    }

    fn persist(&self, generation: u64, state: &UpdateStoreState) {
        let Some(storage) = &self.storage else {
            return;
        };
        let mut persisted = self.persisted.lock();
        if *persisted >= generation {
            debug!("[update-store] generation {} superseded before it was written", generation);
            return;
        }
        let saved = serde_json::to_value(state)
            .map_err(Into::into)
            .and_then(|document| storage.save(&document));
        match saved {
            Ok(()) => *persisted = generation,
            Err(e) => warn!("[update-store] failed to persist state: {}", e),
        }
    }

    /// Drop all state, persisted included.
    pub fn reset(&self) {
        self.mutate(|state| *state = UpdateStoreState::default());
        debug!("[update-store] reset");
    }

    /// Start or finish a manual check.
    pub fn set_manual_check_inflight(&self, inflight: bool) {
        let now = current_timestamp_ms();
        self.mutate(|s| s.set_manual_check_inflight(inflight, now));
    }

    /// Record the manual check outcome.
    pub fn set_manual_check_reason(&self, reason: Option<&str>) {
        self.mutate(|s| s.set_manual_check_reason(reason));
    }

    /// Promotion status of the newest candidate.
    pub fn set_vrf_candidate_status(&self, status: CandidateStatus, carriers: impl IntoIterator<Item = Carrier>) {
        self.mutate(|s| s.set_vrf_candidate_status(status, carriers));
    }

    /// Record the installed package version. Blank versions are ignored.
    pub fn set_installed_version(&self, channel: &str, platform: &str, version: &str, version_code: Option<u64>) {
        if version.trim().is_empty() {
            return;
        }
        let now = current_timestamp_ms();
        self.mutate(|s| s.set_installed_version(channel, platform, version, version_code, now));
    }

    /// Make `manifest` the manifest in flight.
    pub fn set_manifest_detected(&self, manifest: &Manifest) {
        let now = current_timestamp_ms();
        self.mutate(|s| s.set_manifest_detected(manifest, now));
    }

    /// Set state and error.
    pub fn set_state_only(&self, state: LifecycleState, error: Option<&str>) {
        match state {
            LifecycleState::Failed | LifecycleState::Revoked => {
                warn!("[update-store] state -> {} ({})", state, error.unwrap_or("-"));
            }
            _ => debug!("[update-store] state -> {}", state),
        }
        self.mutate(|s| s.set_state_only(state, error));
    }

    /// Set or clear the error.
    pub fn set_last_error(&self, error: Option<&str>) {
        self.mutate(|s| s.set_last_error(error));
    }

    /// Record a positive attestor, returning the distinct count.
    pub fn add_attestor(&self, peer_id: &str) -> usize {
        self.mutate(|s| s.add_attestor(peer_id))
    }

    /// Remember the staged artifact.
    pub fn set_staged_file(&self, path: Option<&str>) {
        self.mutate(|s| s.set_staged_file(path));
    }

    /// Forget the staged artifact.
    pub fn clear_staged_file(&self) {
        self.set_staged_file(None);
    }

    /// Commit `manifest` as applied.
    pub fn mark_applied(&self, manifest: &Manifest) {
        let now = current_timestamp_ms();
        self.mutate(|s| s.mark_applied(manifest, now));
    }

    /// Highest applied sequence of a scope.
    pub fn max_applied_sequence(&self, channel: &str, platform: &str) -> u64 {
        self.read(|s| s.max_applied_sequence(channel, platform))
    }

    /// Applied version code of a scope.
    pub fn max_applied_version_code(&self, channel: &str, platform: &str) -> u64 {
        self.read(|s| s.max_applied_version_code(channel, platform))
    }

    /// Applied version record of a scope.
    pub fn scoped_version_state(&self, channel: &str, platform: &str) -> Option<ScopedVersionState> {
        self.read(|s| s.scoped_version_state(channel, platform).cloned())
    }

    /// Add a revoked manifest id.
    pub fn add_revoked_manifest(&self, manifest_id: &str) {
        self.mutate(|s| s.add_revoked_manifest(manifest_id));
    }

    /// Manifest id was revoked.
    pub fn is_manifest_revoked(&self, manifest_id: &str) -> bool {
        self.read(|s| s.is_manifest_revoked(manifest_id))
    }

    /// Insert or replace a kill-switch.
    pub fn upsert_kill_switch(&self, entry: KillSwitchEntry) {
        self.mutate(|s| s.upsert_kill_switch(entry));
    }

    /// Any kill-switch covers the scope now.
    pub fn kill_switch_active(&self, channel: &str, platform: &str) -> bool {
        let now = current_timestamp_ms();
        self.read(|s| s.kill_switch_active(channel, platform, now))
    }

    /// Add one to a counter.
    pub fn increment_metric(&self, name: &str) {
        self.mutate(|s| s.increment_metric(name, 1));
    }

    /// Counter value.
    pub fn metric(&self, name: &str) -> u64 {
        self.read(|s| s.metric(name))
    }

    /// Publisher tools may be shown.
    pub fn can_show_publisher_zone(&self, channel: &str, platform: &str) -> bool {
        self.read(|s| s.can_show_publisher_zone(channel, platform))
    }

    /// The update prompt should be shown for the scope.
    pub fn should_show_prompt(&self, channel: &str, platform: &str) -> bool {
        self.read(|s| s.should_show_prompt(channel, platform))
    }

    /// Acknowledge the update prompt.
    pub fn ack_update_prompt(&self, channel: &str, platform: &str, sequence: u64, version_code: Option<u64>) {
        self.mutate(|s| s.ack_update_prompt(channel, platform, sequence, version_code));
    }

    /// Chain head of a scope.
    pub fn vrf_chain_state(&self, channel: &str, platform: &str) -> ChainHead {
        self.read(|s| s.vrf_chain_state(channel, platform, &self.genesis))
    }

    /// Replace the chain head of a scope.
    pub fn set_vrf_chain_state(&self, channel: &str, platform: &str, next: &ChainHead) {
        let now = current_timestamp_ms();
        self.mutate(|s| s.set_vrf_chain_state(channel, platform, next, &self.genesis, now));
    }

    /// Pending candidates of a scope.
    pub fn list_pending_candidates(&self, channel: &str, platform: &str) -> Vec<PendingCandidate> {
        self.read(|s| s.list_pending_candidates(channel, platform))
    }

    /// Merge a candidate.
    pub fn upsert_pending_candidate(&self, candidate: PendingCandidate) -> PendingCandidate {
        let now = current_timestamp_ms();
        self.mutate(|s| s.upsert_pending_candidate(candidate, now))
    }

    /// Drop one candidate.
    pub fn remove_pending_candidate(&self, channel: &str, platform: &str, candidate_id: &str) {
        self.mutate(|s| s.remove_pending_candidate(channel, platform, candidate_id));
    }

    /// Drop candidates at or below a sequence, or all.
    pub fn clear_pending_candidates(&self, channel: &str, platform: &str, up_to_sequence: Option<u64>) {
        self.mutate(|s| s.clear_pending_candidates(channel, platform, up_to_sequence));
    }

    /// Expire and cap the candidate pool of a scope. Returns how many were dropped.
    pub fn prune_pending_candidates(&self, channel: &str, platform: &str, max_entries: usize, ttl_ms: u64) -> usize {
        let now = current_timestamp_ms();
        self.mutate(|s| s.prune_pending_candidates(channel, platform, max_entries, ttl_ms, now))
    }

    /// Pin the single-publisher key chain.
    pub fn set_trusted_publisher_chain(
        &self,
        publisher_pubkey: Option<&str>,
        next_pubkey_sha256: Option<&str>,
        sequence_seen: Option<u64>,
    ) {
        self.mutate(|s| s.set_trusted_publisher_chain(publisher_pubkey, next_pubkey_sha256, sequence_seen));
    }
}
