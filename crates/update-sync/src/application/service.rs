//! # Update Sync Service
//!
//! Per-scope state machine tying transport, verifier, store and applier
//! together.
//!
//! ## Manifest flow
//!
//! 1. Envelope checks, then the manifest must be a `vrf_chain_v1` manifest
//!    with a VRF block.
//! 2. The manifest joins the pending-candidate pool; carriers are unioned.
//! 3. Once the carrier quorum is met, the promotion loop runs: only the
//!    head's next sequence may promote, forks resolve to the smallest VRF
//!    output, the winner must pass chain and rollback checks.
//! 4. A promoted manifest goes through rollout gating and the
//!    download / stage / apply pipeline in `pipeline.rs`.
//!
//! Revocations and kill-switches need the same carrier quorum, keyed by
//! payload hash, and consume a chain sequence of their own. They wait in a
//! session pool (`controls.rs`) and promote through the same loop, so a
//! control that arrives early applies once the head reaches it and a
//! manifest that waited on the control promotes right after.
//!
//! Both pools are bounded: entries too far past the head are turned away,
//! stale ones expire, and the oldest are evicted past the per-scope cap.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use update_protocol::{
    current_timestamp_ms, fields, hash_manifest_for_chain, normalize_version_code, parse_manifest, Attestation, Carrier,
    ChainHead, Envelope, KillSwitch, Manifest, Revocation, Scope, SecurityMode, TopicKind,
};
use update_store::{CandidateStatus, LifecycleState, PendingCandidate, UpdateSnapshot, UpdateStoreState, VersionStore};
use update_transport::{ConnectivityReason, ManualCheckResult, TransportMessage, UpdateTransportApi};
use update_verifier::{
    check_vrf_proof, resolve_sequence_conflict, should_enter_rollout, UpdateVerificationApi, VerifyError,
    VersionBaseline,
};

use super::controls::{ControlKind, PendingControl};
use crate::algorithms::CarrierQuorum;
use crate::config::SyncConfig;
use crate::domain::{metrics, SyncError};
use crate::ports::{UpdateApplier, UpdateSyncApi};

const WAITING_HISTORY: &str = "waiting_history";

/// Per-session bookkeeping that is not persisted.
#[derive(Default)]
pub(crate) struct SessionState {
    /// Manifest whose native install is running.
    pub(crate) pending_install: Option<String>,
    /// Manifest waiting on user confirmation.
    pub(crate) user_action_required: Option<String>,
    /// Control messages waiting for carriers or history, by dedupe key.
    pub(crate) pending_controls: HashMap<String, PendingControl>,
}

pub(crate) struct SyncInner {
    pub(crate) config: SyncConfig,
    pub(crate) quorum: CarrierQuorum,
    pub(crate) scope: Scope,
    pub(crate) store: Arc<VersionStore>,
    pub(crate) verifier: Arc<dyn UpdateVerificationApi>,
    pub(crate) transport: Arc<dyn UpdateTransportApi>,
    pub(crate) applier: Arc<dyn UpdateApplier>,
    pub(crate) session: Mutex<SessionState>,
    pub(crate) download_in_flight: AtomicBool,
    pub(crate) foreground: AtomicBool,
    promotion: tokio::sync::Mutex<()>,
}

/// Update sync orchestrator.
pub struct UpdateSyncService {
    inner: Arc<SyncInner>,
    started: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateSyncService {
    /// Orchestrator for the transport's scope.
    pub fn new(
        config: SyncConfig,
        store: Arc<VersionStore>,
        verifier: Arc<dyn UpdateVerificationApi>,
        transport: Arc<dyn UpdateTransportApi>,
        applier: Arc<dyn UpdateApplier>,
    ) -> Self {
        let quorum = CarrierQuorum::new(&config.required_carriers, config.carrier_quorum);
        let scope = transport.scope();
        Self {
            inner: Arc::new(SyncInner {
                config,
                quorum,
                scope,
                store,
                verifier,
                transport,
                applier,
                session: Mutex::new(SessionState::default()),
                download_in_flight: AtomicBool::new(false),
                foreground: AtomicBool::new(true),
                promotion: tokio::sync::Mutex::new(()),
            }),
            started: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<VersionStore> {
        &self.inner.store
    }

    /// Scope this orchestrator follows.
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Service is started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Manifest whose native install is still running.
    pub fn pending_install_manifest_id(&self) -> Option<String> {
        self.inner.session.lock().pending_install.clone()
    }

    /// Manifest waiting on user confirmation.
    pub fn user_action_required_manifest_id(&self) -> Option<String> {
        self.inner.session.lock().user_action_required.clone()
    }

    /// Control messages still waiting for carrier quorum or chain history.
    pub fn waiting_control_messages(&self) -> usize {
        self.inner.session.lock().pending_controls.len()
    }

    /// Retry the download / apply pipeline for the manifest in flight.
    pub async fn retry_apply(&self) {
        self.inner.maybe_download_and_apply().await;
    }

    fn abort_pump(&self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for UpdateSyncService {
    fn drop(&mut self) {
        self.abort_pump();
    }
}

#[async_trait]
impl UpdateSyncApi for UpdateSyncService {
    async fn start(&self) -> Result<(), SyncError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = &self.inner;
        let (channel, platform) = (inner.scope.channel.clone(), inner.scope.platform.clone());
        inner.refresh_installed_version(&channel, &platform).await;
        inner.store.clear_pending_candidates(&channel, &platform, None);
        inner.store.set_vrf_candidate_status(CandidateStatus::None, Vec::new());

        let mut messages = inner.transport.subscribe();
        let pump_inner = Arc::clone(inner);
        let pump = tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => pump_inner.handle_message(&message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[update-sync] message pump lagged, {} messages skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *self.pump.lock() = Some(pump);

        if let Err(e) = inner.transport.start().await {
            warn!("[update-sync] transport failed to start: {}", e);
            self.abort_pump();
            self.started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        inner.reconcile_install_result().await;
        inner.maybe_download_and_apply().await;
        info!("[update-sync] started for {}", inner.scope);
        Ok(())
    }

    async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.abort_pump();
        self.inner.transport.stop().await;
        self.inner.session.lock().pending_controls.clear();
        info!("[update-sync] stopped for {}", self.inner.scope);
    }

    async fn handle_message(&self, message: &TransportMessage) {
        self.inner.handle_message(message).await;
    }

    async fn manual_check(&self) -> UpdateSnapshot {
        let inner = &self.inner;
        inner.store.set_manual_check_inflight(true);
        let outcome = match self.start().await {
            Ok(()) => inner.run_manual_check().await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            let reason = e.to_string();
            warn!("[update-sync] manual check failed: {}", reason);
            inner.store.set_manual_check_reason(Some(&reason));
            inner.store.set_last_error(Some(&format!("manual_check_failed:{}", reason)));
        }
        inner.store.set_manual_check_inflight(false);
        inner.store.snapshot()
    }

    async fn sync_installed_version_now(&self, channel: Option<&str>, platform: Option<&str>) {
        let snapshot = self.inner.store.snapshot();
        let pick = |explicit: Option<&str>, current: &str, fallback: &str| {
            explicit
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| Some(current.trim()).filter(|v| !v.is_empty()))
                .unwrap_or(fallback)
                .to_string()
        };
        let channel = pick(channel, &snapshot.channel, &self.inner.scope.channel);
        let platform = pick(platform, &snapshot.platform, &self.inner.scope.platform);
        self.inner.refresh_installed_version(&channel, &platform).await;
    }

    async fn trigger_store_upgrade(&self, app_store_url: Option<&str>, test_flight_url: Option<&str>) -> bool {
        match self.inner.applier.open_store_upgrade(app_store_url, test_flight_url).await {
            Ok(opened) => opened,
            Err(e) => {
                debug!("[update-sync] store upgrade unavailable: {}", e);
                false
            }
        }
    }

    async fn set_foreground(&self, foreground: bool) {
        self.inner.foreground.store(foreground, Ordering::SeqCst);
        self.inner.transport.set_foreground(foreground);
        if !foreground {
            self.inner.maybe_download_and_apply().await;
        }
    }

    fn snapshot(&self) -> UpdateSnapshot {
        self.inner.store.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<UpdateStoreState> {
        self.inner.store.subscribe()
    }
}

impl SyncInner {
    pub(crate) async fn handle_message(&self, message: &TransportMessage) {
        let unreachable = ConnectivityReason::NetworkUnreachable.as_str();
        let snapshot = self.store.snapshot();
        if snapshot.last_error.as_deref() == Some(unreachable) {
            self.store.set_last_error(None);
        }
        if snapshot.last_manual_check_reason.as_deref() == Some(unreachable) {
            self.store.set_manual_check_reason(None);
        }
        match message.kind {
            TopicKind::Manifest => self.handle_manifest(message).await,
            TopicKind::Attestation => self.handle_attestation(message).await,
            TopicKind::Revoke => self.handle_revocation(message).await,
            TopicKind::KillSwitch => self.handle_kill_switch(message).await,
        }
    }

    fn drop_antireplay(&self, reason: &str) {
        debug!("[update-sync] envelope dropped: {}", reason);
        self.store.increment_metric(metrics::ANTIREPLAY_DROP);
    }

    /// Envelope security checks. `false` means the message is dropped.
    fn admit_envelope(&self, envelope: &Envelope, require_signature: bool) -> bool {
        match self
            .verifier
            .verify_envelope_security(envelope, current_timestamp_ms(), require_signature)
        {
            Ok(()) => true,
            Err(reason) => {
                self.drop_antireplay(&reason.to_string());
                false
            }
        }
    }

    /// Replay and expiry checks for a payload that arrived without an envelope.
    fn admit_raw(&self, obj: &Map<String, Value>) -> bool {
        let now = current_timestamp_ms();
        let expires_at_ms = fields::uint(obj, &["expires_at_ms"]).unwrap_or(0);
        if let Some(nonce) = fields::text(obj, &["nonce"]) {
            if !self.verifier.register_envelope_nonce(&nonce, expires_at_ms, now) {
                self.drop_antireplay(VerifyError::ReplayedNonce.to_string().as_str());
                return false;
            }
        }
        if expires_at_ms > 0 && now > expires_at_ms {
            self.drop_antireplay(VerifyError::Expired.to_string().as_str());
            return false;
        }
        true
    }

    /// Payload of an envelope, or of a bare object when `allow_raw` is set.
    fn open_payload(&self, raw: &Value, require_signature: bool, allow_raw: bool) -> Option<Map<String, Value>> {
        if !Envelope::is_likely(raw) {
            let obj = raw.as_object().filter(|_| allow_raw)?;
            return self.admit_raw(obj).then(|| obj.clone());
        }
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("[update-sync] malformed envelope: {}", e);
                return None;
            }
        };
        self.admit_envelope(&envelope, require_signature)
            .then_some(envelope.payload)
    }

    async fn handle_manifest(&self, message: &TransportMessage) {
        self.store.increment_metric(metrics::MANIFEST_RECEIVED);
        let manifest = if Envelope::is_likely(&message.raw) {
            let envelope = match Envelope::parse(&message.raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!("[update-sync] malformed manifest envelope: {}", e);
                    return;
                }
            };
            let manifest = match parse_manifest(&envelope.payload_value()) {
                Ok(manifest) => manifest,
                Err(e) => {
                    debug!("[update-sync] manifest payload rejected: {}", e);
                    return;
                }
            };
            let require_signature = manifest.security.mode != SecurityMode::VrfChainV1;
            if !self.admit_envelope(&envelope, require_signature) {
                return;
            }
            manifest
        } else {
            match parse_manifest(&message.raw) {
                Ok(manifest) => manifest,
                Err(e) => {
                    debug!("[update-sync] bare manifest rejected: {}", e);
                    return;
                }
            }
        };

        if !manifest.is_chain_valid_shape() {
            debug!(
                "[update-sync] manifest {} is not a vrf_chain_v1 manifest",
                manifest.manifest_id
            );
            self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
            return;
        }
        let head = self.store.vrf_chain_state(&manifest.channel, &manifest.platform);
        if !head.is_genesis() && manifest.sequence <= head.last_sequence {
            debug!(
                "[update-sync] manifest {} seq {} is behind head {}",
                manifest.manifest_id, manifest.sequence, head.last_sequence
            );
            return;
        }
        if !self.within_window(&head, manifest.sequence) {
            debug!(
                "[update-sync] manifest {} seq {} is too far past head {}",
                manifest.manifest_id, manifest.sequence, head.last_sequence
            );
            self.count_dropped(1);
            return;
        }
        let proof = manifest
            .security
            .vrf
            .as_ref()
            .ok_or(VerifyError::VrfPayloadMissing)
            .and_then(check_vrf_proof);
        let vrf_output_hex = match proof {
            Ok(output) => output,
            Err(reason) => {
                debug!("[update-sync] manifest {} proof rejected: {}", manifest.manifest_id, reason);
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                return;
            }
        };
        let manifest_hash = match hash_manifest_for_chain(&manifest) {
            Ok(hash) => hash,
            Err(e) => {
                debug!("[update-sync] manifest hash failed: {}", e);
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                return;
            }
        };
        let candidate = self.store.upsert_pending_candidate(PendingCandidate {
            candidate_id: PendingCandidate::make_id(
                &manifest.channel,
                &manifest.platform,
                manifest.sequence,
                &manifest.manifest_id,
                &vrf_output_hex,
            ),
            channel: manifest.channel.clone(),
            platform: manifest.platform.clone(),
            sequence: manifest.sequence,
            manifest_id: manifest.manifest_id.clone(),
            manifest_hash,
            vrf_output_hex,
            carriers: BTreeSet::from([message.carrier]),
            seen_at_ms: current_timestamp_ms(),
            manifest: manifest.clone(),
        });
        let dropped = self.store.prune_pending_candidates(
            &manifest.channel,
            &manifest.platform,
            self.config.max_pending_candidates,
            self.config.pending_ttl_ms,
        );
        self.count_dropped(dropped);

        if !self.quorum.is_met(&candidate.carriers) {
            debug!(
                "[update-sync] manifest {} seq {} waiting for carriers (seen {:?})",
                manifest.manifest_id, manifest.sequence, candidate.carriers
            );
            self.store
                .set_vrf_candidate_status(CandidateStatus::WaitingCarrier, candidate.carriers.iter().copied());
            self.store.increment_metric(metrics::VRF_CARRIER_WAIT);
            return;
        }
        self.store
            .set_vrf_candidate_status(CandidateStatus::Confirmed, candidate.carriers.iter().copied());
        self.promote_ready(&manifest.channel, &manifest.platform).await;
    }

    /// Run promotion until nothing more can advance.
    pub(crate) async fn promote_ready(&self, channel: &str, platform: &str) {
        let _promotion = self.promotion.lock().await;
        while self.try_promote(channel, platform).await {}
    }

    fn ready_candidates(&self, channel: &str, platform: &str) -> Vec<PendingCandidate> {
        self.store
            .list_pending_candidates(channel, platform)
            .into_iter()
            .filter(|c| self.quorum.is_met(&c.carriers))
            .collect()
    }

    /// Applied version a new manifest in this scope has to beat.
    pub(crate) fn applied_baseline(&self, channel: &str, platform: &str) -> VersionBaseline {
        self.store.read(|state| {
            let scoped = state.scoped_version_state(channel, platform);
            let matches = state.scope_matches_snapshot(channel, platform);
            let version = scoped
                .map(|s| s.current_version.clone())
                .or_else(|| matches.then(|| state.snapshot.current_version.clone()).flatten());
            let version_code = normalize_version_code(scoped.map(|s| s.current_version_code))
                .or_else(|| matches.then(|| normalize_version_code(state.snapshot.current_version_code)).flatten());
            let sequence = scoped
                .map_or(0, |s| s.sequence)
                .max(state.max_applied_sequence(channel, platform));
            VersionBaseline {
                version,
                version_code,
                sequence,
            }
        })
    }

    /// One promotion step. Returns whether anything changed that warrants
    /// another pass.
    async fn try_promote(&self, channel: &str, platform: &str) -> bool {
        let head = self.store.vrf_chain_state(channel, platform);
        let ready = self.ready_candidates(channel, platform);
        let controls = self.ready_controls(channel, platform);
        let next_sequence = if head.is_genesis() {
            let lowest = ready
                .iter()
                .map(|c| c.sequence)
                .chain(controls.iter().map(|c| c.sequence))
                .filter(|s| *s > 0)
                .min();
            match lowest {
                Some(sequence) => sequence,
                None => return false,
            }
        } else {
            match head.next_sequence() {
                Some(sequence) => sequence,
                None => return false,
            }
        };

        let contenders: Vec<PendingCandidate> = ready.iter().filter(|c| c.sequence == next_sequence).cloned().collect();
        let control = controls
            .iter()
            .filter(|c| c.sequence == next_sequence)
            .min_by(|a, b| a.vrf_output_hex.cmp(&b.vrf_output_hex));
        let manifest_winner = resolve_sequence_conflict(&contenders).cloned();

        if let Some(control) = control {
            let beats_manifest = manifest_winner
                .as_ref()
                .map_or(true, |w| control.vrf_output_hex < w.vrf_output_hex);
            if beats_manifest {
                if self.promote_control(control, &head) {
                    let losers = contenders.len() + self.clear_controls_through(channel, platform, next_sequence);
                    self.store.clear_pending_candidates(channel, platform, Some(next_sequence));
                    for _ in 0..losers {
                        self.store.increment_metric(metrics::VRF_CONFLICT_RESOLVED);
                    }
                }
                return true;
            }
        }

        let Some(winner) = manifest_winner else {
            let ahead = ready.iter().filter(|c| c.sequence > next_sequence).count()
                + controls.iter().filter(|c| c.sequence > next_sequence).count();
            if !head.is_genesis() && ahead > 0 {
                let carriers: BTreeSet<Carrier> = ready
                    .iter()
                    .filter(|c| c.sequence > next_sequence)
                    .flat_map(|c| c.carriers.iter().copied())
                    .chain(
                        controls
                            .iter()
                            .filter(|c| c.sequence > next_sequence)
                            .flat_map(|c| c.carriers.iter().copied()),
                    )
                    .collect();
                debug!(
                    "[update-sync] {}|{} waiting for sequence {} before {} later entries",
                    channel, platform, next_sequence, ahead
                );
                self.store.set_vrf_candidate_status(CandidateStatus::WaitingHistory, carriers);
                self.store.increment_metric(metrics::VRF_GAP_BLOCK);
            }
            return false;
        };
        for loser in contenders.iter().filter(|c| c.candidate_id != winner.candidate_id) {
            debug!(
                "[update-sync] fork at sequence {}: {} loses to {}",
                next_sequence, loser.candidate_id, winner.candidate_id
            );
            self.store.remove_pending_candidate(channel, platform, &loser.candidate_id);
            self.store.increment_metric(metrics::VRF_CONFLICT_RESOLVED);
        }

        let advance = match self.verifier.verify_vrf_chain_candidate(&winner.manifest, &head) {
            Ok(advance) => advance,
            Err(reason) => {
                warn!(
                    "[update-sync] chain verification failed for {}: {}",
                    winner.manifest_id, reason
                );
                self.store.remove_pending_candidate(channel, platform, &winner.candidate_id);
                self.store.increment_metric(metrics::VRF_VERIFY_FAIL);
                self.store.set_state_only(LifecycleState::Failed, Some(&reason.to_string()));
                return control.is_some();
            }
        };

        let baseline = self.applied_baseline(channel, platform);
        if let Err(reason) = self.verifier.verify_manifest_security(&winner.manifest, &baseline) {
            debug!(
                "[update-sync] manifest {} rejected: {}",
                winner.manifest_id, reason
            );
            self.store.remove_pending_candidate(channel, platform, &winner.candidate_id);
            if reason == VerifyError::RollbackRejected {
                self.store.increment_metric(metrics::SEQUENCE_REGRESS);
            }
            return false;
        }

        if let Some(reason) = self.blocked_by_control(&winner.manifest) {
            warn!("[update-sync] manifest {} blocked: {}", winner.manifest_id, reason);
            self.store.clear_staged_file();
            self.store.set_state_only(LifecycleState::Revoked, Some(reason));
            self.store.remove_pending_candidate(channel, platform, &winner.candidate_id);
            return true;
        }

        self.store
            .set_vrf_candidate_status(CandidateStatus::Confirmed, winner.carriers.iter().copied());
        self.store.set_manifest_detected(&winner.manifest);
        self.store.set_state_only(LifecycleState::Verified, None);
        self.store.set_vrf_chain_state(
            channel,
            platform,
            &ChainHead::at(
                advance.sequence,
                &advance.manifest_hash,
                &advance.vrf_output_hex,
                current_timestamp_ms(),
            ),
        );
        self.store.clear_pending_candidates(channel, platform, Some(winner.sequence));
        let outvoted = self.clear_controls_through(channel, platform, winner.sequence);
        for _ in 0..outvoted {
            self.store.increment_metric(metrics::VRF_CONFLICT_RESOLVED);
        }
        self.store.increment_metric(metrics::VRF_MANIFEST_ACCEPTED);
        info!(
            "[update-sync] accepted manifest {} (seq {}, version {})",
            winner.manifest_id, winner.sequence, winner.manifest.version
        );

        let device_id = self.verifier.device_id();
        let rollout = &winner.manifest.rollout;
        if !rollout.emergency && !should_enter_rollout(rollout, &device_id, &winner.manifest_id) {
            debug!(
                "[update-sync] device outside {}% rollout of {}",
                rollout.percent, winner.manifest_id
            );
            self.store
                .set_state_only(LifecycleState::Verified, Some("rollout_not_hit"));
            return true;
        }

        self.maybe_download_and_apply().await;
        true
    }

    /// Revocation or kill-switch covering `manifest`, without side effects.
    pub(crate) fn blocked_by_control(&self, manifest: &Manifest) -> Option<&'static str> {
        if self.store.is_manifest_revoked(&manifest.manifest_id) {
            return Some("manifest revoked");
        }
        if self.store.kill_switch_active(&manifest.channel, &manifest.platform) {
            return Some("killswitch active");
        }
        None
    }

    async fn handle_attestation(&self, message: &TransportMessage) {
        let allow_raw = self.config.allow_raw_unsigned_attestation;
        let Some(payload) = self.open_payload(&message.raw, true, allow_raw) else {
            return;
        };
        let attestation = match Attestation::parse(&Value::Object(payload)) {
            Ok(attestation) => attestation,
            Err(e) => {
                debug!("[update-sync] attestation rejected: {}", e);
                return;
            }
        };
        if !attestation.is_positive() {
            return;
        }
        let threshold = self.store.read(|state| {
            state
                .manifest
                .as_ref()
                .filter(|m| m.manifest_id == attestation.manifest_id)
                .map_or(0, |m| m.security.attestation_threshold)
        });
        if threshold == 0 {
            return;
        }
        let count = self.store.add_attestor(&attestation.attestor_peer_id);
        self.store.increment_metric(metrics::ATTESTATION_VERIFIED);
        debug!(
            "[update-sync] attestation {}/{} for {} from {}",
            count, threshold, attestation.manifest_id, attestation.attestor_peer_id
        );
        self.maybe_download_and_apply().await;
    }

    /// Scope named by a control message, falling back to the snapshot scope.
    fn control_scope(&self, channel: Option<&str>, platform: Option<&str>) -> (String, String) {
        let snapshot = self.store.snapshot();
        let pick = |named: Option<&str>, current: &str, fallback: &str| {
            named
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| Some(current.trim()).filter(|v| !v.is_empty()))
                .unwrap_or(fallback)
                .to_string()
        };
        (
            pick(channel, &snapshot.channel, &self.scope.channel),
            pick(platform, &snapshot.platform, &self.scope.platform),
        )
    }

    async fn handle_revocation(&self, message: &TransportMessage) {
        let Some(payload) = self.open_payload(&message.raw, false, false) else {
            return;
        };
        let revocation = match Revocation::parse(&Value::Object(payload.clone())) {
            Ok(revocation) => revocation,
            Err(e) => {
                debug!("[update-sync] revocation rejected: {}", e);
                return;
            }
        };
        let (channel, platform) = self.control_scope(revocation.channel.as_deref(), revocation.platform.as_deref());
        if self.stage_control(ControlKind::Revoke, &payload, &channel, &platform, message.carrier) {
            self.promote_ready(&channel, &platform).await;
        }
    }

    async fn handle_kill_switch(&self, message: &TransportMessage) {
        let Some(payload) = self.open_payload(&message.raw, false, false) else {
            return;
        };
        let kill_switch = match KillSwitch::parse(&Value::Object(payload.clone())) {
            Ok(kill_switch) => kill_switch,
            Err(e) => {
                debug!("[update-sync] kill-switch rejected: {}", e);
                return;
            }
        };
        let (channel, platform) = self.control_scope(kill_switch.channel.as_deref(), kill_switch.platform.as_deref());
        if self.stage_control(ControlKind::KillSwitch, &payload, &channel, &platform, message.carrier) {
            self.promote_ready(&channel, &platform).await;
        }
    }

    /// Record the installed package as the scope baseline.
    pub(crate) async fn refresh_installed_version(&self, channel: &str, platform: &str) {
        let installed = match self.applier.installed_version().await {
            Ok(Some(installed)) if !installed.version.trim().is_empty() => installed,
            Ok(_) => return,
            Err(e) => {
                debug!("[update-sync] installed version unavailable: {}", e);
                return;
            }
        };
        let non_blank = |v: Option<&str>| v.map_or(false, |v| !v.trim().is_empty());
        let has_previous = self.store.read(|state| {
            non_blank(
                state
                    .scoped_version_state(channel, platform)
                    .and_then(|s| s.previous_version.as_deref()),
            ) || (state.scope_matches_snapshot(channel, platform)
                && non_blank(state.snapshot.previous_version.as_deref()))
        });
        if !has_previous {
            if let Some(previous) = installed.previous_version.as_deref().filter(|v| !v.trim().is_empty()) {
                self.store
                    .set_installed_version(channel, platform, previous.trim(), installed.previous_version_code);
            }
        }
        self.store
            .set_installed_version(channel, platform, installed.version.trim(), installed.version_code);
        debug!(
            "[update-sync] installed version {} recorded for {}|{}",
            installed.version, channel, platform
        );
    }

    async fn run_manual_check(&self) -> Result<(), SyncError> {
        let (channel, platform) = self.store.read(|s| (s.snapshot.channel.clone(), s.snapshot.platform.clone()));
        let ready_before = self.ready_candidates(&channel, &platform);
        if !ready_before.is_empty() {
            let carriers: BTreeSet<Carrier> = ready_before.iter().flat_map(|c| c.carriers.iter().copied()).collect();
            self.store.set_vrf_candidate_status(CandidateStatus::WaitingHistory, carriers);
        }

        let limit = Duration::from_millis(self.config.manual_check_timeout_ms);
        let diagnostics: ManualCheckResult = tokio::time::timeout(limit, self.transport.manual_check())
            .await
            .map_err(|_| SyncError::ManualCheckTimeout)?;

        self.promote_ready(&channel, &platform).await;
        let ready = self.ready_candidates(&channel, &platform);
        if !diagnostics.connectivity_ok && diagnostics.observed_messages == 0 && ready.is_empty() {
            let reason = diagnostics.reason.unwrap_or(ConnectivityReason::NetworkUnreachable);
            info!("[update-sync] manual check: {}", reason);
            self.store.set_manual_check_reason(Some(reason.as_str()));
            match reason {
                ConnectivityReason::NetworkUnreachable | ConnectivityReason::NativeNotReady => {
                    self.store.set_last_error(Some(reason.as_str()))
                }
                ConnectivityReason::NoRemotePeers => self.store.set_last_error(None),
            }
            return Ok(());
        }
        if !ready.is_empty() {
            let carriers: BTreeSet<Carrier> = ready.iter().flat_map(|c| c.carriers.iter().copied()).collect();
            info!("[update-sync] manual check: {} candidates waiting for history", ready.len());
            self.store.set_vrf_candidate_status(CandidateStatus::WaitingHistory, carriers);
            self.store.set_manual_check_reason(Some(WAITING_HISTORY));
            self.store.set_last_error(None);
            return Ok(());
        }
        self.store.set_manual_check_reason(None);
        self.store.set_last_error(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    use serde_json::json;
    use update_crypto::{sha256_hex, Ed25519KeyPair};
    use update_protocol::{seal_control, seal_manifest, SealedEntry, GENESIS_HASH, MAX_SEQUENCE};
    use update_store::StoreConfig;
    use update_transport::{MessageSource, MockP2pNetwork, TransportConfig, UpdateTransport};
    use update_verifier::UpdateVerifier;

    use crate::domain::{ApplyOutcome, InstallResult};
    use crate::ports::MockUpdateApplier;

    struct Harness {
        service: UpdateSyncService,
        applier: Arc<MockUpdateApplier>,
        keypair: Ed25519KeyPair,
        nonces: AtomicU64,
    }

    fn harness_with(network: MockP2pNetwork, config: SyncConfig) -> Harness {
        let transport = Arc::new(UpdateTransport::new(TransportConfig::for_testing(), Arc::new(network)));
        let applier = Arc::new(MockUpdateApplier::new());
        let verifier = Arc::new(UpdateVerifier::in_memory(config.verifier.clone()));
        let store = Arc::new(VersionStore::in_memory(StoreConfig::default()));
        Harness {
            service: UpdateSyncService::new(config, store, verifier, transport, applier.clone()),
            applier,
            keypair: Ed25519KeyPair::from_seed([7u8; 32]),
            nonces: AtomicU64::new(0),
        }
    }

    fn harness() -> Harness {
        harness_with(MockP2pNetwork::new(), SyncConfig::for_testing())
    }

    fn artifact_bytes(sequence: u64) -> Vec<u8> {
        format!("artifact-{}", sequence).into_bytes()
    }

    fn gateway_url(sequence: u64) -> String {
        format!("https://ipfs.io/ipfs/bafy-{}", sequence)
    }

    fn entry(sealed: &SealedEntry) -> (String, String) {
        (sealed.entry_hash.clone(), sealed.vrf_output_hex.clone())
    }

    fn genesis() -> (String, String) {
        (GENESIS_HASH.to_string(), GENESIS_HASH.to_string())
    }

    impl Harness {
        /// Sealed manifest; `overrides` replaces top-level fields.
        fn manifest_from(&self, sequence: u64, prev: &(String, String), overrides: Value) -> (Manifest, SealedEntry) {
            let mut raw = json!({
                "schema_version": 2,
                "manifest_id": format!("m-{}", sequence),
                "channel": "stable",
                "platform": "android",
                "sequence": sequence,
                "version": format!("1.0.{}", sequence),
                "version_code": sequence,
                "metadata": {"release_notes": {"summary": "fixes", "details": "bug fixes", "published_at_ms": 1}}
            });
            for (key, value) in overrides.as_object().cloned().unwrap() {
                raw[key] = value;
            }
            let mut manifest = parse_manifest(&raw).unwrap();
            let sealed = seal_manifest(&mut manifest, &self.keypair, "publisher", &prev.0, &prev.1).unwrap();
            (manifest, sealed)
        }

        fn manifest_with(&self, sequence: u64, prev: &(String, String), artifact: Value, security: Value) -> (Manifest, SealedEntry) {
            self.manifest_from(sequence, prev, json!({"artifacts": [artifact], "security": security}))
        }

        /// Resource artifact served from the gateway under `n`.
        fn served_artifact(&self, n: u64) -> Value {
            let bytes = artifact_bytes(n);
            self.applier.serve_https(&gateway_url(n), &bytes);
            json!({"platform": "android", "kind": "resource", "uri": format!("ipfs://bafy-{}", n), "sha256": sha256_hex(&bytes)})
        }

        /// Sealed control payload of `kind` carrying `body`.
        fn control(&self, kind: &str, body: Value, sequence: u64, prev: &(String, String)) -> (Map<String, Value>, SealedEntry) {
            let mut payload = body.as_object().cloned().unwrap();
            payload.insert("kind".into(), json!(kind));
            let sealed = seal_control(&mut payload, "stable", "android", sequence, &self.keypair, "publisher", &prev.0, &prev.1)
                .unwrap();
            (payload, sealed)
        }

        async fn deliver_control(&self, topic: TopicKind, payload: &Map<String, Value>, carriers: &[Carrier]) {
            for carrier in carriers {
                self.deliver(topic, self.envelope(payload.clone()), *carrier).await;
            }
        }

        /// Resource manifest served from the gateway.
        fn manifest(&self, sequence: u64, prev: &(String, String)) -> (Manifest, SealedEntry) {
            let bytes = artifact_bytes(sequence);
            self.applier.serve_https(&gateway_url(sequence), &bytes);
            self.manifest_with(
                sequence,
                prev,
                json!({"platform": "android", "kind": "resource", "uri": format!("ipfs://bafy-{}", sequence), "sha256": sha256_hex(&bytes)}),
                json!({}),
            )
        }

        fn envelope(&self, payload: Map<String, Value>) -> Value {
            let nonce = format!("nonce-{}", self.nonces.fetch_add(1, Ordering::SeqCst));
            Envelope::seal(payload, nonce, 0).to_value().unwrap()
        }

        async fn deliver(&self, kind: TopicKind, raw: Value, carrier: Carrier) {
            let source = match carrier {
                Carrier::Gossip => MessageSource::Gossipsub,
                Carrier::Feed => MessageSource::FeedSnapshot,
            };
            let message = TransportMessage {
                kind,
                raw,
                topic: "/updates/v2/stable/android/test".to_string(),
                received_at_ms: current_timestamp_ms(),
                source,
                carrier,
            };
            self.service.handle_message(&message).await;
        }

        async fn deliver_manifest(&self, manifest: &Manifest, carriers: &[Carrier]) {
            let payload = manifest.to_value().unwrap().as_object().cloned().unwrap();
            for carrier in carriers {
                self.deliver(TopicKind::Manifest, self.envelope(payload.clone()), *carrier)
                    .await;
            }
        }

        fn metric(&self, name: &str) -> u64 {
            self.service.store().metric(name)
        }
    }

    const BOTH: [Carrier; 2] = [Carrier::Gossip, Carrier::Feed];

    #[tokio::test]
    async fn test_single_carrier_waits_for_quorum() {
        let h = harness();
        let (m1, _) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &[Carrier::Gossip]).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::WaitingCarrier);
        assert_eq!(snapshot.vrf_candidate_carriers, BTreeSet::from([Carrier::Gossip]));
        assert_eq!(h.metric(metrics::VRF_CARRIER_WAIT), 1);
        assert!(h.applier.state().https_requests.is_empty());
        assert!(h.service.store().vrf_chain_state("stable", "android").is_genesis());
    }

    #[tokio::test]
    async fn test_dual_carrier_manifest_is_applied() {
        let h = harness();
        let (m1, sealed) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.1"));
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::Confirmed);
        assert_eq!(h.metric(metrics::VRF_MANIFEST_ACCEPTED), 1);
        assert_eq!(h.metric(metrics::APPLY_SUCCESS), 1);
        assert_eq!(h.metric(metrics::DOWNLOAD_FALLBACK), 1);
        assert_eq!(h.applier.state().https_requests, vec![gateway_url(1)]);

        let head = h.service.store().vrf_chain_state("stable", "android");
        assert_eq!(head.last_sequence, 1);
        assert_eq!(head.last_manifest_hash, sealed.entry_hash);
        assert!(h.service.store().list_pending_candidates("stable", "android").is_empty());
    }

    #[tokio::test]
    async fn test_replayed_envelope_is_dropped() {
        let h = harness();
        let (m1, _) = h.manifest(1, &genesis());
        let raw = h.envelope(m1.to_value().unwrap().as_object().cloned().unwrap());
        h.deliver(TopicKind::Manifest, raw.clone(), Carrier::Gossip).await;
        h.deliver(TopicKind::Manifest, raw, Carrier::Feed).await;

        assert_eq!(h.metric(metrics::ANTIREPLAY_DROP), 1);
        assert_eq!(h.service.snapshot().vrf_candidate_status, CandidateStatus::WaitingCarrier);
    }

    #[tokio::test]
    async fn test_gap_blocks_until_history_arrives() {
        let h = harness();
        let (m1, s1) = h.manifest(1, &genesis());
        let (m2, s2) = h.manifest(2, &entry(&s1));
        let (m3, _) = h.manifest(3, &entry(&s2));

        h.deliver_manifest(&m1, &BOTH).await;
        h.deliver_manifest(&m3, &BOTH).await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::WaitingHistory);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.1"));
        assert_eq!(h.metric(metrics::VRF_GAP_BLOCK), 1);

        h.deliver_manifest(&m2, &BOTH).await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.3"));
        assert_eq!(h.applier.state().https_requests.len(), 3);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 3);
    }

    #[tokio::test]
    async fn test_first_manifest_may_start_above_one() {
        let h = harness();
        let (m5, _) = h.manifest(5, &genesis());
        h.deliver_manifest(&m5, &BOTH).await;

        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 5);
    }

    #[tokio::test]
    async fn test_broken_chain_link_fails() {
        let h = harness();
        let (m1, _) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;
        let (m2, _) = h.manifest(2, &("ab".repeat(32), "cd".repeat(32)));
        h.deliver_manifest(&m2, &BOTH).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("prev_manifest_hash_mismatch"));
        assert_eq!(h.metric(metrics::VRF_VERIFY_FAIL), 1);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 1);
    }

    #[tokio::test]
    async fn test_missing_sha256_fails_before_download() {
        let h = harness();
        let (m1, _) = h.manifest_with(
            1,
            &genesis(),
            json!({"platform": "android", "kind": "resource", "uri": "ipfs://bafy-1", "sha256": null}),
            json!({}),
        );
        h.deliver_manifest(&m1, &BOTH).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("artifact_sha256_missing"));
        assert!(h.applier.state().https_requests.is_empty());
    }

    #[tokio::test]
    async fn test_hash_mismatch_fails() {
        let h = harness();
        let (m1, _) = h.manifest(1, &genesis());
        h.applier.serve_https(&gateway_url(1), b"tampered");
        h.deliver_manifest(&m1, &BOTH).await;

        assert_eq!(h.service.snapshot().last_error.as_deref(), Some("sha256_mismatch"));
        assert!(h.applier.state().staged.is_empty());
    }

    #[tokio::test]
    async fn test_p2p_provider_serves_artifact() {
        let h = harness();
        h.applier.serve_provider("peer-1", &artifact_bytes(1));
        let (m1, _) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;

        let state = h.applier.state();
        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert!(state.https_requests.is_empty());
        assert_eq!(state.chunk_requests.len(), 1);
        assert_eq!(h.metric(metrics::DOWNLOAD_FALLBACK), 0);
    }

    #[tokio::test]
    async fn test_revocation_needs_quorum_and_revokes() {
        let h = harness();
        let (m1, s1) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;

        let mut payload = Map::new();
        payload.insert("kind".into(), json!("update_revoke_v2"));
        payload.insert("manifest_id".into(), json!("m-1"));
        payload.insert("reason".into(), json!("bad build"));
        seal_control(&mut payload, "stable", "android", 2, &h.keypair, "publisher", &s1.entry_hash, &s1.vrf_output_hex)
            .unwrap();

        h.deliver(TopicKind::Revoke, h.envelope(payload.clone()), Carrier::Gossip).await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert_eq!(h.service.waiting_control_messages(), 1);

        h.deliver(TopicKind::Revoke, h.envelope(payload), Carrier::Feed).await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Revoked);
        assert_eq!(snapshot.last_error.as_deref(), Some("revocation:bad build"));
        assert!(h.service.store().is_manifest_revoked("m-1"));
        assert_eq!(h.metric(metrics::REVOKE_APPLIED), 1);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 2);
        assert_eq!(h.service.waiting_control_messages(), 0);
    }

    #[tokio::test]
    async fn test_unwrapped_control_is_ignored() {
        let h = harness();
        h.deliver(
            TopicKind::KillSwitch,
            json!({"kind": "update_killswitch_v2", "enabled": true, "platform": "android"}),
            Carrier::Gossip,
        )
        .await;
        assert!(!h.service.store().kill_switch_active("stable", "android"));
        assert_eq!(h.service.waiting_control_messages(), 0);
    }

    #[tokio::test]
    async fn test_kill_switch_blocks_promotion() {
        let h = harness();
        let mut payload = Map::new();
        payload.insert("kind".into(), json!("update_killswitch_v2"));
        payload.insert("enabled".into(), json!(true));
        payload.insert("reason".into(), json!("incident"));
        let sealed = seal_control(&mut payload, "stable", "android", 1, &h.keypair, "publisher", GENESIS_HASH, GENESIS_HASH)
            .unwrap();
        for carrier in BOTH {
            h.deliver(TopicKind::KillSwitch, h.envelope(payload.clone()), carrier).await;
        }
        assert!(h.service.store().kill_switch_active("stable", "android"));

        let (m2, _) = h.manifest(2, &entry(&sealed));
        h.deliver_manifest(&m2, &BOTH).await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Revoked);
        assert_eq!(snapshot.last_error.as_deref(), Some("killswitch active"));
        assert!(h.applier.state().https_requests.is_empty());
    }

    #[tokio::test]
    async fn test_attestation_threshold_gates_download() {
        let h = harness();
        let bytes = artifact_bytes(1);
        h.applier.serve_https(&gateway_url(1), &bytes);
        let (m1, _) = h.manifest_with(
            1,
            &genesis(),
            json!({"platform": "android", "kind": "resource", "uri": "ipfs://bafy-1", "sha256": sha256_hex(&bytes)}),
            json!({"attestation_threshold": 2}),
        );
        h.deliver_manifest(&m1, &BOTH).await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Verified);

        let attest = |peer: &str| {
            let mut payload = Map::new();
            payload.insert("kind".into(), json!("update_attestation_v2"));
            payload.insert("manifest_id".into(), json!("m-1"));
            payload.insert("attestor_peer_id".into(), json!(peer));
            payload.insert("verdict".into(), json!("ok"));
            payload
        };

        // Bare attestations are refused by default.
        h.deliver(TopicKind::Attestation, Value::Object(attest("peer-a")), Carrier::Gossip).await;
        assert_eq!(h.service.snapshot().attestor_count, 0);

        for peer in ["peer-a", "peer-b"] {
            let nonce = format!("attest-{}", peer);
            let mut envelope = Envelope::seal(attest(peer), nonce, 0);
            envelope.sign(&h.keypair);
            h.deliver(TopicKind::Attestation, envelope.to_value().unwrap(), Carrier::Gossip).await;
        }
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.attestor_count, 2);
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(h.metric(metrics::ATTESTATION_VERIFIED), 2);
    }

    fn shell_artifact(h: &Harness) -> Value {
        let bytes = artifact_bytes(1);
        h.applier.serve_https(&gateway_url(1), &bytes);
        json!({"platform": "android", "kind": "full", "uri": "ipfs://bafy-1", "sha256": sha256_hex(&bytes), "shell_required": true})
    }

    #[tokio::test]
    async fn test_shell_package_waits_for_background() {
        let h = harness();
        let (m1, _) = h.manifest_with(1, &genesis(), shell_artifact(&h), json!({}));
        h.deliver_manifest(&m1, &BOTH).await;

        assert_eq!(h.service.snapshot().state, LifecycleState::Staged);
        assert_eq!(h.applier.state().staged, vec!["memory://m-1/shell".to_string()]);
        assert!(h.applier.state().applied.is_empty());

        h.service.set_foreground(false).await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert_eq!(h.applier.state().applied, vec!["m-1".to_string()]);
        assert_eq!(h.applier.state().https_requests.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_install_reconciles_on_success() {
        let h = harness();
        h.applier.update(|s| s.apply_outcome = ApplyOutcome::PendingInstall);
        h.service.set_foreground(false).await;
        let (m1, _) = h.manifest_with(1, &genesis(), shell_artifact(&h), json!({}));
        h.deliver_manifest(&m1, &BOTH).await;

        assert_eq!(h.service.snapshot().state, LifecycleState::Staged);
        assert_eq!(h.service.pending_install_manifest_id().as_deref(), Some("m-1"));

        h.service.retry_apply().await;
        assert_eq!(h.applier.state().applied.len(), 1);

        h.applier.push_install_result(InstallResult::success("m-1"));
        h.service.retry_apply().await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.1"));
        assert_eq!(h.service.pending_install_manifest_id(), None);
    }

    #[tokio::test]
    async fn test_failed_install_result_sets_error() {
        let h = harness();
        h.applier.update(|s| s.apply_outcome = ApplyOutcome::PendingInstall);
        h.service.set_foreground(false).await;
        let (m1, _) = h.manifest_with(1, &genesis(), shell_artifact(&h), json!({}));
        h.deliver_manifest(&m1, &BOTH).await;

        h.applier.push_install_result(InstallResult::failed("m-1", Some("signature_conflict")));
        h.service.retry_apply().await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("signature_conflict"));
    }

    #[tokio::test]
    async fn test_manual_check_reports_unreachable_network() {
        let network = MockP2pNetwork::isolated();
        network.update(|s| {
            s.health.started = false;
            s.health.peer_id = None;
            s.local_peer_id = String::new();
        });
        let h = harness_with(network, SyncConfig::for_testing());

        let snapshot = h.service.manual_check().await;
        assert!(h.service.is_started());
        assert!(!snapshot.manual_check_inflight);
        assert_eq!(snapshot.last_manual_check_reason.as_deref(), Some("network_unreachable"));
        assert_eq!(snapshot.last_error.as_deref(), Some("network_unreachable"));
        h.service.stop().await;
    }

    #[tokio::test]
    async fn test_manual_check_reports_waiting_history() {
        let h = harness();
        h.service.start().await.unwrap();
        let (m1, s1) = h.manifest(1, &genesis());
        let (_, s2) = h.manifest(2, &entry(&s1));
        let (m3, _) = h.manifest(3, &entry(&s2));
        h.deliver_manifest(&m1, &BOTH).await;
        h.deliver_manifest(&m3, &BOTH).await;

        let snapshot = h.service.manual_check().await;
        assert_eq!(snapshot.last_manual_check_reason.as_deref(), Some("waiting_history"));
        assert_eq!(snapshot.vrf_candidate_status, CandidateStatus::WaitingHistory);
        assert_eq!(snapshot.last_error, None);
        h.service.stop().await;
    }

    #[tokio::test]
    async fn test_start_records_installed_version() {
        let h = harness();
        h.applier.update(|s| {
            s.installed = Some(crate::domain::InstalledVersion {
                version: "2.0.0".into(),
                version_code: Some(20),
                previous_version: Some("1.9.0".into()),
                previous_version_code: Some(19),
            })
        });
        h.service.start().await.unwrap();
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.current_version.as_deref(), Some("2.0.0"));
        let scoped = h.service.store().scoped_version_state("stable", "android").unwrap();
        assert_eq!(scoped.previous_version.as_deref(), Some("1.9.0"));

        // Anything not above the installed version is a rollback.
        let (m1, _) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;
        assert_eq!(h.metric(metrics::SEQUENCE_REGRESS), 1);
        assert_eq!(h.service.snapshot().current_version.as_deref(), Some("2.0.0"));
        h.service.stop().await;
    }

    #[tokio::test]
    async fn test_single_carrier_quorum_config() {
        let h = harness_with(
            MockP2pNetwork::new(),
            SyncConfig::for_testing().with_quorum(vec![Carrier::Gossip], 1),
        );
        let (m1, _) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &[Carrier::Gossip]).await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
    }

    // =============================================================================
    // SEQUENCE BOUNDS
    // =============================================================================

    #[tokio::test]
    async fn test_chain_stops_at_sequence_ceiling() {
        let h = harness();
        let (top, _) = h.manifest(MAX_SEQUENCE, &genesis());
        h.deliver_manifest(&top, &BOTH).await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, MAX_SEQUENCE);

        let mut beyond = top.to_value().unwrap().as_object().cloned().unwrap();
        beyond.insert("sequence".into(), json!(u64::MAX));
        beyond.insert("manifest_id".into(), json!("m-beyond"));
        for carrier in BOTH {
            h.deliver(TopicKind::Manifest, h.envelope(beyond.clone()), carrier).await;
        }

        let (mut revoke, _) = h.control("update_revoke_v2", json!({"manifest_id": "m-1"}), 1, &genesis());
        revoke.insert("sequence".into(), json!(u64::MAX));
        h.deliver_control(TopicKind::Revoke, &revoke, &[Carrier::Gossip]).await;

        assert_eq!(h.service.snapshot().state, LifecycleState::Applied);
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, MAX_SEQUENCE);
        assert!(h.service.store().list_pending_candidates("stable", "android").is_empty());
        assert_eq!(h.service.waiting_control_messages(), 0);
        assert_eq!(h.metric(metrics::VRF_VERIFY_FAIL), 1);
    }

    // =============================================================================
    // CONTROLS AND HISTORY
    // =============================================================================

    #[tokio::test]
    async fn test_early_kill_switch_applies_once_history_arrives() {
        let h = harness();
        let (m1, s1) = h.manifest(1, &genesis());
        let (m2, s2) = h.manifest(2, &entry(&s1));
        let (kill, ks) = h.control("update_killswitch_v2", json!({"enabled": true, "reason": "incident"}), 3, &entry(&s2));
        let (m4, _) = h.manifest(4, &entry(&ks));

        h.deliver_manifest(&m1, &BOTH).await;
        h.deliver_control(TopicKind::KillSwitch, &kill, &BOTH).await;
        assert_eq!(h.service.waiting_control_messages(), 1);
        assert_eq!(h.service.snapshot().vrf_candidate_status, CandidateStatus::WaitingHistory);
        assert!(!h.service.store().kill_switch_active("stable", "android"));
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 1);

        h.deliver_manifest(&m2, &BOTH).await;
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 3);
        assert!(h.service.store().kill_switch_active("stable", "android"));
        assert_eq!(h.service.waiting_control_messages(), 0);
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Revoked);
        assert_eq!(snapshot.last_error.as_deref(), Some("killswitch:incident"));

        h.deliver_manifest(&m4, &BOTH).await;
        assert_eq!(h.service.snapshot().last_error.as_deref(), Some("killswitch active"));
        assert_eq!(h.metric(metrics::VRF_VERIFY_FAIL), 0);
        assert_eq!(h.applier.state().https_requests, vec![gateway_url(1), gateway_url(2)]);
    }

    #[tokio::test]
    async fn test_manifest_waiting_on_control_promotes_after_it() {
        let h = harness();
        let (m1, s1) = h.manifest(1, &genesis());
        let (revoke, rv) = h.control("update_revoke_v2", json!({"manifest_id": "m-0", "reason": "old"}), 2, &entry(&s1));
        let (m3, s3) = h.manifest(3, &entry(&rv));

        h.deliver_manifest(&m1, &BOTH).await;
        h.deliver_manifest(&m3, &BOTH).await;
        assert_eq!(h.service.snapshot().vrf_candidate_status, CandidateStatus::WaitingHistory);

        h.deliver_control(TopicKind::Revoke, &revoke, &BOTH).await;
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.3"));
        assert!(h.service.store().is_manifest_revoked("m-0"));
        let head = h.service.store().vrf_chain_state("stable", "android");
        assert_eq!(head.last_sequence, 3);
        assert_eq!(head.last_manifest_hash, s3.entry_hash);
        assert_eq!(h.metric(metrics::VRF_VERIFY_FAIL), 0);
    }

    // =============================================================================
    // POOL LIMITS
    // =============================================================================

    #[tokio::test]
    async fn test_pending_pools_are_capped() {
        let h = harness_with(MockP2pNetwork::new(), SyncConfig::for_testing().with_pending_limits(4, 4, 8));
        for sequence in 1..=10 {
            let (m, _) = h.manifest(sequence, &genesis());
            h.deliver_manifest(&m, &[Carrier::Gossip]).await;
            let (revoke, _) = h.control("update_revoke_v2", json!({"manifest_id": format!("m-{}", sequence)}), sequence, &genesis());
            h.deliver_control(TopicKind::Revoke, &revoke, &[Carrier::Gossip]).await;
        }
        assert_eq!(h.service.store().list_pending_candidates("stable", "android").len(), 4);
        assert_eq!(h.service.waiting_control_messages(), 4);
        assert_eq!(h.metric(metrics::PENDING_DROPPED), 12);

        let forger = Ed25519KeyPair::from_seed([8u8; 32]);
        let (mut forged, _) = h.manifest(20, &genesis());
        forged.security.vrf.as_mut().unwrap().vrf_proof_base64 = forger.sign(b"forged").to_base64();
        h.deliver_manifest(&forged, &[Carrier::Gossip]).await;

        let (mut revoke, _) = h.control("update_revoke_v2", json!({"manifest_id": "m-20"}), 20, &genesis());
        revoke["vrf"]["vrf_proof_base64"] = json!(forger.sign(b"forged").to_base64());
        h.deliver_control(TopicKind::Revoke, &revoke, &[Carrier::Gossip]).await;

        assert_eq!(h.metric(metrics::VRF_VERIFY_FAIL), 2);
        assert_eq!(h.service.store().list_pending_candidates("stable", "android").len(), 4);
        assert_eq!(h.service.waiting_control_messages(), 4);
    }

    #[tokio::test]
    async fn test_entries_outside_window_are_turned_away() {
        let h = harness_with(MockP2pNetwork::new(), SyncConfig::for_testing().with_pending_limits(8, 8, 2));
        let (m1, s1) = h.manifest(1, &genesis());
        h.deliver_manifest(&m1, &BOTH).await;

        let (far, _) = h.manifest(4, &entry(&s1));
        h.deliver_manifest(&far, &[Carrier::Gossip]).await;
        let (far_control, _) = h.control("update_revoke_v2", json!({"manifest_id": "m-1"}), 9, &entry(&s1));
        h.deliver_control(TopicKind::Revoke, &far_control, &[Carrier::Gossip]).await;
        assert_eq!(h.metric(metrics::PENDING_DROPPED), 2);

        let (near, _) = h.manifest(3, &entry(&s1));
        h.deliver_manifest(&near, &[Carrier::Gossip]).await;
        h.deliver_manifest(&m1, &[Carrier::Gossip]).await;

        let pending = h.service.store().list_pending_candidates("stable", "android");
        assert_eq!(pending.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![3]);
        assert_eq!(h.service.waiting_control_messages(), 0);
    }

    // =============================================================================
    // FORKS AND ROLLOUT
    // =============================================================================

    #[tokio::test]
    async fn test_fork_in_pool_resolves_to_smallest_output() {
        let h = harness();
        let (m1, s1) = h.manifest(1, &genesis());
        let (m2, s2) = h.manifest(2, &entry(&s1));
        let (left, left_sealed) = h.manifest_with(3, &entry(&s2), h.served_artifact(3), json!({}));
        let (right, right_sealed) = h.manifest_with(3, &entry(&s2), h.served_artifact(33), json!({}));
        assert_ne!(left_sealed.vrf_output_hex, right_sealed.vrf_output_hex);
        let (winner, winner_url) = if left_sealed.vrf_output_hex < right_sealed.vrf_output_hex {
            (left_sealed, gateway_url(3))
        } else {
            (right_sealed, gateway_url(33))
        };

        h.deliver_manifest(&m1, &BOTH).await;
        h.deliver_manifest(&left, &BOTH).await;
        h.deliver_manifest(&right, &BOTH).await;
        assert_eq!(h.service.store().list_pending_candidates("stable", "android").len(), 2);

        h.deliver_manifest(&m2, &BOTH).await;
        let head = h.service.store().vrf_chain_state("stable", "android");
        assert_eq!(head.last_sequence, 3);
        assert_eq!(head.last_manifest_hash, winner.entry_hash);
        assert_eq!(head.last_vrf_output_hex, winner.vrf_output_hex);
        assert_eq!(h.metric(metrics::VRF_CONFLICT_RESOLVED), 1);
        assert_eq!(h.applier.state().https_requests.last(), Some(&winner_url));
        assert!(h.service.store().list_pending_candidates("stable", "android").is_empty());
    }

    #[tokio::test]
    async fn test_rollout_miss_stays_verified() {
        let h = harness();
        let (m1, _) = h.manifest_from(
            1,
            &genesis(),
            json!({"artifacts": [h.served_artifact(1)], "rollout": {"percent": 0}}),
        );
        h.deliver_manifest(&m1, &BOTH).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Verified);
        assert_eq!(snapshot.last_error.as_deref(), Some("rollout_not_hit"));
        assert_eq!(h.service.store().vrf_chain_state("stable", "android").last_sequence, 1);

        h.service.set_foreground(false).await;
        h.service.retry_apply().await;
        assert_eq!(h.service.snapshot().state, LifecycleState::Verified);
        assert!(h.applier.state().https_requests.is_empty());
    }

    #[tokio::test]
    async fn test_emergency_shell_applies_in_foreground() {
        let h = harness();
        let (m1, _) = h.manifest_from(
            1,
            &genesis(),
            json!({"artifacts": [shell_artifact(&h)], "rollout": {"percent": 0, "emergency": true}}),
        );
        h.deliver_manifest(&m1, &BOTH).await;

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Applied);
        assert_eq!(snapshot.current_version.as_deref(), Some("1.0.1"));
        assert_eq!(h.applier.state().applied, vec!["m-1".to_string()]);
        assert_eq!(h.applier.state().https_requests, vec![gateway_url(1)]);
    }

    #[tokio::test]
    async fn test_store_upgrade_passthrough() {
        let h = harness();
        assert!(h.service.trigger_store_upgrade(Some("market://details"), None).await);
        assert!(!h.service.trigger_store_upgrade(None, None).await);
        h.applier.update(|s| s.should_fail = true);
        assert!(!h.service.trigger_store_upgrade(Some("market://details"), None).await);
    }
}
