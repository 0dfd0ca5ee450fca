//! # Store State Machine
//!
//! Every mutation of [`UpdateStoreState`]. These are pure: the service wraps
//! them with locking, persistence and broadcast.
//!
//! Version ordering everywhere is [`compare_version_vector`]; a scope's
//! applied version is only replaced by one that is strictly ahead.

use std::cmp::Ordering;

use update_protocol::{
    compare_version_vector, normalize_chain_hash, normalize_version_code, scope_key, Carrier, ChainHead, Manifest,
    VersionVector,
};

use super::entities::{
    installed_manifest_id, CandidateStatus, KillSwitchEntry, LatestSource, LifecycleState, PendingCandidate,
    ScopedVersionState, UpdateStoreState, VerifiedLatestState,
};

fn vector(version: Option<&str>, version_code: Option<u64>, sequence: u64) -> VersionVector<'_> {
    VersionVector {
        version,
        version_code,
        sequence: Some(sequence),
    }
}

fn manifest_vector(manifest: &Manifest) -> VersionVector<'_> {
    VersionVector::new(&manifest.version, manifest.version_code, manifest.sequence)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl UpdateStoreState {
    /// Snapshot shows this scope.
    pub fn scope_matches_snapshot(&self, channel: &str, platform: &str) -> bool {
        self.snapshot.channel.eq_ignore_ascii_case(channel) && self.snapshot.platform.eq_ignore_ascii_case(platform)
    }

    /// Copy the scope's verified-latest record onto the snapshot, or fall
    /// back to the applied version.
    pub fn sync_snapshot_latest_from_scope(&mut self, channel: &str, platform: &str) {
        if !self.scope_matches_snapshot(channel, platform) {
            return;
        }
        let snapshot = &mut self.snapshot;
        match self.verified_latest_by_scope.get(&scope_key(channel, platform)) {
            Some(verified) => {
                snapshot.latest_version = Some(verified.version.clone());
                snapshot.latest_version_code = Some(verified.version_code);
                snapshot.update_summary = verified.update_summary.clone();
                snapshot.update_details = verified.update_details.clone();
                snapshot.update_published_at_ms = verified.update_published_at_ms;
                snapshot.latest_manifest_verified = true;
                snapshot.latest_manifest_verified_sequence = verified.sequence;
                snapshot.latest_manifest_source = Some(verified.source);
            }
            None => {
                snapshot.latest_version = snapshot.current_version.clone();
                snapshot.latest_version_code = snapshot.current_version_code;
                snapshot.update_summary = None;
                snapshot.update_details = None;
                snapshot.update_published_at_ms = None;
                snapshot.latest_manifest_verified = false;
                snapshot.latest_manifest_verified_sequence = 0;
                snapshot.latest_manifest_source = None;
            }
        }
    }

    fn current_for_scope(&self, channel: &str, platform: &str) -> (Option<&str>, Option<u64>, u64) {
        let key = scope_key(channel, platform);
        let matches = self.scope_matches_snapshot(channel, platform);
        match self.applied_version_by_scope.get(&key) {
            Some(scoped) => (
                Some(scoped.current_version.as_str()),
                Some(scoped.current_version_code),
                scoped.sequence,
            ),
            None if matches => (
                self.snapshot.current_version.as_deref(),
                self.snapshot.current_version_code,
                0,
            ),
            None => (None, None, 0),
        }
    }

    /// The scope has a verified latest version ahead of the applied one that
    /// has not been prompted yet.
    pub fn should_show_prompt(&self, channel: &str, platform: &str) -> bool {
        let key = scope_key(channel, platform);
        let Some(verified) = self.verified_latest_by_scope.get(&key) else {
            return false;
        };
        let (version, code, sequence) = self.current_for_scope(channel, platform);
        let latest = vector(Some(verified.version.as_str()), Some(verified.version_code), verified.sequence);
        if compare_version_vector(&latest, &vector(version, code, sequence)) != Ordering::Greater {
            return false;
        }
        let prompted_sequence = self.last_prompted_sequence_by_scope.get(&key).copied().unwrap_or(0);
        if verified.sequence > 0 && verified.sequence <= prompted_sequence {
            return false;
        }
        let prompted_code = self.last_prompted_version_code_by_scope.get(&key).copied().unwrap_or(0);
        if let Some(code) = normalize_version_code(Some(verified.version_code)) {
            if prompted_code >= code {
                return false;
            }
        }
        true
    }

    /// Raise the scope's verified-latest record to `manifest` if it is not behind.
    pub fn upsert_verified_latest_for_manifest(&mut self, manifest: &Manifest, now_ms: u64) -> VerifiedLatestState {
        let key = scope_key(&manifest.channel, &manifest.platform);
        let existing = self.verified_latest_by_scope.get(&key);
        let replace = match existing {
            None => true,
            Some(existing) => {
                let ord = compare_version_vector(
                    &manifest_vector(manifest),
                    &vector(Some(existing.version.as_str()), Some(existing.version_code), existing.sequence),
                );
                ord == Ordering::Greater || (ord == Ordering::Equal && manifest.sequence >= existing.sequence)
            }
        };
        if !replace {
            if let Some(existing) = existing {
                return existing.clone();
            }
        }
        let notes = manifest.release_notes();
        let next = VerifiedLatestState {
            sequence: manifest.sequence,
            manifest_id: manifest.manifest_id.clone(),
            version: manifest.version.clone(),
            version_code: manifest.version_code,
            source: LatestSource::NetworkManifest,
            update_summary: notes.as_ref().map(|n| n.summary.clone()),
            update_details: notes.as_ref().map(|n| n.details.clone()),
            update_published_at_ms: notes.as_ref().map(|n| n.published_at_ms),
            updated_at_ms: now_ms,
        };
        self.verified_latest_by_scope.insert(key, next.clone());
        next
    }

    fn upsert_verified_latest_from_installed(
        &mut self,
        channel: &str,
        platform: &str,
        version: &str,
        version_code: Option<u64>,
        now_ms: u64,
    ) {
        let key = scope_key(channel, platform);
        let code = normalize_version_code(version_code).unwrap_or(0);
        if let Some(existing) = self.verified_latest_by_scope.get(&key) {
            let ord = compare_version_vector(
                &vector(Some(version), Some(code), 0),
                &vector(Some(existing.version.as_str()), Some(existing.version_code), existing.sequence),
            );
            if ord == Ordering::Less || (ord == Ordering::Equal && existing.source == LatestSource::NetworkManifest) {
                return;
            }
        }
        self.verified_latest_by_scope.insert(
            key,
            VerifiedLatestState {
                sequence: 0,
                manifest_id: installed_manifest_id(channel, platform, version, Some(code)),
                version: version.to_string(),
                version_code: code,
                source: LatestSource::InstalledPackage,
                update_summary: None,
                update_details: None,
                update_published_at_ms: None,
                updated_at_ms: now_ms,
            },
        );
    }

    /// Start or finish a manual check.
    pub fn set_manual_check_inflight(&mut self, inflight: bool, now_ms: u64) {
        self.snapshot.manual_check_inflight = inflight;
        if inflight {
            self.snapshot.last_checked_at_ms = now_ms;
            self.snapshot.last_manual_check_reason = None;
        }
    }

    /// Record the manual check outcome. Blank clears it.
    pub fn set_manual_check_reason(&mut self, reason: Option<&str>) {
        self.snapshot.last_manual_check_reason = non_blank(reason).map(|r| r.trim().to_string());
    }

    /// Promotion status and carriers of the newest candidate.
    pub fn set_vrf_candidate_status(&mut self, status: CandidateStatus, carriers: impl IntoIterator<Item = Carrier>) {
        self.snapshot.vrf_candidate_status = status;
        self.snapshot.vrf_candidate_carriers = carriers.into_iter().collect();
    }

    /// Record the version the platform reports as installed.
    ///
    /// A fresh scope takes it as its applied version. An existing scope takes
    /// it when it is ahead, or when it is behind a record that never came
    /// from the chain (sequence 0).
    pub fn set_installed_version(
        &mut self,
        channel: &str,
        platform: &str,
        version: &str,
        version_code: Option<u64>,
        now_ms: u64,
    ) {
        let version = version.trim();
        if version.is_empty() {
            return;
        }
        let code = normalize_version_code(version_code);
        let key = scope_key(channel, platform);
        match self.applied_version_by_scope.get(&key).cloned() {
            None => {
                self.applied_version_by_scope.insert(
                    key,
                    ScopedVersionState {
                        sequence: 0,
                        manifest_id: installed_manifest_id(channel, platform, version, code),
                        current_version: version.to_string(),
                        current_version_code: code.unwrap_or(0),
                        previous_version: None,
                        previous_version_code: None,
                        updated_at_ms: now_ms,
                    },
                );
            }
            Some(scoped) => {
                let ord = compare_version_vector(
                    &vector(Some(version), code, scoped.sequence),
                    &vector(Some(scoped.current_version.as_str()), Some(scoped.current_version_code), scoped.sequence),
                );
                if ord == Ordering::Greater || (ord == Ordering::Less && scoped.sequence == 0) {
                    self.applied_version_by_scope.insert(
                        key,
                        ScopedVersionState {
                            sequence: scoped.sequence,
                            manifest_id: installed_manifest_id(channel, platform, version, code),
                            current_version: version.to_string(),
                            current_version_code: code.unwrap_or(scoped.current_version_code),
                            previous_version: Some(scoped.current_version.clone()),
                            previous_version_code: Some(scoped.current_version_code),
                            updated_at_ms: now_ms,
                        },
                    );
                }
            }
        }

        let matches = self.scope_matches_snapshot(channel, platform);
        if matches {
            self.snapshot.current_version = Some(version.to_string());
            if code.is_some() {
                self.snapshot.current_version_code = code;
            }
        }
        self.upsert_verified_latest_from_installed(channel, platform, version, code, now_ms);
        self.sync_snapshot_latest_from_scope(channel, platform);
        if matches {
            self.snapshot.show_update_prompt = self.should_show_prompt(channel, platform);
        }
    }

    /// Make `manifest` the manifest in flight, state `DETECTED`.
    pub fn set_manifest_detected(&mut self, manifest: &Manifest, now_ms: u64) {
        let key = scope_key(&manifest.channel, &manifest.platform);
        let matches = self.scope_matches_snapshot(&manifest.channel, &manifest.platform);
        let scoped = self.applied_version_by_scope.get(&key).cloned();
        let snapshot = &self.snapshot;

        let current_version = match non_blank(snapshot.current_version.as_deref()) {
            Some(v) if matches => Some(v.to_string()),
            _ => scoped.as_ref().map(|s| s.current_version.clone()),
        };
        let current_version_code = match normalize_version_code(snapshot.current_version_code) {
            Some(c) if matches => Some(c),
            _ => scoped.as_ref().map(|s| s.current_version_code),
        };
        let previous_version = match non_blank(snapshot.previous_version.as_deref()) {
            Some(v) if matches => Some(v.to_string()),
            _ => scoped.as_ref().and_then(|s| s.previous_version.clone()),
        };
        let previous_version_code = match normalize_version_code(snapshot.previous_version_code) {
            Some(c) if matches => Some(c),
            _ => scoped.as_ref().and_then(|s| s.previous_version_code),
        };
        let applied_sequence = scoped.as_ref().map_or(0, |s| s.sequence);
        let ahead_of_applied = compare_version_vector(
            &manifest_vector(manifest),
            &vector(current_version.as_deref(), current_version_code, applied_sequence),
        ) == Ordering::Greater;

        self.manifest = Some(manifest.clone());
        self.last_manifest_sequence_seen = self.last_manifest_sequence_seen.max(manifest.sequence);

        let snapshot = &mut self.snapshot;
        snapshot.state = LifecycleState::Detected;
        snapshot.manifest_id = Some(manifest.manifest_id.clone());
        snapshot.channel = manifest.channel.clone();
        snapshot.platform = manifest.platform.clone();
        snapshot.sequence = manifest.sequence;
        snapshot.version = Some(manifest.version.clone());
        snapshot.attestor_count = 0;
        snapshot.attestation_threshold = manifest.security.attestation_threshold;
        snapshot.shell_required = manifest.shell_required();
        snapshot.emergency = manifest.rollout.emergency;
        snapshot.current_version = current_version;
        snapshot.current_version_code = current_version_code;
        snapshot.previous_version = previous_version;
        snapshot.previous_version_code = previous_version_code;

        let latest = self.upsert_verified_latest_for_manifest(manifest, now_ms);
        self.sync_snapshot_latest_from_scope(&manifest.channel, &manifest.platform);
        let is_latest = compare_version_vector(
            &manifest_vector(manifest),
            &vector(Some(latest.version.as_str()), Some(latest.version_code), latest.sequence),
        ) == Ordering::Equal;
        self.snapshot.show_update_prompt =
            ahead_of_applied && is_latest && self.should_show_prompt(&manifest.channel, &manifest.platform);
        self.attestors.clear();
    }

    /// Set the lifecycle state and error together.
    pub fn set_state_only(&mut self, state: LifecycleState, error: Option<&str>) {
        self.snapshot.state = state;
        self.snapshot.last_error = error.map(str::to_string);
    }

    /// Set or clear the error.
    pub fn set_last_error(&mut self, error: Option<&str>) {
        self.snapshot.last_error = error.map(str::to_string);
    }

    /// Record a positive attestor. Returns the distinct count.
    pub fn add_attestor(&mut self, peer_id: &str) -> usize {
        let peer_id = peer_id.trim();
        if peer_id.is_empty() {
            return self.attestors.len();
        }
        if !self.attestors.iter().any(|a| a == peer_id) {
            self.attestors.push(peer_id.to_string());
        }
        self.snapshot.attestor_count = self.attestors.len() as u32;
        self.attestors.len()
    }

    /// Set or clear the staged artifact path.
    pub fn set_staged_file(&mut self, path: Option<&str>) {
        self.staged_file_path = path.map(str::to_string);
    }

    /// Commit `manifest` as applied.
    pub fn mark_applied(&mut self, manifest: &Manifest, now_ms: u64) {
        self.snapshot.state = LifecycleState::Applied;
        self.snapshot.last_error = None;
        let key = scope_key(&manifest.channel, &manifest.platform);

        let max = self.max_sequence_applied.entry(key.clone()).or_insert(0);
        *max = (*max).max(manifest.sequence);

        let scoped = self.applied_version_by_scope.get(&key).cloned();
        let replace = match &scoped {
            None => true,
            Some(s) => {
                compare_version_vector(
                    &manifest_vector(manifest),
                    &vector(Some(s.current_version.as_str()), Some(s.current_version_code), s.sequence),
                ) == Ordering::Greater
            }
        };
        let applied = match scoped {
            Some(existing) if !replace => existing,
            previous => {
                let next = ScopedVersionState {
                    sequence: manifest.sequence,
                    manifest_id: manifest.manifest_id.clone(),
                    current_version: manifest.version.clone(),
                    current_version_code: manifest.version_code,
                    previous_version: previous.as_ref().map(|s| s.current_version.clone()),
                    previous_version_code: previous.as_ref().map(|s| s.current_version_code),
                    updated_at_ms: now_ms,
                };
                self.applied_version_by_scope.insert(key.clone(), next.clone());
                next
            }
        };
        self.snapshot.current_version = Some(applied.current_version);
        self.snapshot.current_version_code = Some(applied.current_version_code);
        self.snapshot.previous_version = applied.previous_version;
        self.snapshot.previous_version_code = applied.previous_version_code;

        self.upsert_verified_latest_for_manifest(manifest, now_ms);
        self.sync_snapshot_latest_from_scope(&manifest.channel, &manifest.platform);
        self.snapshot.show_update_prompt = self.should_show_prompt(&manifest.channel, &manifest.platform);

        let prompted = self.last_prompted_sequence_by_scope.entry(key.clone()).or_insert(0);
        *prompted = (*prompted).max(manifest.sequence);
        if let Some(code) = normalize_version_code(Some(manifest.version_code)) {
            let prompted_code = self.last_prompted_version_code_by_scope.entry(key).or_insert(0);
            *prompted_code = (*prompted_code).max(code);
        }
    }

    /// Highest applied sequence of a scope.
    pub fn max_applied_sequence(&self, channel: &str, platform: &str) -> u64 {
        self.max_sequence_applied
            .get(&scope_key(channel, platform))
            .copied()
            .unwrap_or(0)
    }

    /// Applied version code of a scope, 0 when unknown.
    pub fn max_applied_version_code(&self, channel: &str, platform: &str) -> u64 {
        self.scoped_version_state(channel, platform)
            .and_then(|s| normalize_version_code(Some(s.current_version_code)))
            .unwrap_or(0)
    }

    /// Applied version record of a scope.
    pub fn scoped_version_state(&self, channel: &str, platform: &str) -> Option<&ScopedVersionState> {
        self.applied_version_by_scope.get(&scope_key(channel, platform))
    }

    /// Add a revoked manifest id.
    pub fn add_revoked_manifest(&mut self, manifest_id: &str) {
        let manifest_id = manifest_id.trim();
        if !manifest_id.is_empty() && !self.is_manifest_revoked(manifest_id) {
            self.revoked_manifests.push(manifest_id.to_string());
        }
    }

    /// Manifest id was revoked.
    pub fn is_manifest_revoked(&self, manifest_id: &str) -> bool {
        let manifest_id = manifest_id.trim();
        !manifest_id.is_empty() && self.revoked_manifests.iter().any(|m| m == manifest_id)
    }

    /// Replace the kill-switch with the same key.
    pub fn upsert_kill_switch(&mut self, entry: KillSwitchEntry) {
        let key = entry.key();
        self.killswitches.retain(|item| item.key() != key);
        self.killswitches.push(entry);
    }

    /// Any kill-switch covers the scope.
    pub fn kill_switch_active(&self, channel: &str, platform: &str, now_ms: u64) -> bool {
        self.killswitches
            .iter()
            .any(|item| item.is_active_for(channel, platform, now_ms))
    }

    /// Add to a named counter.
    pub fn increment_metric(&mut self, name: &str, delta: u64) {
        *self.metrics.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Counter value.
    pub fn metric(&self, name: &str) -> u64 {
        self.metrics.get(name).copied().unwrap_or(0)
    }

    /// Publisher tools unlock only when a network-verified latest version
    /// is ahead of a known applied version and the network is healthy.
    pub fn can_show_publisher_zone(&self, channel: &str, platform: &str) -> bool {
        let key = scope_key(channel, platform);
        let matches = self.scope_matches_snapshot(channel, platform);
        let snapshot = &self.snapshot;

        let network_unreachable = |reason: &Option<String>| reason.as_deref() == Some("network_unreachable");
        if matches && (network_unreachable(&snapshot.last_error) || network_unreachable(&snapshot.last_manual_check_reason))
        {
            return false;
        }

        let verified = self.verified_latest_by_scope.get(&key);
        let (latest_version, latest_code, latest_sequence, latest_source, latest_verified) = match verified {
            Some(v) => (Some(v.version.as_str()), Some(v.version_code), v.sequence, Some(v.source), true),
            None if matches => (
                snapshot.latest_version.as_deref(),
                snapshot.latest_version_code,
                snapshot.latest_manifest_verified_sequence,
                snapshot.latest_manifest_source,
                snapshot.latest_manifest_verified,
            ),
            None => (None, None, 0, None, false),
        };
        if !latest_verified || latest_source != Some(LatestSource::NetworkManifest) {
            return false;
        }

        let (current_version, current_code, current_sequence) = self.current_for_scope(channel, platform);
        if non_blank(current_version).is_none() && normalize_version_code(current_code).is_none() && current_sequence == 0 {
            return false;
        }
        compare_version_vector(
            &vector(latest_version, latest_code, latest_sequence),
            &vector(current_version, current_code, current_sequence),
        ) == Ordering::Greater
    }

    /// Remember that the user saw the prompt for `sequence` / `version_code`.
    pub fn ack_update_prompt(&mut self, channel: &str, platform: &str, sequence: u64, version_code: Option<u64>) {
        let key = scope_key(channel, platform);
        let prompted = self.last_prompted_sequence_by_scope.entry(key.clone()).or_insert(0);
        *prompted = (*prompted).max(sequence);

        let code = normalize_version_code(version_code.or(self.snapshot.latest_version_code));
        if let Some(code) = code {
            let prompted_code = self.last_prompted_version_code_by_scope.entry(key).or_insert(0);
            *prompted_code = (*prompted_code).max(code);
        }

        if self.scope_matches_snapshot(channel, platform) {
            let latest_code = normalize_version_code(self.snapshot.latest_version_code).unwrap_or(0);
            if self.snapshot.sequence <= sequence || code.map_or(false, |c| latest_code <= c) {
                self.snapshot.show_update_prompt = false;
            }
        }
    }

    /// Chain head of a scope, normalized against `genesis`.
    pub fn vrf_chain_state(&self, channel: &str, platform: &str, genesis: &ChainHead) -> ChainHead {
        self.vrf_chain_by_scope
            .get(&scope_key(channel, platform))
            .map(|head| head.normalized(genesis))
            .unwrap_or_else(|| genesis.clone())
    }

    /// Replace the chain head of a scope. Sequence 0 resets to genesis.
    pub fn set_vrf_chain_state(
        &mut self,
        channel: &str,
        platform: &str,
        next: &ChainHead,
        genesis: &ChainHead,
        now_ms: u64,
    ) {
        let head = if next.last_sequence == 0 {
            genesis.clone()
        } else {
            ChainHead {
                last_sequence: next.last_sequence,
                last_manifest_hash: normalize_chain_hash(&next.last_manifest_hash, &genesis.last_manifest_hash),
                last_vrf_output_hex: normalize_chain_hash(&next.last_vrf_output_hex, &genesis.last_vrf_output_hex),
                updated_at_ms: now_ms,
            }
        };
        self.vrf_chain_by_scope.insert(scope_key(channel, platform), head);
    }

    /// Pending candidates of a scope.
    pub fn list_pending_candidates(&self, channel: &str, platform: &str) -> Vec<PendingCandidate> {
        self.pending_candidates_by_scope
            .get(&scope_key(channel, platform))
            .map(|scoped| scoped.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Merge a candidate, unioning carriers with any existing entry.
    pub fn upsert_pending_candidate(&mut self, candidate: PendingCandidate, now_ms: u64) -> PendingCandidate {
        let mut normalized = PendingCandidate {
            candidate_id: candidate.candidate_id.trim().to_string(),
            channel: candidate.channel.trim().to_lowercase(),
            platform: candidate.platform.trim().to_lowercase(),
            manifest_id: candidate.manifest_id.trim().to_string(),
            manifest_hash: normalize_chain_hash(&candidate.manifest_hash, ""),
            vrf_output_hex: normalize_chain_hash(&candidate.vrf_output_hex, ""),
            seen_at_ms: if candidate.seen_at_ms == 0 { now_ms } else { candidate.seen_at_ms },
            ..candidate
        };
        let key = scope_key(&normalized.channel, &normalized.platform);
        let scoped = self.pending_candidates_by_scope.entry(key).or_default();
        if let Some(existing) = scoped.get(&normalized.candidate_id) {
            normalized.carriers.extend(existing.carriers.iter().copied());
            normalized.seen_at_ms = normalized.seen_at_ms.max(existing.seen_at_ms);
        }
        scoped.insert(normalized.candidate_id.clone(), normalized.clone());
        normalized
    }

    /// Drop one candidate.
    pub fn remove_pending_candidate(&mut self, channel: &str, platform: &str, candidate_id: &str) {
        let candidate_id = candidate_id.trim();
        if candidate_id.is_empty() {
            return;
        }
        if let Some(scoped) = self.pending_candidates_by_scope.get_mut(&scope_key(channel, platform)) {
            scoped.remove(candidate_id);
        }
    }

    /// Drop candidates at or below `up_to_sequence`, or all of them.
    pub fn clear_pending_candidates(&mut self, channel: &str, platform: &str, up_to_sequence: Option<u64>) {
        let scoped = self
            .pending_candidates_by_scope
            .entry(scope_key(channel, platform))
            .or_default();
        match up_to_sequence.filter(|s| *s > 0) {
            None => scoped.clear(),
            Some(boundary) => scoped.retain(|_, c| c.sequence > boundary),
        }
    }

    /// Drop candidates not seen within `ttl_ms` (0 keeps them), then the
    /// oldest ones until at most `max_entries` remain. Returns how many went.
    pub fn prune_pending_candidates(
        &mut self,
        channel: &str,
        platform: &str,
        max_entries: usize,
        ttl_ms: u64,
        now_ms: u64,
    ) -> usize {
        let Some(scoped) = self.pending_candidates_by_scope.get_mut(&scope_key(channel, platform)) else {
            return 0;
        };
        let before = scoped.len();
        if ttl_ms > 0 {
            scoped.retain(|_, c| c.seen_at_ms.saturating_add(ttl_ms) > now_ms);
        }
        if scoped.len() > max_entries {
            let mut by_age: Vec<(u64, String)> = scoped
                .values()
                .map(|c| (c.seen_at_ms, c.candidate_id.clone()))
                .collect();
            by_age.sort_unstable();
            let excess = scoped.len() - max_entries;
            for (_, candidate_id) in by_age.into_iter().take(excess) {
                scoped.remove(&candidate_id);
            }
        }
        before - scoped.len()
    }

    /// Pin the single-publisher key chain.
    pub fn set_trusted_publisher_chain(
        &mut self,
        publisher_pubkey: Option<&str>,
        next_pubkey_sha256: Option<&str>,
        sequence_seen: Option<u64>,
    ) {
        self.trusted_publisher_pubkey = non_blank(publisher_pubkey).map(|k| k.trim().to_string());
        self.trusted_next_pubkey_sha256 = non_blank(next_pubkey_sha256).map(|k| k.trim().to_string());
        if let Some(sequence) = sequence_seen {
            self.last_manifest_sequence_seen = self.last_manifest_sequence_seen.max(sequence);
        }
    }
}
