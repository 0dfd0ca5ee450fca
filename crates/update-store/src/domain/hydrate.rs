//! # Rehydration
//!
//! Rebuild [`UpdateStoreState`] from persisted JSON. Every nested record is
//! re-validated and malformed ones are dropped instead of failing the load.
//! A manual check is never resumed across restarts.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use update_protocol::fields::{self, Object};
use update_protocol::{normalize_chain_hash, parse_manifest, scope_key, Carrier, ChainHead};

use super::entities::{
    CandidateStatus, KillSwitchEntry, LatestSource, LifecycleState, PendingCandidate, ScopedVersionState,
    UpdateSnapshot, UpdateStoreState, VerifiedLatestState,
};

fn object_entries<'a>(obj: &'a Object, key: &str) -> impl Iterator<Item = (&'a String, &'a Object)> {
    obj.get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
        .filter_map(|(k, v)| v.as_object().map(|row| (k, row)))
}

fn counter_map(obj: &Object, key: &str) -> BTreeMap<String, u64> {
    obj.get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), fields::as_number(v).map(fields::truncate_u64).unwrap_or(0)))
                .collect()
        })
        .unwrap_or_default()
}

fn carriers(value: Option<&Value>) -> BTreeSet<Carrier> {
    fields::string_list(value)
        .iter()
        .filter_map(|c| Carrier::parse(c))
        .collect()
}

fn parse_snapshot(obj: &Object) -> UpdateSnapshot {
    let defaults = UpdateSnapshot::default();
    UpdateSnapshot {
        state: fields::text(obj, &["state"])
            .and_then(|s| LifecycleState::parse(&s))
            .unwrap_or(defaults.state),
        manifest_id: fields::text_strict(obj, &["manifest_id"]),
        channel: fields::text_strict(obj, &["channel"]).unwrap_or(defaults.channel),
        platform: fields::text_strict(obj, &["platform"]).unwrap_or(defaults.platform),
        sequence: fields::uint(obj, &["sequence"]).unwrap_or(0),
        version: fields::text_strict(obj, &["version"]),
        current_version: fields::text_strict(obj, &["current_version"]),
        current_version_code: fields::uint(obj, &["current_version_code"]),
        previous_version: fields::text_strict(obj, &["previous_version"]),
        previous_version_code: fields::uint(obj, &["previous_version_code"]),
        latest_version: fields::text_strict(obj, &["latest_version"]),
        latest_version_code: fields::uint(obj, &["latest_version_code"]),
        latest_manifest_verified: false,
        latest_manifest_verified_sequence: 0,
        latest_manifest_source: None,
        update_summary: fields::text_strict(obj, &["update_summary"]),
        update_details: fields::text_strict(obj, &["update_details"]),
        update_published_at_ms: fields::uint(obj, &["update_published_at_ms"]),
        show_update_prompt: fields::flag(obj, &["show_update_prompt"]).unwrap_or(false),
        vrf_candidate_status: obj
            .get("vrf_candidate_status")
            .and_then(Value::as_str)
            .map(CandidateStatus::parse)
            .unwrap_or_default(),
        vrf_candidate_carriers: carriers(obj.get("vrf_candidate_carriers")),
        last_manual_check_reason: obj
            .get("last_manual_check_reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        last_error: fields::text_strict(obj, &["last_error"]),
        last_checked_at_ms: fields::uint(obj, &["last_checked_at_ms"]).unwrap_or(0),
        updated_at_ms: fields::uint(obj, &["updated_at_ms"]).unwrap_or(0),
        attestor_count: fields::uint(obj, &["attestor_count"]).unwrap_or(0) as u32,
        attestation_threshold: fields::uint(obj, &["attestation_threshold"]).unwrap_or(0) as u32,
        shell_required: fields::flag(obj, &["shell_required"]).unwrap_or(false),
        emergency: fields::flag(obj, &["emergency"]).unwrap_or(false),
        manual_check_inflight: false,
    }
}

fn parse_applied(row: &Object) -> Option<ScopedVersionState> {
    let manifest_id = fields::text_strict(row, &["manifest_id"])?;
    let current_version = fields::text_strict(row, &["current_version"])?;
    let current_version_code = match row.get("current_version_code") {
        None | Some(Value::Null) => 0,
        Some(v) => fields::as_number(v).map(fields::truncate_u64)?,
    };
    let sequence = match row.get("sequence") {
        None | Some(Value::Null) => 0,
        Some(v) => fields::as_number(v).map(fields::truncate_u64)?,
    };
    Some(ScopedVersionState {
        sequence,
        manifest_id,
        current_version,
        current_version_code,
        previous_version: fields::text_strict(row, &["previous_version"]),
        previous_version_code: fields::uint(row, &["previous_version_code"]),
        updated_at_ms: fields::uint(row, &["updated_at_ms"]).unwrap_or(0),
    })
}

fn parse_verified_latest(row: &Object) -> Option<VerifiedLatestState> {
    let manifest_id = fields::text_strict(row, &["manifest_id"])?;
    let version = fields::text_strict(row, &["version"])?;
    let sequence = match row.get("sequence") {
        None | Some(Value::Null) => 0,
        Some(v) => fields::as_number(v).map(fields::truncate_u64)?,
    };
    let source = LatestSource::parse(&fields::text(row, &["source"]).unwrap_or_default());
    if sequence == 0 && source != LatestSource::InstalledPackage {
        return None;
    }
    Some(VerifiedLatestState {
        sequence,
        manifest_id,
        version,
        version_code: fields::uint(row, &["version_code", "versionCode"]).unwrap_or(0),
        source,
        update_summary: fields::text_strict(row, &["update_summary"]),
        update_details: fields::text_strict(row, &["update_details"]),
        update_published_at_ms: fields::uint(row, &["update_published_at_ms"]),
        updated_at_ms: fields::uint(row, &["updated_at_ms"]).unwrap_or(0),
    })
}

fn parse_chain_head(row: &Object, genesis: &ChainHead) -> ChainHead {
    let sequence = fields::uint(row, &["last_sequence"]).unwrap_or(0);
    if sequence == 0 {
        return genesis.clone();
    }
    ChainHead {
        last_sequence: sequence,
        last_manifest_hash: normalize_chain_hash(
            &fields::text(row, &["last_manifest_hash"]).unwrap_or_default(),
            &genesis.last_manifest_hash,
        ),
        last_vrf_output_hex: normalize_chain_hash(
            &fields::text(row, &["last_vrf_output_hex"]).unwrap_or_default(),
            &genesis.last_vrf_output_hex,
        ),
        updated_at_ms: fields::uint(row, &["updated_at_ms"]).unwrap_or(0),
    }
}

fn parse_candidate(candidate_id: &str, row: &Object) -> Option<PendingCandidate> {
    let channel = fields::text_strict(row, &["channel"])?;
    let platform = fields::text_strict(row, &["platform"])?;
    let manifest_id = fields::text_strict(row, &["manifest_id"])?;
    let sequence = fields::uint(row, &["sequence"]).filter(|s| *s > 0)?;
    let manifest_hash = normalize_chain_hash(&fields::text(row, &["manifest_hash"]).unwrap_or_default(), "");
    let vrf_output_hex = normalize_chain_hash(&fields::text(row, &["vrf_output_hex"]).unwrap_or_default(), "");
    if manifest_hash.is_empty() || vrf_output_hex.is_empty() {
        return None;
    }
    let manifest = row.get("manifest").and_then(|m| parse_manifest(m).ok())?;
    Some(PendingCandidate {
        candidate_id: candidate_id.to_string(),
        channel,
        platform,
        sequence,
        manifest_id,
        manifest_hash,
        vrf_output_hex,
        carriers: carriers(row.get("carriers")),
        seen_at_ms: fields::uint(row, &["seen_at_ms"]).unwrap_or(0),
        manifest,
    })
}

fn parse_kill_switch(value: &Value) -> Option<KillSwitchEntry> {
    let row = value.as_object()?;
    Some(KillSwitchEntry {
        channel: fields::text_strict(row, &["channel"]),
        platform: fields::text_strict(row, &["platform"]),
        enabled: fields::flag(row, &["enabled"]).unwrap_or(false),
        expires_at_ms: fields::uint(row, &["expires_at_ms"]).filter(|e| *e > 0),
        reason: fields::text(row, &["reason"]).unwrap_or_default(),
    })
}

fn string_vec(obj: &Object, key: &str) -> Vec<String> {
    fields::string_list(obj.get(key))
}

/// Rebuild a store from persisted JSON. `None` if the root is not an object.
pub fn hydrate_state(value: &Value, genesis: &ChainHead) -> Option<UpdateStoreState> {
    let root = value.as_object()?;
    let snapshot = root
        .get("snapshot")
        .and_then(Value::as_object)
        .map(parse_snapshot)
        .unwrap_or_default();

    let mut state = UpdateStoreState {
        snapshot,
        manifest: root.get("manifest").and_then(|m| parse_manifest(m).ok()),
        staged_file_path: fields::text_strict(root, &["staged_file_path"]),
        trusted_publisher_pubkey: fields::text_strict(root, &["trusted_publisher_pubkey"]),
        trusted_next_pubkey_sha256: fields::text_strict(root, &["trusted_next_pubkey_sha256"]),
        last_manifest_sequence_seen: fields::uint(root, &["last_manifest_sequence_seen"]).unwrap_or(0),
        attestors: string_vec(root, "attestors"),
        revoked_manifests: string_vec(root, "revoked_manifests"),
        killswitches: root
            .get("killswitches")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_kill_switch).collect())
            .unwrap_or_default(),
        max_sequence_applied: counter_map(root, "max_sequence_applied"),
        metrics: counter_map(root, "metrics"),
        applied_version_by_scope: object_entries(root, "applied_version_by_scope")
            .filter_map(|(k, row)| parse_applied(row).map(|s| (k.clone(), s)))
            .collect(),
        verified_latest_by_scope: object_entries(root, "verified_latest_by_scope")
            .filter_map(|(k, row)| parse_verified_latest(row).map(|s| (k.clone(), s)))
            .collect(),
        last_prompted_sequence_by_scope: counter_map(root, "last_prompted_sequence_by_scope"),
        last_prompted_version_code_by_scope: counter_map(root, "last_prompted_version_code_by_scope"),
        vrf_chain_by_scope: object_entries(root, "vrf_chain_by_scope")
            .map(|(k, row)| (k.clone(), parse_chain_head(row, genesis)))
            .collect(),
        pending_candidates_by_scope: root
            .get("pending_candidates_by_scope")
            .and_then(Value::as_object)
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|(scope, raw)| {
                        let candidates = raw
                            .as_object()
                            .map(|rows| {
                                rows.iter()
                                    .filter_map(|(id, row)| {
                                        row.as_object()
                                            .and_then(|row| parse_candidate(id, row))
                                            .map(|c| (id.clone(), c))
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        (scope.clone(), candidates)
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    let key = scope_key(&state.snapshot.channel, &state.snapshot.platform);
    if let Some(scoped) = state.applied_version_by_scope.get(&key) {
        let snapshot = &mut state.snapshot;
        if snapshot.current_version.is_none() {
            snapshot.current_version = Some(scoped.current_version.clone());
        }
        snapshot.current_version_code = snapshot.current_version_code.or(Some(scoped.current_version_code));
        if snapshot.previous_version.is_none() {
            snapshot.previous_version = scoped.previous_version.clone();
        }
        snapshot.previous_version_code = snapshot.previous_version_code.or(scoped.previous_version_code);
    }
    if state.verified_latest_by_scope.contains_key(&key) {
        let (channel, platform) = (state.snapshot.channel.clone(), state.snapshot.platform.clone());
        state.sync_snapshot_latest_from_scope(&channel, &platform);
    } else {
        let snapshot = &mut state.snapshot;
        if snapshot.latest_version.is_none() {
            snapshot.latest_version = snapshot.current_version.clone();
        }
        if snapshot.latest_version_code.is_none() {
            snapshot.latest_version_code = snapshot.current_version_code;
        }
    }
    Some(state)
}
