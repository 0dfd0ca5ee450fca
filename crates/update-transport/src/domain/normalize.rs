//! # Payload Normalization
//!
//! Producers deliver the same update message in many shapes: JSON text,
//! objects, base64 of either, feed rows wrapping any of those, arrays of
//! rows. These functions reduce all of them to plain JSON values and infer
//! a topic when the carrier did not provide one.

use serde_json::Value;
use update_crypto::decode_base64;
use update_protocol::{
    fields::{self, Object},
    is_update_topic, topic_for, TopicKind, ENVELOPE_KIND,
};

/// Feed row keys that may wrap the actual payload.
const FEED_WRAPPER_KEYS: [&str; 6] = ["payload", "entry", "data", "item", "content", "message"];

/// Parse JSON text, leaving anything else untouched.
pub fn normalize_payload(value: &Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Non-empty UTF-8 text decoded from base64.
pub fn decode_base64_text(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    decode_base64(text)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|decoded| !decoded.trim().is_empty())
}

fn json_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn base64_json(text: &str) -> Option<Value> {
    decode_base64_text(text).and_then(|decoded| json_text(&decoded))
}

/// True for objects tagged as an update envelope.
pub fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| fields::text(obj, &["kind"]))
        .map_or(false, |kind| kind == ENVELOPE_KIND)
}

/// Unwrap a pubsub bridge payload.
///
/// JSON text and base64 JSON are decoded; objects carrying `payloadBase64`
/// are decoded; other objects are taken as the payload itself. Absent or
/// undecodable input yields `fallback`.
pub fn parse_bridge_payload(value: Option<&Value>, fallback: &Value) -> Value {
    match value {
        None | Some(Value::Null) => fallback.clone(),
        Some(Value::String(text)) => json_text(text)
            .or_else(|| base64_json(text))
            .unwrap_or_else(|| fallback.clone()),
        Some(Value::Object(obj)) => match obj
            .get("payloadBase64")
            .and_then(Value::as_str)
            .and_then(decode_base64_text)
        {
            Some(decoded) => json_text(&decoded).unwrap_or(Value::String(decoded)),
            None => Value::Object(obj.clone()),
        },
        Some(other) => other.clone(),
    }
}

/// Normalize one feed candidate, decoding up to two layers of base64.
pub fn normalize_feed_candidate(value: &Value) -> Value {
    let normalized = normalize_payload(value);
    if let Value::String(text) = &normalized {
        if let Some(decoded) = decode_base64_text(text) {
            let inner = decode_base64_text(&decoded).unwrap_or(decoded);
            return json_text(&inner).unwrap_or(Value::String(inner));
        }
    }
    normalized
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Entries of a `network_event` body.
pub fn flatten_event_payload(value: &Value) -> Vec<Value> {
    match normalize_payload(value) {
        Value::Array(items) => items
            .iter()
            .map(normalize_payload)
            .filter(|item| !is_blank(item))
            .collect(),
        other if is_blank(&other) => Vec::new(),
        other => vec![other],
    }
}

fn push_candidate(out: &mut Vec<Value>, value: &Value) {
    match normalize_feed_candidate(value) {
        Value::Null => {}
        Value::Array(items) => items.iter().for_each(|item| push_candidate(out, item)),
        other => out.push(other),
    }
}

/// Every value of a feed row that might be an update message: the row
/// itself, then each wrapper field, arrays flattened.
pub fn extract_feed_candidates(value: &Value) -> Vec<Value> {
    let Some(row) = value.as_object() else {
        let fallback = normalize_feed_candidate(value);
        return if is_blank(&fallback) { Vec::new() } else { vec![fallback] };
    };
    let mut out = Vec::new();
    push_candidate(&mut out, value);
    for key in FEED_WRAPPER_KEYS {
        if let Some(inner) = row.get(key) {
            push_candidate(&mut out, inner);
        }
    }
    out
}

fn textual_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(_)) => true,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "false"),
        _ => false,
    }
}

/// Cheap test for rows worth running feed extraction on.
pub fn looks_like_update_payload(value: &Value, prefix: &str) -> bool {
    let Some(row) = value.as_object() else {
        return false;
    };
    if fields::text(row, &["topic"]).map_or(false, |t| is_update_topic(prefix, &t)) {
        return true;
    }
    let kind = fields::text(row, &["kind"]).unwrap_or_default().to_lowercase();
    if kind == ENVELOPE_KIND
        || matches!(
            kind.as_str(),
            "manifest_v2" | "attestation_v2" | "revoke_v2" | "revocation_v2" | "killswitch_v2"
        )
    {
        return true;
    }
    let manifest_like = row.contains_key("manifest_id")
        && row.contains_key("channel")
        && row.contains_key("platform")
        && row.contains_key("sequence");
    let attestation_like =
        row.contains_key("attestation_id") || (row.contains_key("attestor_peer_id") && row.contains_key("verdict"));
    manifest_like || attestation_like || textual_flag(row.get("enabled"))
}

/// Feed rows without a type, or typed as a content feed item.
pub fn is_content_feed_item(value: &Value) -> bool {
    let Some(row) = value.as_object() else {
        return false;
    };
    match fields::text(row, &["type"]) {
        None => true,
        Some(kind) => matches!(
            kind.to_lowercase().as_str(),
            "contentfeeditem" | "content_feed_item" | "feeditem"
        ),
    }
}

/// Infer the message kind from payload fields. Envelopes are looked through.
pub fn infer_message_kind(value: &Value) -> Option<TopicKind> {
    let row = value.as_object()?;
    if is_envelope(value) {
        let nested = normalize_payload(row.get("payload").unwrap_or(&Value::Null));
        return infer_message_kind(&nested);
    }

    let kind = fields::text(row, &["kind"]).unwrap_or_default().to_lowercase();
    if kind.contains("manifest") {
        return Some(TopicKind::Manifest);
    }
    if kind.contains("attestation") {
        return Some(TopicKind::Attestation);
    }
    if kind.contains("kill") && kind.contains("switch") {
        return Some(TopicKind::KillSwitch);
    }
    if kind.contains("revoke") || kind.contains("revocation") {
        return Some(TopicKind::Revoke);
    }
    infer_kind_from_fields(row)
}

fn infer_kind_from_fields(row: &Object) -> Option<TopicKind> {
    let has = |key: &str| row.contains_key(key);
    let positive_sequence = fields::number(row, &["sequence"]).map_or(false, |s| s > 0.0);

    if row.get("security").map_or(false, Value::is_object) {
        return Some(TopicKind::Manifest);
    }
    if row.get("targets").map_or(false, Value::is_array) {
        return Some(TopicKind::Revoke);
    }
    if fields::text(row, &["attestor_peer_id"]).is_some() {
        return Some(TopicKind::Attestation);
    }
    if row.get("enabled").map_or(false, Value::is_boolean) && has("reason") {
        return Some(TopicKind::KillSwitch);
    }
    if has("manifest_id") && (has("reason") || has("max_sequence") || has("targets")) {
        return Some(TopicKind::Revoke);
    }
    if row.get("artifacts").map_or(false, Value::is_array) && positive_sequence && has("version") {
        return Some(TopicKind::Manifest);
    }
    if has("manifest_id") && has("channel") && has("platform") && positive_sequence && has("version") {
        return Some(TopicKind::Manifest);
    }
    None
}

/// Topic for a payload: its explicit update topic, or one built from the
/// inferred kind and the payload scope (falling back to the given scope).
pub fn infer_message_topic(value: &Value, prefix: &str, channel: &str, platform: &str) -> Option<String> {
    let row = value.as_object()?;
    if let Some(topic) = fields::text(row, &["topic"]).filter(|t| is_update_topic(prefix, t)) {
        return Some(topic);
    }

    let base = if is_envelope(value) {
        normalize_payload(row.get("payload").unwrap_or(&Value::Null))
    } else {
        value.clone()
    };
    let kind = infer_message_kind(&base)?;
    let scope_source = base.as_object().unwrap_or(row);
    let channel = fields::text(scope_source, &["channel"]).unwrap_or_else(|| channel.to_string());
    let platform = fields::text(scope_source, &["platform"]).unwrap_or_else(|| platform.to_string());
    Some(topic_for(prefix, &channel, &platform, kind))
}

/// Any sign of life in a bootstrap status document.
pub fn has_bootstrap_connectivity_signal(status: &Value) -> bool {
    let Some(obj) = status.as_object() else {
        return false;
    };
    let positive = |keys: &[&str]| fields::number(obj, keys).map_or(false, |n| n > 0.0);
    positive(&["connected", "connected_peers"])
        || positive(&["known", "known_peers"])
        || positive(&["candidateCount", "candidate_count"])
        || positive(&["dialConnected", "dial_connected", "lastDialConnected"])
        || positive(&["announcementReceived", "announcement_received"])
}

/// `ns` and `/ns`, leading slashes normalized.
pub fn namespace_variants(namespace: &str) -> Vec<String> {
    let normalized = namespace.trim().trim_start_matches('/');
    if normalized.is_empty() {
        return Vec::new();
    }
    vec![normalized.to_string(), format!("/{}", normalized)]
}
