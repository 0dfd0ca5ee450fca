//! Wire topics: `{prefix}/{channel}/{platform}/{kind}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default topic prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "/updates/v2";

/// Message kind carried on a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    /// Update manifests.
    Manifest,
    /// Peer attestations.
    Attestation,
    /// Revocations.
    Revoke,
    /// Kill-switches.
    #[serde(rename = "killswitch")]
    KillSwitch,
}

impl TopicKind {
    /// All kinds, in subscription order.
    pub const ALL: [TopicKind; 4] = [
        TopicKind::Manifest,
        TopicKind::Attestation,
        TopicKind::Revoke,
        TopicKind::KillSwitch,
    ];

    /// Topic suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Manifest => "manifest",
            TopicKind::Attestation => "attestation",
            TopicKind::Revoke => "revoke",
            TopicKind::KillSwitch => "killswitch",
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full topic for a scope and kind.
pub fn topic_for(prefix: &str, channel: &str, platform: &str, kind: TopicKind) -> String {
    format!(
        "{}/{}/{}/{}",
        prefix.trim_end_matches('/'),
        channel,
        platform,
        kind.as_str()
    )
}

/// Whether `topic` lives under `prefix`, ignoring leading slashes.
pub fn is_update_topic(prefix: &str, topic: &str) -> bool {
    let prefix = prefix.trim().trim_matches('/');
    let topic = topic.trim().trim_start_matches('/');
    !prefix.is_empty() && topic.starts_with(prefix) && topic[prefix.len()..].starts_with('/')
}

/// Kind from the last topic segment.
pub fn parse_topic_kind(topic: &str) -> Option<TopicKind> {
    let last = topic.trim().trim_end_matches('/').rsplit('/').next()?;
    match last.to_lowercase().as_str() {
        "manifest" => Some(TopicKind::Manifest),
        "attestation" => Some(TopicKind::Attestation),
        "revoke" => Some(TopicKind::Revoke),
        "killswitch" => Some(TopicKind::KillSwitch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_for() {
        assert_eq!(
            topic_for("/updates/v2/", "stable", "android", TopicKind::KillSwitch),
            "/updates/v2/stable/android/killswitch"
        );
    }

    #[test]
    fn test_is_update_topic() {
        assert!(is_update_topic("/updates/v2", "updates/v2/stable/android/manifest"));
        assert!(is_update_topic("updates/v2", "//updates/v2/beta/ios/revoke"));
        assert!(!is_update_topic("/updates/v2", "/updates/v20/x"));
        assert!(!is_update_topic("/updates/v2", "/chat/room"));
    }

    #[test]
    fn test_parse_topic_kind() {
        assert_eq!(parse_topic_kind("/updates/v2/a/b/attestation"), Some(TopicKind::Attestation));
        assert_eq!(parse_topic_kind("/updates/v2/a/b/other"), None);
    }
}
