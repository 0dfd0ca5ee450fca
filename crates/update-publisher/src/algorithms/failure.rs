//! Carrier failure classification.

use crate::domain::{CarrierOutcome, PublishError};

const UNREACHABLE_HINTS: [&str; 4] = ["network", "unreachable", "dial", "bootstrap"];

/// Runtime text meaning the node itself is not up. Such text is stale
/// noise once the node has been started, so retries do not keep it.
pub fn is_not_ready_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("native_not_ready") || lowered.contains("node not started")
}

/// `" (gossip:..; feed:..)"` for the carriers that failed, empty when none did.
pub fn failure_suffix(gossip: &CarrierOutcome, feed: &CarrierOutcome) -> String {
    let mut parts = Vec::new();
    if let (false, Some(error)) = (gossip.ok, gossip.last_error.as_deref()) {
        parts.push(format!("gossip:{}", error));
    }
    if let (false, Some(error)) = (feed.ok, feed.last_error.as_deref()) {
        parts.push(format!("feed:{}", error));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join("; "))
    }
}

/// Map a failed gossip publish to its reason.
pub fn classify_gossip_failure(gossip: &CarrierOutcome, feed: &CarrierOutcome, connected_peers: usize) -> PublishError {
    let suffix = failure_suffix(gossip, feed);
    let text = suffix.to_lowercase();
    if is_not_ready_text(&text) {
        PublishError::NativeNotReady(suffix)
    } else if connected_peers == 0 || UNREACHABLE_HINTS.iter().any(|hint| text.contains(hint)) {
        PublishError::NetworkUnreachable(suffix)
    } else {
        PublishError::MissingGossip(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_lists_failed_carriers_only() {
        let gossip = CarrierOutcome::failed("pubsub_publish_failed");
        assert_eq!(
            failure_suffix(&gossip, &CarrierOutcome::delivered()),
            " (gossip:pubsub_publish_failed)"
        );
        assert_eq!(
            failure_suffix(&gossip, &CarrierOutcome::failed("feed_publish_failed")),
            " (gossip:pubsub_publish_failed; feed:feed_publish_failed)"
        );
        assert_eq!(failure_suffix(&CarrierOutcome::delivered(), &CarrierOutcome::delivered()), "");
    }

    #[test]
    fn test_classification_order() {
        let ok = CarrierOutcome::delivered();
        assert!(matches!(
            classify_gossip_failure(&CarrierOutcome::failed("Node not started"), &ok, 0),
            PublishError::NativeNotReady(_)
        ));
        assert!(matches!(
            classify_gossip_failure(&CarrierOutcome::failed("pubsub_publish_failed"), &ok, 0),
            PublishError::NetworkUnreachable(_)
        ));
        assert!(matches!(
            classify_gossip_failure(&CarrierOutcome::failed("dial backoff"), &ok, 3),
            PublishError::NetworkUnreachable(_)
        ));
        let missing = classify_gossip_failure(&CarrierOutcome::failed("pubsub_publish_failed"), &ok, 3);
        assert_eq!(missing.to_string(), "missing_carrier:gossip (gossip:pubsub_publish_failed)");
    }
}
