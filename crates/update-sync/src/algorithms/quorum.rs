//! Carrier quorum.

use std::collections::BTreeSet;

use update_protocol::Carrier;

/// How many distinct required carriers must deliver a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarrierQuorum {
    required: BTreeSet<Carrier>,
    quorum: usize,
}

impl CarrierQuorum {
    /// Quorum over `required`, clamped to `1..=required.len()`.
    ///
    /// An empty required set falls back to both carriers.
    pub fn new(required: &[Carrier], quorum: usize) -> Self {
        let mut required: BTreeSet<Carrier> = required.iter().copied().collect();
        if required.is_empty() {
            required = [Carrier::Gossip, Carrier::Feed].into_iter().collect();
        }
        let quorum = quorum.clamp(1, required.len());
        Self { required, quorum }
    }

    /// Required carriers.
    pub fn required(&self) -> &BTreeSet<Carrier> {
        &self.required
    }

    /// Effective quorum.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// `seen` covers enough required carriers.
    pub fn is_met<'a>(&self, seen: impl IntoIterator<Item = &'a Carrier>) -> bool {
        let matched: BTreeSet<&Carrier> = seen.into_iter().filter(|c| self.required.contains(c)).collect();
        matched.len() >= self.quorum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_carrier_quorum() {
        let quorum = CarrierQuorum::new(&[Carrier::Gossip, Carrier::Feed], 2);
        assert!(!quorum.is_met(&[Carrier::Gossip]));
        assert!(!quorum.is_met(&[Carrier::Gossip, Carrier::Gossip]));
        assert!(quorum.is_met(&[Carrier::Feed, Carrier::Gossip]));
        assert!(!quorum.is_met(&Vec::<Carrier>::new()));
    }

    #[test]
    fn test_quorum_is_clamped() {
        assert_eq!(CarrierQuorum::new(&[Carrier::Gossip], 5).quorum(), 1);
        assert_eq!(CarrierQuorum::new(&[Carrier::Gossip, Carrier::Feed], 0).quorum(), 1);
        assert_eq!(CarrierQuorum::new(&[], 2).required().len(), 2);
    }

    #[test]
    fn test_unrequired_carrier_does_not_count() {
        let quorum = CarrierQuorum::new(&[Carrier::Feed], 1);
        assert!(!quorum.is_met(&[Carrier::Gossip]));
        assert!(quorum.is_met(&[Carrier::Feed]));
    }
}
