//! Staged rollout gating.

use update_crypto::sha256_hex;
use update_protocol::Rollout;

/// Stable bucket in `[0, 100)` for a device / manifest pair.
pub fn rollout_bucket(device_id: &str, manifest_id: &str) -> u32 {
    let digest = sha256_hex(format!("{}{}", device_id, manifest_id));
    u32::from_str_radix(&digest[..8], 16).unwrap_or(0) % 100
}

/// Whether the device falls inside the rollout.
pub fn should_enter_rollout(rollout: &Rollout, device_id: &str, manifest_id: &str) -> bool {
    if rollout.emergency || rollout.percent >= 100 {
        return true;
    }
    rollout_bucket(device_id, manifest_id) < u32::from(rollout.percent)
}
