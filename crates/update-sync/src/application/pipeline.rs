//! Download, stage and apply the manifest in flight.
//!
//! Every await point is followed by an abort check: a revocation or
//! kill-switch that lands mid-pipeline wins over the install.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use update_protocol::{Artifact, ArtifactKind, Manifest};
use update_store::LifecycleState;
use update_verifier::should_enter_rollout;

use super::service::SyncInner;
use crate::algorithms::{to_gateway_url, verify_artifact_hash};
use crate::domain::{metrics, ApplyOutcome, ChunkRequest, DownloadSource, DownloadedArtifact, InstallStatus};

const ANDROID: &str = "android";
const IOS: &str = "ios";

/// Holds the single download slot for its lifetime.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncInner {
    /// Native platform artifacts are built for.
    fn target_platform(&self) -> String {
        let platform = self.applier.platform().trim().to_lowercase();
        if platform == ANDROID || platform == IOS {
            platform
        } else {
            ANDROID.to_string()
        }
    }

    /// Stop the pipeline if the manifest in flight got revoked or killed.
    pub(crate) fn should_abort(&self, manifest: &Manifest) -> bool {
        if self.store.read(|s| s.snapshot.state) == LifecycleState::Revoked {
            return true;
        }
        match self.blocked_by_control(manifest) {
            Some(reason) => {
                warn!("[update-sync] aborting {}: {}", manifest.manifest_id, reason);
                self.store.clear_staged_file();
                self.store.set_state_only(LifecycleState::Revoked, Some(reason));
                true
            }
            None => false,
        }
    }

    fn fail(&self, reason: &str) {
        self.store.set_state_only(LifecycleState::Failed, Some(reason));
    }

    fn clear_session_for(&self, manifest_id: &str) {
        let mut session = self.session.lock();
        if session.pending_install.as_deref() == Some(manifest_id) {
            session.pending_install = None;
        }
        if session.user_action_required.as_deref() == Some(manifest_id) {
            session.user_action_required = None;
        }
    }

    /// Advance the manifest in flight as far as its gates allow.
    pub(crate) async fn maybe_download_and_apply(&self) {
        if self.download_in_flight.load(Ordering::SeqCst) {
            return;
        }
        if self.reconcile_install_result().await {
            return;
        }

        let Some(manifest) = self.store.read(|s| s.manifest.clone()) else {
            return;
        };
        let baseline = self.applied_baseline(&manifest.channel, &manifest.platform);
        if !baseline.is_exceeded_by(&manifest) {
            debug!(
                "[update-sync] {} is not ahead of the applied version",
                manifest.manifest_id
            );
            return;
        }
        if self.should_abort(&manifest) {
            return;
        }
        if !should_enter_rollout(&manifest.rollout, &self.verifier.device_id(), &manifest.manifest_id) {
            debug!(
                "[update-sync] {} held back by its {}% rollout",
                manifest.manifest_id, manifest.rollout.percent
            );
            return;
        }
        let (attestors, threshold) = self
            .store
            .read(|s| (s.attestors.len(), s.snapshot.attestation_threshold as usize));
        if attestors < threshold {
            debug!(
                "[update-sync] {} waiting for attestations ({}/{})",
                manifest.manifest_id, attestors, threshold
            );
            return;
        }

        let target = self.target_platform();
        let Some(artifact) = manifest.select_artifact(&target).cloned() else {
            self.fail("artifact_missing");
            return;
        };
        let Some(expected_sha256) = artifact.sha256.clone() else {
            self.fail("artifact_sha256_missing");
            return;
        };

        {
            let session = self.session.lock();
            let id = Some(manifest.manifest_id.as_str());
            if session.pending_install.as_deref() == id || session.user_action_required.as_deref() == id {
                return;
            }
        }
        let Some(_slot) = InFlight::acquire(&self.download_in_flight) else {
            return;
        };

        let (staged_path, state, current_id) = self.store.read(|s| {
            (
                s.staged_file_path.clone(),
                s.snapshot.state,
                s.snapshot.manifest_id.clone(),
            )
        });
        if staged_path.is_some()
            && state == LifecycleState::Staged
            && current_id.as_deref() == Some(manifest.manifest_id.as_str())
        {
            self.apply_from_staged(&manifest, &artifact, staged_path.as_deref())
                .await;
            return;
        }

        if self.should_abort(&manifest) {
            return;
        }
        self.store.set_state_only(LifecycleState::Attested, None);
        let downloaded = self
            .download(&manifest, &artifact, &expected_sha256, &target)
            .await;
        if self.should_abort(&manifest) {
            return;
        }
        let Some(downloaded) = downloaded.filter(|d| !d.bytes.is_empty()) else {
            self.fail("download_failed");
            return;
        };
        if !verify_artifact_hash(&downloaded.bytes, Some(&expected_sha256)) {
            warn!(
                "[update-sync] {} artifact hash mismatch ({:?})",
                manifest.manifest_id, downloaded.source
            );
            self.fail("sha256_mismatch");
            return;
        }
        self.store.set_state_only(LifecycleState::Downloaded, None);

        let shell = manifest.shell_required() || artifact.shell_required;
        let staged = if !shell || matches!(artifact.kind, ArtifactKind::Resource | ArtifactKind::Delta) {
            self.applier
                .stage_resource_delta(&manifest, &downloaded.bytes)
                .await
        } else {
            self.applier
                .stage_shell_package(&manifest, &downloaded.bytes)
                .await
        };
        if self.should_abort(&manifest) {
            return;
        }
        let staged_path = match staged {
            Ok(path) => path,
            Err(e) => {
                let reason = e.to_string();
                self.fail(if reason.trim().is_empty() { "stage_failed" } else { reason.as_str() });
                return;
            }
        };
        self.store.set_staged_file(Some(&staged_path));
        self.store.set_state_only(LifecycleState::Staged, None);
        self.apply_from_staged(&manifest, &artifact, Some(&staged_path))
            .await;
    }

    /// P2P providers first on Android, gateway HTTPS after that.
    async fn download(
        &self,
        manifest: &Manifest,
        artifact: &Artifact,
        expected_sha256: &str,
        target: &str,
    ) -> Option<DownloadedArtifact> {
        if target == ANDROID && self.applier.supports_p2p() {
            if let Some(bytes) = self.fetch_via_p2p(manifest, artifact, expected_sha256).await {
                return Some(DownloadedArtifact {
                    bytes,
                    source: DownloadSource::P2p,
                });
            }
            self.store.increment_metric(metrics::DOWNLOAD_FALLBACK);
            debug!(
                "[update-sync] no provider served {}, using gateway",
                manifest.manifest_id
            );
        }
        let url = to_gateway_url(&artifact.uri, &self.config.ipfs_gateway);
        match self.applier.fetch_https(&url).await {
            Ok(bytes) => Some(DownloadedArtifact {
                bytes,
                source: DownloadSource::Https,
            }),
            Err(e) => {
                warn!("[update-sync] gateway download of {} failed: {}", url, e);
                None
            }
        }
    }

    /// Ask providers in turn until one serves bytes with the right hash.
    async fn fetch_via_p2p(&self, manifest: &Manifest, artifact: &Artifact, expected_sha256: &str) -> Option<Vec<u8>> {
        let providers = match self
            .applier
            .find_providers(&artifact.uri, self.config.provider_limit)
            .await
        {
            Ok(providers) => providers,
            Err(e) => {
                debug!("[update-sync] provider lookup failed: {}", e);
                return None;
            }
        };
        let deadline = Instant::now() + Duration::from_millis(self.config.provider_timeout_ms);
        let request = ChunkRequest::artifact(&manifest.manifest_id, &artifact.uri, expected_sha256);
        for peer in providers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("[update-sync] provider budget exhausted");
                break;
            }
            let chunk = tokio::time::timeout(
                remaining,
                self.applier
                    .request_chunk(&peer, &request, self.config.provider_chunk_bytes),
            )
            .await;
            match chunk {
                Ok(Ok(bytes)) if verify_artifact_hash(&bytes, Some(expected_sha256)) => {
                    debug!("[update-sync] {} served by {}", manifest.manifest_id, peer);
                    return Some(bytes);
                }
                Ok(Ok(_)) => debug!("[update-sync] provider {} served bad bytes", peer),
                Ok(Err(e)) => debug!("[update-sync] provider {} failed: {}", peer, e),
                Err(_) => debug!("[update-sync] provider {} timed out", peer),
            }
        }
        None
    }

    async fn apply_from_staged(&self, manifest: &Manifest, artifact: &Artifact, staged_path: Option<&str>) {
        let shell = manifest.shell_required() || artifact.shell_required;
        if shell && staged_path.is_none() {
            self.fail("staged_path_missing");
            return;
        }
        if shell && !manifest.rollout.emergency && self.foreground.load(Ordering::SeqCst) {
            debug!(
                "[update-sync] {} staged until the app is backgrounded",
                manifest.manifest_id
            );
            self.store.set_state_only(LifecycleState::Staged, None);
            return;
        }

        self.store.set_state_only(LifecycleState::Applying, None);
        let outcome = if shell {
            self.applier.apply_shell_package(manifest, staged_path).await
        } else {
            Ok(ApplyOutcome::Applied)
        };
        if self.should_abort(manifest) {
            return;
        }
        match outcome {
            Err(e) => {
                self.clear_session_for(&manifest.manifest_id);
                let reason = e.to_string();
                self.fail(if reason.trim().is_empty() { "apply_failed" } else { reason.as_str() });
            }
            Ok(ApplyOutcome::RequiresUserAction) => {
                info!("[update-sync] {} needs user confirmation", manifest.manifest_id);
                self.session.lock().user_action_required = Some(manifest.manifest_id.clone());
                self.store.set_state_only(LifecycleState::Staged, None);
            }
            Ok(ApplyOutcome::PendingInstall) => {
                debug!("[update-sync] {} install pending", manifest.manifest_id);
                self.session.lock().pending_install = Some(manifest.manifest_id.clone());
                self.store.set_state_only(LifecycleState::Staged, None);
            }
            Ok(ApplyOutcome::Applied) => self.commit_applied(manifest),
        }
    }

    fn commit_applied(&self, manifest: &Manifest) {
        self.store.mark_applied(manifest);
        self.store.clear_staged_file();
        self.clear_session_for(&manifest.manifest_id);
        self.store.increment_metric(metrics::APPLY_SUCCESS);
        info!(
            "[update-sync] applied {} (version {}, seq {})",
            manifest.manifest_id, manifest.version, manifest.sequence
        );
    }

    /// Fold the result of an out-of-band install into the store. Returns
    /// whether the install was recorded as failed.
    pub(crate) async fn reconcile_install_result(&self) -> bool {
        if self.target_platform() != ANDROID {
            return false;
        }
        let result = match self.applier.consume_install_result().await {
            Ok(result) => result,
            Err(e) => {
                debug!("[update-sync] install result unavailable: {}", e);
                return false;
            }
        };
        if result.status == InstallStatus::None {
            return false;
        }
        let (current_id, manifest) = self
            .store
            .read(|s| (s.snapshot.manifest_id.clone(), s.manifest.clone()));
        let result_id = result
            .manifest_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let current_id = current_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
        if let (Some(result_id), Some(current_id)) = (result_id, current_id) {
            if result_id != current_id {
                debug!(
                    "[update-sync] install result for {} ignored, {} in flight",
                    result_id, current_id
                );
                return false;
            }
        }
        let Some(id) = result_id.or(current_id).map(str::to_string) else {
            return false;
        };

        match result.status {
            InstallStatus::Success => {
                match manifest.filter(|m| m.manifest_id == id) {
                    Some(manifest) => self.commit_applied(&manifest),
                    None => {
                        self.store.set_state_only(LifecycleState::Applied, None);
                        self.store.clear_staged_file();
                        self.clear_session_for(&id);
                        self.store.increment_metric(metrics::APPLY_SUCCESS);
                    }
                }
                false
            }
            InstallStatus::Pending => {
                self.session.lock().pending_install = Some(id);
                false
            }
            InstallStatus::Failed => {
                let waiting_on_user = {
                    let mut session = self.session.lock();
                    if session.pending_install.as_deref() == Some(id.as_str()) {
                        session.pending_install = None;
                    }
                    session.user_action_required.as_deref() == Some(id.as_str())
                };
                if waiting_on_user {
                    return false;
                }
                let message = result
                    .message
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or("install_failed");
                self.fail(message);
                true
            }
            InstallStatus::None => false,
        }
    }
}
