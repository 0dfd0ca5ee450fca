//! # Outbound Port
//!
//! The platform update plugin: artifact fetching over P2P providers or
//! HTTPS, staging, native apply and install bookkeeping.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use update_protocol::Manifest;

use crate::domain::{
    ApplierError, ApplierResult, ApplyOutcome, ChunkRequest, InstallResult, InstalledVersion,
};

/// Platform update plugin.
#[async_trait]
pub trait UpdateApplier: Send + Sync {
    /// Host platform: `android`, `ios` or `web`.
    fn platform(&self) -> String;

    /// Artifact providers can be asked over P2P.
    fn supports_p2p(&self) -> bool;

    /// Peers providing `key`.
    async fn find_providers(&self, key: &str, limit: usize) -> ApplierResult<Vec<String>>;

    /// Ask one provider for the artifact bytes.
    async fn request_chunk(&self, peer_id: &str, request: &ChunkRequest, max_bytes: usize) -> ApplierResult<Vec<u8>>;

    /// Plain HTTPS GET.
    async fn fetch_https(&self, url: &str) -> ApplierResult<Vec<u8>>;

    /// Stage a resource or delta artifact. Returns the staged path.
    async fn stage_resource_delta(&self, manifest: &Manifest, bytes: &[u8]) -> ApplierResult<String>;

    /// Stage a shell package. Returns the staged path.
    async fn stage_shell_package(&self, manifest: &Manifest, bytes: &[u8]) -> ApplierResult<String>;

    /// Install a staged shell package.
    async fn apply_shell_package(&self, manifest: &Manifest, staged_path: Option<&str>) -> ApplierResult<ApplyOutcome>;

    /// Take the result of an out-of-band install, if any.
    async fn consume_install_result(&self) -> ApplierResult<InstallResult>;

    /// Installed package version.
    async fn installed_version(&self) -> ApplierResult<Option<InstalledVersion>>;

    /// Open the platform store page.
    async fn open_store_upgrade(&self, app_store_url: Option<&str>, test_flight_url: Option<&str>) -> ApplierResult<bool>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Observable state of [`MockUpdateApplier`].
#[derive(Clone, Debug)]
pub struct MockApplierState {
    /// Reported platform.
    pub platform: String,
    /// P2P providers reachable.
    pub supports_p2p: bool,
    /// Providers returned for any key.
    pub providers: Vec<String>,
    /// Chunk bytes by provider peer id.
    pub chunks: HashMap<String, Vec<u8>>,
    /// HTTPS bodies by URL.
    pub https: HashMap<String, Vec<u8>>,
    /// Staging fails with this text.
    pub stage_error: Option<String>,
    /// Outcome of shell applies.
    pub apply_outcome: ApplyOutcome,
    /// Shell applies fail with this text.
    pub apply_error: Option<String>,
    /// Install results handed out in order.
    pub install_results: VecDeque<InstallResult>,
    /// Reported installed version.
    pub installed: Option<InstalledVersion>,
    /// Provider lookups.
    pub provider_lookups: Vec<String>,
    /// Chunk requests `(peer, request)`.
    pub chunk_requests: Vec<(String, ChunkRequest)>,
    /// HTTPS URLs fetched.
    pub https_requests: Vec<String>,
    /// Staged paths.
    pub staged: Vec<String>,
    /// Manifest ids passed to shell apply.
    pub applied: Vec<String>,
    /// Store upgrade requests.
    pub store_upgrades: usize,
    /// Every async call errors.
    pub should_fail: bool,
}

impl Default for MockApplierState {
    fn default() -> Self {
        Self {
            platform: "android".to_string(),
            supports_p2p: true,
            providers: Vec::new(),
            chunks: HashMap::new(),
            https: HashMap::new(),
            stage_error: None,
            apply_outcome: ApplyOutcome::Applied,
            apply_error: None,
            install_results: VecDeque::new(),
            installed: None,
            provider_lookups: Vec::new(),
            chunk_requests: Vec::new(),
            https_requests: Vec::new(),
            staged: Vec::new(),
            applied: Vec::new(),
            store_upgrades: 0,
            should_fail: false,
        }
    }
}

/// In-memory update plugin for tests.
#[derive(Default)]
pub struct MockUpdateApplier {
    state: Mutex<MockApplierState>,
}

impl MockUpdateApplier {
    /// Android host, empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applier with the given state.
    pub fn with_state(state: MockApplierState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Modify the state.
    pub fn update(&self, f: impl FnOnce(&mut MockApplierState)) {
        f(&mut self.state.lock());
    }

    /// Copy of the state.
    pub fn state(&self) -> MockApplierState {
        self.state.lock().clone()
    }

    /// Serve `bytes` for an HTTPS URL.
    pub fn serve_https(&self, url: &str, bytes: &[u8]) {
        self.state.lock().https.insert(url.to_string(), bytes.to_vec());
    }

    /// Serve `bytes` from a P2P provider.
    pub fn serve_provider(&self, peer_id: &str, bytes: &[u8]) {
        let mut state = self.state.lock();
        if !state.providers.iter().any(|p| p == peer_id) {
            state.providers.push(peer_id.to_string());
        }
        state.chunks.insert(peer_id.to_string(), bytes.to_vec());
    }

    /// Queue an install result.
    pub fn push_install_result(&self, result: InstallResult) {
        self.state.lock().install_results.push_back(result);
    }

    fn guard(&self) -> ApplierResult<()> {
        if self.state.lock().should_fail {
            return Err(ApplierError::Unavailable);
        }
        Ok(())
    }

    fn stage(&self, manifest: &Manifest, kind: &str) -> ApplierResult<String> {
        self.guard()?;
        let mut state = self.state.lock();
        if let Some(error) = &state.stage_error {
            return Err(ApplierError::Rejected(error.clone()));
        }
        let path = format!("memory://{}/{}", manifest.manifest_id, kind);
        state.staged.push(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl UpdateApplier for MockUpdateApplier {
    fn platform(&self) -> String {
        self.state.lock().platform.clone()
    }

    fn supports_p2p(&self) -> bool {
        self.state.lock().supports_p2p
    }

    async fn find_providers(&self, key: &str, limit: usize) -> ApplierResult<Vec<String>> {
        self.guard()?;
        let mut state = self.state.lock();
        state.provider_lookups.push(key.to_string());
        Ok(state.providers.iter().take(limit).cloned().collect())
    }

    async fn request_chunk(&self, peer_id: &str, request: &ChunkRequest, max_bytes: usize) -> ApplierResult<Vec<u8>> {
        self.guard()?;
        let mut state = self.state.lock();
        state.chunk_requests.push((peer_id.to_string(), request.clone()));
        match state.chunks.get(peer_id) {
            Some(bytes) => Ok(bytes.iter().take(max_bytes).copied().collect()),
            None => Err(ApplierError::Rejected("provider_unreachable".to_string())),
        }
    }

    async fn fetch_https(&self, url: &str) -> ApplierResult<Vec<u8>> {
        self.guard()?;
        let mut state = self.state.lock();
        state.https_requests.push(url.to_string());
        state
            .https
            .get(url)
            .cloned()
            .ok_or_else(|| ApplierError::Http("404".to_string()))
    }

    async fn stage_resource_delta(&self, manifest: &Manifest, _bytes: &[u8]) -> ApplierResult<String> {
        self.stage(manifest, "resource")
    }

    async fn stage_shell_package(&self, manifest: &Manifest, _bytes: &[u8]) -> ApplierResult<String> {
        self.stage(manifest, "shell")
    }

    async fn apply_shell_package(&self, manifest: &Manifest, _staged_path: Option<&str>) -> ApplierResult<ApplyOutcome> {
        self.guard()?;
        let mut state = self.state.lock();
        state.applied.push(manifest.manifest_id.clone());
        if let Some(error) = &state.apply_error {
            return Err(ApplierError::Rejected(error.clone()));
        }
        Ok(state.apply_outcome)
    }

    async fn consume_install_result(&self) -> ApplierResult<InstallResult> {
        self.guard()?;
        Ok(self.state.lock().install_results.pop_front().unwrap_or_default())
    }

    async fn installed_version(&self) -> ApplierResult<Option<InstalledVersion>> {
        self.guard()?;
        Ok(self.state.lock().installed.clone())
    }

    async fn open_store_upgrade(&self, app_store_url: Option<&str>, test_flight_url: Option<&str>) -> ApplierResult<bool> {
        self.guard()?;
        self.state.lock().store_upgrades += 1;
        Ok(app_store_url.is_some() || test_flight_url.is_some())
    }
}
