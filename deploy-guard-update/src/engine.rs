//! Update orchestration: request, download, verify, apply.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use deploy_guard_api::{AuthorityClient, UpdateInfo, PLATFORM_UNIVERSAL};
use deploy_guard_crypto::{decode_signature, TrustVerifier};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Dispatch};

use crate::bundle::{extract_bundle, ChannelReader};
use crate::callbacks::{UpdateCallbacks, UpdateReport, UpdateStage};
use crate::config::{ManagedComponent, OtaConfig, PostUpdateHook, UpdateStrategy};
use crate::download::{self, ArtifactMeta, RequestScope};
use crate::error::{UpdateError, UpdateResult};
use crate::swap;
use crate::versions::{ComponentVersions, UNKNOWN_VERSION};

/// Chunks buffered between the download and the bundle extractor.
const BUNDLE_CHANNEL_DEPTH: usize = 16;

/// Resolved destination of one component.
struct Target {
    path: PathBuf,
    strategy: UpdateStrategy,
    post_update: Option<PostUpdateHook>,
}

/// Downloads, verifies and installs component updates.
///
/// All attempts on one engine are serialized by a single lock, whatever
/// component they touch, so at most one filesystem swap is ever in
/// progress.
pub struct UpdateEngine {
    client: AuthorityClient,
    trust: Arc<dyn TrustVerifier>,
    scope: RequestScope,
    config: OtaConfig,
    components: Vec<ManagedComponent>,
    versions: Arc<ComponentVersions>,
    callbacks: UpdateCallbacks,
    frozen: AtomicBool,
    update_lock: Mutex<()>,
    log_dispatch: Option<Dispatch>,
}

impl UpdateEngine {
    pub fn new(
        client: AuthorityClient,
        trust: Arc<dyn TrustVerifier>,
        scope: RequestScope,
        config: OtaConfig,
        versions: Arc<ComponentVersions>,
    ) -> Self {
        Self {
            client,
            trust,
            scope,
            config,
            components: Vec::new(),
            versions,
            callbacks: UpdateCallbacks::default(),
            frozen: AtomicBool::new(false),
            update_lock: Mutex::new(()),
            log_dispatch: None,
        }
    }

    pub fn with_components(mut self, components: Vec<ManagedComponent>) -> Self {
        for component in &components {
            if self.versions.get(&component.slug).is_none() {
                self.versions.set(&component.slug, UNKNOWN_VERSION);
            }
        }
        self.components = components;
        self
    }

    pub fn with_callbacks(mut self, callbacks: UpdateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Runs dispatched update tasks under `dispatch` instead of the global
    /// subscriber.
    pub fn with_log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn versions(&self) -> &Arc<ComponentVersions> {
        &self.versions
    }

    pub fn components(&self) -> &[ManagedComponent] {
        &self.components
    }

    /// Mirrors the authority's freeze flag; frozen engines refuse to apply.
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Returns true if `slug` is the primary or a managed component.
    pub fn manages(&self, slug: &str) -> bool {
        slug == self.versions.primary_slug() || self.components.iter().any(|c| c.slug == slug)
    }

    /// Returns true while an attempt holds the update lock.
    pub fn is_busy(&self) -> bool {
        self.update_lock.try_lock().is_err()
    }

    /// Updates `component` to `version`, waiting for any attempt in
    /// progress to finish first.
    ///
    /// Callbacks fire for every attempt that gets past target resolution.
    /// On failure `on_failure` runs before `on_result`, and the recorded
    /// version is left as it was.
    pub async fn apply(&self, component: &str, version: &str) -> UpdateResult<()> {
        if self.is_frozen() {
            return Err(UpdateError::Frozen);
        }
        let target = self.target(component)?;
        let _permit = self.update_lock.lock().await;
        // The freeze may have arrived while this attempt was queued.
        if self.is_frozen() {
            return Err(UpdateError::Frozen);
        }

        let old_version = self
            .versions
            .get(component)
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        info!(component, old_version = %old_version, new_version = version, "starting update");

        let outcome = match target.strategy {
            UpdateStrategy::BinaryReplace => {
                self.update_binary(component, version, &target.path).await
            }
            UpdateStrategy::DirectorySwap => {
                self.update_directory(component, version, &target.path).await
            }
        };

        match outcome {
            Ok(()) => {
                self.versions.set(component, version);
                info!(
                    component,
                    old_version = %old_version,
                    new_version = version,
                    "update completed"
                );
                self.callbacks.progress(component, UpdateStage::Completed, 1.0);
                self.callbacks.result(&UpdateReport {
                    component,
                    old_version: &old_version,
                    new_version: version,
                    error: None,
                });
                if let Some(hook) = &target.post_update {
                    if let Err(e) = hook() {
                        warn!(component, error = %format!("{e:#}"), "post-update hook failed");
                    }
                }
                Ok(())
            }
            Err(err) => {
                error!(component, version, error = %err, "update failed");
                self.callbacks.failure(component, &err);
                self.callbacks.result(&UpdateReport {
                    component,
                    old_version: &old_version,
                    new_version: version,
                    error: Some(&err),
                });
                Err(err)
            }
        }
    }

    /// Handles one notification from a heartbeat.
    ///
    /// Reports it through `on_available`, then, when automatic updates are
    /// on and the component is managed here, spawns the attempt and
    /// returns its handle.
    pub fn dispatch(self: &Arc<Self>, info: UpdateInfo) -> Option<JoinHandle<UpdateResult<()>>> {
        if !info.update_available || info.latest.is_empty() {
            return None;
        }
        self.callbacks.available(&info);

        if !self.config.auto_update {
            info!(
                component = %info.component,
                version = %info.latest,
                "update available, automatic updates are off"
            );
            return None;
        }
        if !self.manages(&info.component) {
            debug!(component = %info.component, "ignoring update for unmanaged component");
            return None;
        }

        let engine = Arc::clone(self);
        let task = async move { engine.apply(&info.component, &info.latest).await };
        let handle = match &self.log_dispatch {
            Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
            None => tokio::spawn(task),
        };
        Some(handle)
    }

    fn target(&self, slug: &str) -> UpdateResult<Target> {
        if slug == self.versions.primary_slug() {
            let path = match &self.config.primary_target {
                Some(path) => path.clone(),
                None => std::env::current_exe()
                    .map_err(|e| UpdateError::Apply(format!("locate running executable: {e}")))?,
            };
            return Ok(Target {
                path,
                strategy: UpdateStrategy::BinaryReplace,
                post_update: None,
            });
        }
        self.components
            .iter()
            .find(|c| c.slug == slug)
            .map(|c| Target {
                path: c.target.clone(),
                strategy: c.strategy,
                post_update: c.post_update.clone(),
            })
            .ok_or_else(|| UpdateError::UnknownComponent(slug.to_string()))
    }

    async fn update_binary(
        &self,
        component: &str,
        version: &str,
        target: &Path,
    ) -> UpdateResult<()> {
        self.callbacks.progress(component, UpdateStage::Requesting, 0.0);
        let meta = download::request_meta(
            &self.client,
            &self.scope,
            component,
            version,
            &self.config.os,
            &self.config.arch,
            self.config.download_timeout,
        )
        .await?;

        self.callbacks.progress(component, UpdateStage::Downloading, 0.3);
        let (staged, digest) = download::download_to_file(
            &self.client,
            &meta.url,
            parent_dir(target),
            self.config.max_artifact_bytes,
            self.config.download_timeout,
        )
        .await?;

        self.callbacks.progress(component, UpdateStage::Verifying, 0.6);
        self.verify_artifact(component, &meta, &digest, true)?;

        self.callbacks.progress(component, UpdateStage::Applying, 0.8);
        let target = target.to_path_buf();
        run_blocking(move || swap::replace_binary(staged, &target)).await
    }

    async fn update_directory(
        &self,
        component: &str,
        version: &str,
        live: &Path,
    ) -> UpdateResult<()> {
        self.callbacks.progress(component, UpdateStage::Requesting, 0.0);
        let meta = download::request_meta(
            &self.client,
            &self.scope,
            component,
            version,
            PLATFORM_UNIVERSAL,
            PLATFORM_UNIVERSAL,
            self.config.download_timeout,
        )
        .await?;

        self.callbacks.progress(component, UpdateStage::Downloading, 0.3);
        let parent = parent_dir(live);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdateError::Apply(format!("create {}: {e}", parent.display())))?;
        let staging = tempfile::Builder::new()
            .prefix(".deploy-guard-")
            .tempdir_in(parent)
            .map_err(|e| UpdateError::Apply(format!("stage bundle in {}: {e}", parent.display())))?;

        self.callbacks.progress(component, UpdateStage::Extracting, 0.5);
        let (tx, rx) = mpsc::channel::<Bytes>(BUNDLE_CHANNEL_DEPTH);
        let root = staging.path().to_path_buf();
        let extractor =
            tokio::task::spawn_blocking(move || extract_bundle(ChannelReader::new(rx), &root));
        let downloaded = download::download_to_channel(
            &self.client,
            &meta.url,
            self.config.max_artifact_bytes,
            self.config.download_timeout,
            tx,
        )
        .await;
        let extracted = extractor
            .await
            .map_err(|e| UpdateError::Apply(format!("extraction task failed: {e}")))?;
        let digest = downloaded?;

        self.callbacks.progress(component, UpdateStage::Verifying, 0.8);
        self.verify_artifact(component, &meta, &digest, self.config.require_bundle_signature)?;
        let files = extracted?;
        debug!(component, files, "bundle verified");

        self.callbacks.progress(component, UpdateStage::Applying, 0.9);
        let live = live.to_path_buf();
        run_blocking(move || {
            let result = swap::swap_directory(staging.path(), &live);
            drop(staging);
            result
        })
        .await
    }

    /// Checks the digest, then the detached signature over the hex digest.
    fn verify_artifact(
        &self,
        component: &str,
        meta: &ArtifactMeta,
        actual: &str,
        require_signature: bool,
    ) -> UpdateResult<()> {
        if meta.sha256.is_empty() || !actual.eq_ignore_ascii_case(&meta.sha256) {
            return Err(UpdateError::Verify(format!(
                "hash mismatch: expected {}, got {actual}",
                meta.sha256
            )));
        }

        let Some(encoded) = meta.signature.as_deref() else {
            if require_signature {
                return Err(UpdateError::Verify("artifact is not signed".to_string()));
            }
            warn!(component, "accepting unsigned artifact on hash alone");
            return Ok(());
        };
        let signature = decode_signature(encoded)
            .ok_or_else(|| UpdateError::Verify("signature is not valid base64".to_string()))?;
        if !self.trust.verify(meta.sha256.as_bytes(), &signature) {
            return Err(UpdateError::Verify(
                "signature does not match the trusted key".to_string(),
            ));
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

async fn run_blocking<F>(f: F) -> UpdateResult<()>
where
    F: FnOnce() -> UpdateResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UpdateError::Apply(format!("apply task failed: {e}")))?
}
