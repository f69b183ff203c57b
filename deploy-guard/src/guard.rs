//! The guard aggregate: license verification, heartbeat and updates.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use deploy_guard_api::{AuthorityClient, UpdateInfo};
use deploy_guard_crypto::TrustVerifier;
use deploy_guard_license::{
    DeviceFingerprint, IdentityProvider, LicenseCache, LicenseSubject, LicenseVerifier,
    Verification,
};
use deploy_guard_update::{
    ComponentVersions, RequestScope, UpdateCallbacks, UpdateEngine, UpdateError, UpdateReport,
    UpdateStage,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Dispatch};

use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::heartbeat::{HeartbeatExit, HeartbeatScheduler};
use crate::state::{GuardState, StateMachine};

struct HeartbeatHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<HeartbeatExit>,
}

/// Runtime license guard for one host component.
///
/// Create it once at startup, call [`Guard::start`], and consult
/// [`Guard::check`] wherever the host needs to know whether it may keep
/// operating.
///
/// ```no_run
/// # async fn run() -> deploy_guard::GuardResult<()> {
/// use deploy_guard::{Guard, GuardConfig};
///
/// let guard = Guard::new(GuardConfig {
///     server_url: "https://license.example.com".into(),
///     license_key: "LK-0001".into(),
///     public_key_pem: std::fs::read_to_string("authority.pem")?,
///     project_slug: "acme".into(),
///     component_slug: "server".into(),
///     ..Default::default()
/// })?;
/// guard.start().await?;
/// guard.check()?;
/// # Ok(())
/// # }
/// ```
pub struct Guard {
    pub(crate) config: GuardConfig,
    pub(crate) client: AuthorityClient,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    verifier: LicenseVerifier,
    state: Arc<StateMachine>,
    pub(crate) versions: Arc<ComponentVersions>,
    pub(crate) engine: Arc<UpdateEngine>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    log_dispatch: Option<Dispatch>,
}

impl Guard {
    /// Builds a guard with the host's fingerprint and no callbacks.
    pub fn new(config: GuardConfig) -> GuardResult<Self> {
        GuardBuilder::new(config).build()
    }

    pub fn builder(config: GuardConfig) -> GuardBuilder {
        GuardBuilder::new(config)
    }

    /// Verifies the license and starts the heartbeat.
    ///
    /// A trusted cached license lets this succeed offline. Calling it again
    /// replaces the running heartbeat task.
    ///
    /// # Errors
    ///
    /// [`GuardError::Banned`] once the authority has killed this guard;
    /// otherwise the verification failure.
    pub async fn start(&self) -> GuardResult<()> {
        self.scoped(self.start_inner()).await
    }

    async fn start_inner(&self) -> GuardResult<()> {
        if self.state.current() == GuardState::Banned {
            return Err(GuardError::Banned);
        }

        match self.verifier.verify().await? {
            Verification::Cached(_) => debug!("license verified from cache"),
            Verification::Remote { update_frozen } => self.engine.set_frozen(update_frozen),
        }
        self.state.on_verify_success();

        let (cancel, cancelled) = watch::channel(false);
        let scheduler = HeartbeatScheduler::new(
            self.client.clone(),
            self.engine_scope(),
            Arc::clone(&self.state),
            Arc::clone(&self.engine),
            self.config.heartbeat_interval,
            self.config.grace.clone(),
        );
        let run = async move {
            let exit = scheduler.run(cancelled).await;
            info!(?exit, "heartbeat stopped");
            exit
        };
        let task = match &self.log_dispatch {
            Some(dispatch) => tokio::spawn(run.with_subscriber(dispatch.clone())),
            None => tokio::spawn(run),
        };

        let previous = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(HeartbeatHandle { cancel, task });
        if let Some(previous) = previous {
            let _ = previous.cancel.send(true);
        }

        info!(
            project = %self.config.project_slug,
            component = %self.config.component_slug,
            state = %self.state.current(),
            "guard started"
        );
        Ok(())
    }

    /// Signals the heartbeat loop to stop. In-flight requests and update
    /// attempts finish on their own.
    pub fn stop(&self) {
        if let Some(handle) = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = handle.cancel.send(true);
        }
    }

    /// Returns true while the heartbeat task is alive.
    pub fn is_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Returns `Ok` while the host may keep operating.
    pub fn check(&self) -> GuardResult<()> {
        match self.state.current() {
            GuardState::Active | GuardState::Grace => Ok(()),
            GuardState::Locked => Err(GuardError::Locked),
            GuardState::Banned => Err(GuardError::Banned),
            GuardState::Init => Err(GuardError::NotActivated),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.current()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn machine_id(&self) -> &str {
        self.identity.machine_id()
    }

    /// Version of the host component reported in heartbeats.
    pub fn version(&self) -> String {
        self.versions.primary()
    }

    pub fn set_version(&self, version: impl Into<String>) {
        self.versions.set_primary(version);
    }

    pub fn managed_version(&self, slug: &str) -> Option<String> {
        self.versions.get(slug)
    }

    pub fn set_managed_version(&self, slug: &str, version: impl Into<String>) {
        self.versions.set(slug, version);
    }

    /// Returns true while the authority has frozen updates.
    pub fn is_update_frozen(&self) -> bool {
        self.engine.is_frozen()
    }

    /// Updates `component` to `version` now, bypassing the heartbeat.
    pub async fn apply_update(&self, component: &str, version: &str) -> GuardResult<()> {
        self.scoped(self.engine.apply(component, version))
            .await
            .map_err(GuardError::from)
    }

    /// Runs `fut` under the injected log dispatcher, if any.
    pub(crate) async fn scoped<F: Future>(&self, fut: F) -> F::Output {
        match &self.log_dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    pub(crate) fn engine_scope(&self) -> RequestScope {
        RequestScope {
            license_key: self.config.license_key.clone(),
            machine_id: self.identity.machine_id().to_string(),
            project_slug: self.config.project_slug.clone(),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("project", &self.config.project_slug)
            .field("component", &self.config.component_slug)
            .field("state", &self.state.current())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Configures the optional parts of a [`Guard`].
pub struct GuardBuilder {
    config: GuardConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    callbacks: UpdateCallbacks,
    log_dispatch: Option<Dispatch>,
}

impl GuardBuilder {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            identity: None,
            callbacks: UpdateCallbacks::default(),
            log_dispatch: None,
        }
    }

    /// Replaces the host fingerprint as the machine identity.
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn update_callbacks(mut self, callbacks: UpdateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_update_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, UpdateStage, f64) + Send + Sync + 'static,
    {
        self.callbacks.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_update_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&UpdateReport<'_>) + Send + Sync + 'static,
    {
        self.callbacks.on_result = Some(Arc::new(f));
        self
    }

    pub fn on_update_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &UpdateError) + Send + Sync + 'static,
    {
        self.callbacks.on_failure = Some(Arc::new(f));
        self
    }

    pub fn on_update_available<F>(mut self, f: F) -> Self
    where
        F: Fn(&UpdateInfo) + Send + Sync + 'static,
    {
        self.callbacks.on_available = Some(Arc::new(f));
        self
    }

    /// Sends the guard's logs, including those of its background tasks, to
    /// `dispatch` instead of the global subscriber.
    pub fn log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> GuardResult<Guard> {
        let config = self.config;
        let trust: Arc<dyn TrustVerifier> = Arc::new(config.trust_verifier()?);
        let client = AuthorityClient::with_timeout(&config.server_url, config.request_timeout)?;
        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(DeviceFingerprint::generate()));

        let cache_root = config
            .cache_root
            .clone()
            .unwrap_or_else(LicenseCache::default_root);
        let cache = LicenseCache::new(cache_root, &config.project_slug, &config.component_slug);
        let verifier = LicenseVerifier::new(
            client.clone(),
            Arc::clone(&trust),
            Arc::clone(&identity),
            LicenseSubject {
                license_key: config.license_key.clone(),
                project_slug: config.project_slug.clone(),
                component_slug: config.component_slug.clone(),
            },
            cache,
        );

        let versions = Arc::new(ComponentVersions::new(
            config.component_slug.clone(),
            config.managed_components.iter().map(|c| c.slug.clone()),
        ));
        let scope = RequestScope {
            license_key: config.license_key.clone(),
            machine_id: identity.machine_id().to_string(),
            project_slug: config.project_slug.clone(),
        };
        let mut engine = UpdateEngine::new(
            client.clone(),
            trust,
            scope,
            config.ota.clone(),
            Arc::clone(&versions),
        )
        .with_components(config.managed_components.clone())
        .with_callbacks(self.callbacks);
        if let Some(dispatch) = &self.log_dispatch {
            engine = engine.with_log_dispatch(dispatch.clone());
        }

        Ok(Guard {
            config,
            client,
            identity,
            verifier,
            state: Arc::new(StateMachine::new()),
            versions,
            engine: Arc::new(engine),
            heartbeat: Mutex::new(None),
            log_dispatch: self.log_dispatch,
        })
    }
}
