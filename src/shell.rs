//! Application shell.
//!
//! LIFECYCLE
//! =========
//! `boot` wires the session store, HTTP transport, realtime channel and
//! router from one validated [`PortalConfig`]. `mount` lands on the initial
//! route and fires the mounted hook, which queues the startup
//! `send_message`. `shutdown` closes the realtime channel.
//!
//! Realtime events are logged by a single subscriber task installed at boot,
//! so each event is reported exactly once no matter how often the shell
//! navigates.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, PortalConfig};
use crate::realtime::{RealtimeError, RealtimeEvent, RealtimeHandle};
use crate::router::{Resolution, Router, RouterError};
use crate::session::{FileStore, SessionContext, SessionStore, StoreError};
use crate::transport::{ApiClient, ApiError};

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("application is already mounted")]
    AlreadyMounted,
}

pub struct Application {
    config: PortalConfig,
    session: SessionContext,
    api: ApiClient,
    realtime: RealtimeHandle,
    router: Router,
    event_logger: JoinHandle<()>,
    mounted: bool,
}

impl Application {
    /// Boot against the durable session file from `config`.
    ///
    /// # Errors
    ///
    /// See [`Application::boot_with_store`].
    pub fn boot(config: PortalConfig) -> Result<Self, ShellError> {
        let store = FileStore::new(config.session.resolved_path());
        tracing::debug!(path = %store.path().display(), "session store");
        Self::boot_with_store(config, Arc::new(store))
    }

    /// Boot with an explicit session store. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Api`] if the HTTP client cannot be built and
    /// [`ShellError::Router`] if the route table is inconsistent.
    pub fn boot_with_store(config: PortalConfig, store: Arc<dyn SessionStore>) -> Result<Self, ShellError> {
        let session = SessionContext::new(store);
        let api = ApiClient::new(&config.api)?;
        let realtime = RealtimeHandle::connect(&config.realtime);
        let event_logger = spawn_event_logger(realtime.subscribe());
        let router = Router::portal(session.clone())?;

        tracing::info!(
            api = %api.base_url(),
            realtime = %config.realtime.url,
            routes = router.table().len(),
            "application booted"
        );

        Ok(Self { config, session, api, realtime, router, event_logger, mounted: false })
    }

    /// Navigate to the initial route and run the mounted hook once.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::AlreadyMounted`] on a second call, a router
    /// error if the initial route cannot be resolved, and a realtime error if
    /// the startup message cannot be queued.
    pub fn mount(&mut self) -> Result<Resolution, ShellError> {
        if self.mounted {
            return Err(ShellError::AlreadyMounted);
        }
        let resolution = self.router.push(&self.config.router.initial_route)?;
        self.mounted = true;

        self.realtime.send_message(&self.config.realtime.startup_message)?;
        tracing::info!(route = resolution.path().unwrap_or("-"), "application mounted");
        Ok(resolution)
    }

    /// # Errors
    ///
    /// See [`Router::push`].
    pub fn navigate(&mut self, location: &str) -> Result<Resolution, ShellError> {
        Ok(self.router.push(location)?)
    }

    /// # Errors
    ///
    /// See [`Router::back`].
    pub fn back(&mut self) -> Result<Option<Resolution>, ShellError> {
        Ok(self.router.back()?)
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn realtime(&self) -> &RealtimeHandle {
        &self.realtime
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Close the realtime channel and stop the event logger.
    pub async fn shutdown(self) {
        self.realtime.close().await;
        self.event_logger.abort();
        tracing::info!("application shut down");
    }
}

fn spawn_event_logger(mut events: broadcast::Receiver<RealtimeEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "realtime event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &RealtimeEvent) {
    match event {
        RealtimeEvent::Connected { sid } => tracing::info!(%sid, "connected to realtime server"),
        RealtimeEvent::Response(payload) => tracing::info!(%payload, "realtime response received"),
        RealtimeEvent::Event { name, args } => tracing::debug!(%name, args = args.len(), "realtime event received"),
        RealtimeEvent::ConnectError(reason) => tracing::error!(%reason, "realtime connection failed"),
        RealtimeEvent::Disconnected { reason } => tracing::warn!(%reason, "realtime connection lost"),
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
