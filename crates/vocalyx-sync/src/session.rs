//! Wiring of one dashboard page: REST client, live stream and the
//! controllers that share them.

use std::sync::Arc;

use tracing::{info, warn};

use crate::admin::AdminCoordinator;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, StreamHandlers};
use crate::error::Result;
use crate::filter::{FilterController, FilterState};
use crate::reveal::RevealCache;
use crate::transport::{DashboardApi, DashboardClient};
use crate::upload::UploadCoordinator;
use crate::view::{AdminView, NullView, Notifier, TranscriptionView};

/// Rendering and notification targets for one dashboard session.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub transcriptions: Arc<dyn TranscriptionView>,
    pub admin: Arc<dyn AdminView>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            notifier: Arc::new(NullView),
            transcriptions: Arc::new(NullView),
            admin: Arc::new(NullView),
        }
    }
}

/// Everything one dashboard page needs, built from a single [`ClientConfig`].
pub struct DashboardSession {
    config: ClientConfig,
    api: Arc<dyn DashboardApi>,
    connection: ConnectionManager,
    filter: FilterController,
    reveal: RevealCache,
    admin: AdminCoordinator,
    uploads: UploadCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl DashboardSession {
    pub fn new(config: ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let api: Arc<dyn DashboardApi> = Arc::new(DashboardClient::new(&config)?);
        Self::with_api(config, api, collaborators)
    }

    /// Build a session over any backend implementation.
    pub fn with_api(
        config: ClientConfig,
        api: Arc<dyn DashboardApi>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let Collaborators {
            notifier,
            transcriptions,
            admin,
        } = collaborators;

        let connection = ConnectionManager::from_client_config(&config)?;
        let filter = FilterController::with_settings(
            api.clone(),
            Arc::new(connection.clone()),
            transcriptions,
            notifier.clone(),
            FilterState::new(config.page_limit),
            config.search_debounce,
        );
        let reveal = RevealCache::new(api.clone(), config.admin_key.clone(), notifier.clone());
        let admin = AdminCoordinator::new(api.clone(), config.admin_key.clone(), admin, notifier.clone())
            .with_reveal_cache(reveal.clone());
        let uploads = UploadCoordinator::new(api.clone(), notifier.clone());

        Ok(Self {
            config,
            api,
            connection,
            filter,
            reveal,
            admin,
            uploads,
            notifier,
        })
    }

    /// Open the live stream and load the first page of transcriptions.
    ///
    /// The first page is requested whether or not the stream came up; without
    /// it the list is fetched over REST. The returned error is the outcome of
    /// the first connection attempt; reconnects continue in the background.
    pub async fn start(&self, handlers: StreamHandlers) -> Result<()> {
        let connected = self.connection.connect(handlers).await;
        match &connected {
            Ok(()) => info!(url = %self.connection.url(), "dashboard stream connected"),
            Err(error) => {
                warn!(%error, "dashboard stream unavailable, loading over REST");
                self.notifier.notify_error(error);
            }
        }
        self.filter.refresh().await;
        connected
    }

    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn DashboardApi> {
        &self.api
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn filter(&self) -> &FilterController {
        &self.filter
    }

    pub fn reveal(&self) -> &RevealCache {
        &self.reveal
    }

    pub fn admin(&self) -> &AdminCoordinator {
        &self.admin
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }
}
