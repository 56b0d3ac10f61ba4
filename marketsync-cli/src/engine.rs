//! Wiring of the sync engine from CLI configuration.

use anyhow::{Context, Result};
use marketsync_core::{
    build_clients, AdapterSettings, CatalogCredentials, CredentialChain, DefaultTokenManager,
    EndpointRegistry, EnvCredentials, Exporter, Importer, Marketplace, MemoryCatalog, SyncService,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CliConfig;

/// Catalog, token manager and adapter settings shared by every command.
pub struct Engine {
    pub catalog: Arc<MemoryCatalog>,
    pub tokens: Arc<DefaultTokenManager>,
    endpoints: EndpointRegistry,
    settings: AdapterSettings,
    max_pages: usize,
}

impl Engine {
    pub fn from_config(config: &CliConfig) -> Result<Self> {
        let catalog = Arc::new(
            MemoryCatalog::load_from_path(&config.catalog_path)
                .with_context(|| format!("Failed to open catalog at {:?}", config.catalog_path))?,
        );
        info!("Using catalog {:?}", config.catalog_path);

        // Stored credentials win over the environment
        let credentials = CredentialChain::new()
            .with_provider(Arc::new(CatalogCredentials::new(catalog.clone())))
            .with_provider(Arc::new(EnvCredentials::from_env()));

        let endpoints = config.endpoint_registry();
        let tokens = Arc::new(DefaultTokenManager::new(credentials, endpoints.clone()));

        Ok(Self {
            catalog,
            tokens,
            endpoints,
            settings: config.adapter_settings(),
            max_pages: config.max_pages,
        })
    }

    pub fn importer(&self, marketplace: Marketplace) -> Result<Importer> {
        let clients = build_clients(marketplace, &self.endpoints, &self.settings)?;
        Ok(Importer::new(self.catalog.clone(), self.tokens.clone(), clients.source)
            .with_max_pages(self.max_pages))
    }

    pub fn exporter(&self, marketplace: Marketplace) -> Result<Exporter> {
        let clients = build_clients(marketplace, &self.endpoints, &self.settings)?;
        Ok(Exporter::new(self.catalog.clone(), self.tokens.clone(), clients.listings))
    }

    /// Importers for every marketplace with a configured endpoint.
    pub fn configured_importers(&self) -> Vec<Importer> {
        Marketplace::ALL
            .into_iter()
            .filter_map(|marketplace| match self.importer(marketplace) {
                Ok(importer) => Some(importer),
                Err(e) => {
                    debug!("Skipping {}: {}", marketplace, e);
                    None
                }
            })
            .collect()
    }

    /// Sync service with an exporter for every configured marketplace.
    pub fn sync_service(&self) -> SyncService {
        Marketplace::ALL
            .into_iter()
            .fold(SyncService::new(self.catalog.clone()), |service, marketplace| {
                match self.exporter(marketplace) {
                    Ok(exporter) => service.with_exporter(exporter),
                    Err(e) => {
                        debug!("No exporter for {}: {}", marketplace, e);
                        service
                    }
                }
            })
    }
}
