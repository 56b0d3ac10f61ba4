//! Credentials held in the catalog store.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Credential, CredentialError, CredentialProvider, CredentialSource};
use crate::catalog::CatalogStore;
use crate::model::Marketplace;

/// Writable provider over the catalog's credential records.
#[derive(Clone)]
pub struct CatalogCredentials {
    catalog: Arc<dyn CatalogStore>,
}

impl CatalogCredentials {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CredentialProvider for CatalogCredentials {
    fn source(&self) -> CredentialSource {
        CredentialSource::Store
    }

    async fn lookup(&self, marketplace: Marketplace) -> Result<Option<Credential>, CredentialError> {
        let stored = self.catalog.get_credential(marketplace).await?;
        Ok(stored
            .map(|s| s.credentials)
            .filter(|c| c.is_usable_for(marketplace)))
    }

    async fn save(
        &self,
        marketplace: Marketplace,
        credential: &Credential,
    ) -> Result<(), CredentialError> {
        self.catalog.save_credential(marketplace, credential).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    #[tokio::test]
    async fn test_lookup_and_save() {
        let catalog = Arc::new(MemoryCatalog::new());
        let provider = CatalogCredentials::new(catalog.clone());

        assert!(provider.lookup(Marketplace::Otto).await.unwrap().is_none());

        provider
            .save(Marketplace::Otto, &Credential::client_credentials("id", "secret"))
            .await
            .unwrap();

        let found = provider.lookup(Marketplace::Otto).await.unwrap().unwrap();
        assert_eq!(found.client_id.unwrap().expose(), "id");
        assert!(catalog.get_credential(Marketplace::Otto).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unusable_record_is_skipped() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog
            .save_credential(Marketplace::Kaufland, &Credential::default())
            .await
            .unwrap();

        let provider = CatalogCredentials::new(catalog);
        assert!(provider.lookup(Marketplace::Kaufland).await.unwrap().is_none());
    }
}
