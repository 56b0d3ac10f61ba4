//! Marketplace imports.
//!
//! This module provides:
//! - [`ImportSource`] - Trait each marketplace adapter implements to page
//!   through its listings
//! - [`ImportedProduct`] - A listing mapped into the canonical shape
//! - [`ImportControl`] - Cooperative stop signal and running flag
//! - [`Importer`] - Runs one source: paging, identity resolution, upsert,
//!   audit logging
//! - [`import_all`] - Runs several importers back to back
//!
//! Pages are fetched strictly one after another. Cancellation is checked
//! before every page and every item; work already saved is kept.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{self, CatalogError, CatalogStore};
use crate::marketplaces::MarketplaceError;
use crate::model::{LogStatus, Marketplace, NewSyncLog, SyncAction};
use crate::price::Price;
use crate::token::{AuthContext, TokenManager};

mod upsert;

pub use upsert::{upsert_imported, UpsertOutcome};

/// Page ceiling applied when none is configured.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Error type for a single import run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// An operator asked the import to stop.
    #[error("import stopped by user")]
    Cancelled,

    /// Another run is still in progress on the same control.
    #[error("an import is already running")]
    AlreadyRunning,

    /// The marketplace failed to deliver a page.
    #[error("source error: {0}")]
    Source(#[from] MarketplaceError),

    /// The catalog store failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// A marketplace listing in canonical shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportedProduct {
    /// The marketplace's own identifier for the listing.
    pub external_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub price: Price,
    pub quantity: u32,
    pub weight: Option<f64>,
    pub images: Vec<String>,
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Absolute URL of the next page (link-following APIs).
    Url(String),

    /// Item offset of the next page (offset/limit APIs).
    Offset(usize),
}

/// One page of listings.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ImportedProduct>,
    /// `None` when this was the last page.
    pub next: Option<PageCursor>,
}

/// A marketplace that can list its products page by page.
#[async_trait]
pub trait ImportSource: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// Fetch one page. `cursor` is `None` for the first page.
    async fn fetch_page(
        &self,
        auth: &AuthContext,
        cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError>;

    /// Pause between consecutive pages.
    fn page_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub success: bool,
    /// Items saved during this run.
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportOutcome {
    fn succeeded(count: usize) -> Self {
        Self {
            success: true,
            count,
            error: None,
        }
    }

    fn failed(count: usize, error: &ImportError) -> Self {
        Self {
            success: false,
            count,
            error: Some(error.to_string()),
        }
    }
}

/// Stop signal and running flag shared between an operator and imports.
///
/// Cloning shares state. A stop applies to the run in progress; the next
/// run starts with a fresh signal.
#[derive(Debug, Clone, Default)]
pub struct ImportControl {
    cancel: Arc<Mutex<CancellationToken>>,
    running: Arc<AtomicBool>,
    last_outcome: Arc<Mutex<Option<ImportOutcome>>>,
}

impl ImportControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the current run to stop at its next safe point.
    pub fn stop(&self) {
        info!("Import stop requested");
        self.cancel.lock().cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Outcome of the most recent finished run.
    pub fn last_outcome(&self) -> Option<ImportOutcome> {
        self.last_outcome.lock().clone()
    }

    fn begin(&self) -> Option<RunGuard> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let token = {
            let mut cancel = self.cancel.lock();
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
            cancel.clone()
        };
        Some(RunGuard {
            token,
            control: self.clone(),
        })
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard {
    token: CancellationToken,
    control: ImportControl,
}

impl RunGuard {
    fn checkpoint(&self) -> Result<(), ImportError> {
        if self.token.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn finish(&self, outcome: &ImportOutcome) {
        *self.control.last_outcome.lock() = Some(outcome.clone());
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.control.running.store(false, Ordering::SeqCst);
    }
}

/// Runs one [`ImportSource`] against the catalog.
pub struct Importer {
    catalog: Arc<dyn CatalogStore>,
    tokens: Arc<dyn TokenManager>,
    source: Arc<dyn ImportSource>,
    max_pages: usize,
}

impl Importer {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        tokens: Arc<dyn TokenManager>,
        source: Arc<dyn ImportSource>,
    ) -> Self {
        Self {
            catalog,
            tokens,
            source,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Set the page ceiling.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn marketplace(&self) -> Marketplace {
        self.source.marketplace()
    }

    /// Import every listing of the source.
    ///
    /// Never returns an error: failures and cancellation are reported in the
    /// outcome and in the audit log.
    pub async fn run_import(&self, control: &ImportControl) -> ImportOutcome {
        let marketplace = self.marketplace();

        let Some(guard) = control.begin() else {
            warn!("Import for {} rejected: another import is running", marketplace);
            return ImportOutcome::failed(0, &ImportError::AlreadyRunning);
        };

        info!("Starting import for {}", marketplace);
        catalog::record(
            self.catalog.as_ref(),
            NewSyncLog::new(marketplace, SyncAction::Import, LogStatus::Pending),
        )
        .await;

        let mut count = 0;
        let result = self.import_pages(&guard, &mut count).await;

        let outcome = match result {
            Ok(()) => ImportOutcome::succeeded(count),
            // Pages after a failure are lost, but saved items make it a success
            Err(ImportError::Source(e)) if count > 0 => {
                warn!(
                    "Import for {} stopped early after {} items: {}",
                    marketplace, count, e
                );
                ImportOutcome::succeeded(count)
            }
            Err(e) => {
                error!("Import failed for {}: {}", marketplace, e);
                ImportOutcome::failed(count, &e)
            }
        };

        let entry = match &outcome.error {
            None => NewSyncLog::new(marketplace, SyncAction::Import, LogStatus::Synced),
            Some(message) => NewSyncLog::failed(marketplace, SyncAction::Import, message.clone()),
        };
        catalog::record(self.catalog.as_ref(), entry).await;

        info!(
            "Import for {} finished: success={} count={}",
            marketplace, outcome.success, outcome.count
        );
        guard.finish(&outcome);
        outcome
    }

    async fn import_pages(&self, guard: &RunGuard, count: &mut usize) -> Result<(), ImportError> {
        let marketplace = self.marketplace();

        guard.checkpoint()?;
        let auth = self.tokens.auth_context(marketplace).await;

        let mut cursor: Option<PageCursor> = None;
        for page_number in 1..=self.max_pages {
            guard.checkpoint()?;

            if page_number > 1 {
                let delay = self.source.page_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            debug!("Fetching {} page {}", marketplace, page_number);
            let page = self.source.fetch_page(&auth, cursor.as_ref()).await?;
            if page.items.is_empty() {
                debug!("{} page {} is empty, stopping", marketplace, page_number);
                return Ok(());
            }

            for item in &page.items {
                guard.checkpoint()?;
                match upsert_imported(self.catalog.as_ref(), marketplace, item).await {
                    Ok(_) => *count += 1,
                    Err(e) => warn!(
                        "Skipping {} item {}: {}",
                        marketplace, item.external_id, e
                    ),
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }

        info!("{} import reached the {} page ceiling", marketplace, self.max_pages);
        Ok(())
    }
}

/// Run importers one after another, keyed by marketplace.
///
/// A stop requested on `control` ends the current importer and skips the
/// rest, which are reported as cancelled.
pub async fn import_all(
    importers: &[Importer],
    control: &ImportControl,
) -> BTreeMap<Marketplace, ImportOutcome> {
    let mut outcomes = BTreeMap::new();
    for importer in importers {
        let marketplace = importer.marketplace();
        if control.is_stop_requested() && !outcomes.is_empty() {
            outcomes.insert(marketplace, ImportOutcome::failed(0, &ImportError::Cancelled));
            continue;
        }
        let outcome = importer.run_import(control).await;
        outcomes.insert(marketplace, outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::credential::Secret;
    use crate::model::LogQuery;
    use std::sync::atomic::AtomicUsize;

    struct NoTokens;

    #[async_trait]
    impl TokenManager for NoTokens {
        async fn get_access_token(&self, _marketplace: Marketplace) -> Option<Secret> {
            None
        }
    }

    /// Serves `pages` in order, failing on the page indexes in `fail_on`.
    struct ScriptedSource {
        pages: Vec<Vec<ImportedProduct>>,
        fail_on: Vec<usize>,
        fetched: AtomicUsize,
        stop_on: Option<(usize, ImportControl)>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<ImportedProduct>>) -> Self {
            Self {
                pages,
                fail_on: vec![],
                fetched: AtomicUsize::new(0),
                stop_on: None,
            }
        }
    }

    #[async_trait]
    impl ImportSource for ScriptedSource {
        fn marketplace(&self) -> Marketplace {
            Marketplace::Otto
        }

        async fn fetch_page(
            &self,
            _auth: &AuthContext,
            cursor: Option<&PageCursor>,
        ) -> Result<Page, MarketplaceError> {
            let index = match cursor {
                None => 0,
                Some(PageCursor::Offset(n)) => *n,
                Some(PageCursor::Url(_)) => unreachable!(),
            };
            self.fetched.fetch_add(1, Ordering::SeqCst);
            if let Some((page, control)) = &self.stop_on {
                if *page == index {
                    control.stop();
                }
            }
            if self.fail_on.contains(&index) {
                return Err(MarketplaceError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let items = self.pages.get(index).cloned().unwrap_or_default();
            let next = (index + 1 < self.pages.len()).then_some(PageCursor::Offset(index + 1));
            Ok(Page { items, next })
        }
    }

    fn item(id: &str) -> ImportedProduct {
        ImportedProduct {
            external_id: id.to_string(),
            title: Some(format!("Item {}", id)),
            sku: Some(format!("SKU-{}", id)),
            price: Price::from_cents(999),
            quantity: 1,
            ..ImportedProduct::default()
        }
    }

    fn importer(catalog: Arc<MemoryCatalog>, source: ScriptedSource) -> Importer {
        Importer::new(catalog, Arc::new(NoTokens), Arc::new(source))
    }

    #[tokio::test]
    async fn test_imports_all_pages_and_logs() {
        let catalog = Arc::new(MemoryCatalog::new());
        let source = ScriptedSource::new(vec![vec![item("1"), item("2")], vec![item("3")]]);
        let control = ImportControl::new();

        let outcome = importer(catalog.clone(), source).run_import(&control).await;

        assert_eq!(outcome, ImportOutcome::succeeded(3));
        assert_eq!(catalog.count_products().await.unwrap(), 3);
        assert!(!control.is_running());
        assert_eq!(control.last_outcome(), Some(outcome));

        let logs = catalog.query_logs(&LogQuery::default()).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, LogStatus::Synced);
        assert_eq!(logs[1].status, LogStatus::Pending);
    }

    #[tokio::test]
    async fn test_page_failure_after_progress_is_success() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut source = ScriptedSource::new(vec![vec![item("1")], vec![item("2")]]);
        source.fail_on = vec![1];

        let outcome = importer(catalog, source).run_import(&ImportControl::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.count, 1);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_failure() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut source = ScriptedSource::new(vec![vec![item("1")]]);
        source.fail_on = vec![0];

        let outcome = importer(catalog.clone(), source).run_import(&ImportControl::new()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.count, 0);

        let logs = catalog.query_logs(&LogQuery::default()).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert!(logs[0].error_message.as_deref().unwrap_or("").contains("500"));
    }

    #[tokio::test]
    async fn test_stop_keeps_partial_progress() {
        let catalog = Arc::new(MemoryCatalog::new());
        let control = ImportControl::new();
        let mut source = ScriptedSource::new(vec![vec![item("1")], vec![item("2")]]);
        source.stop_on = Some((1, control.clone()));

        let outcome = importer(catalog.clone(), source).run_import(&control).await;

        assert!(!outcome.success);
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.error.as_deref(), Some("import stopped by user"));
        assert_eq!(catalog.count_products().await.unwrap(), 1);
        assert!(!control.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_reset_for_next_run() {
        let catalog = Arc::new(MemoryCatalog::new());
        let control = ImportControl::new();
        control.stop();

        let source = ScriptedSource::new(vec![vec![item("1")]]);
        let outcome = importer(catalog, source).run_import(&control).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let catalog = Arc::new(MemoryCatalog::new());
        let pages: Vec<_> = (0..5).map(|i| vec![item(&i.to_string())]).collect();
        let source = Arc::new(ScriptedSource::new(pages));

        let importer = Importer::new(catalog, Arc::new(NoTokens), source.clone()).with_max_pages(2);
        let outcome = importer.run_import(&ImportControl::new()).await;

        assert_eq!(outcome.count, 2);
        assert_eq!(source.fetched.load(Ordering::SeqCst), 2);
    }
}
