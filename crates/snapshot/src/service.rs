//! Snapshot service: fetch, normalize, persist.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use snapshot_core::{
    CompanySnapshot, Error, FetchError, Result, SnapshotStore, SnapshotSummary, StatementProvider,
    StatementSet, Symbol, normalize,
};

/// Fetches statements for a ticker, normalizes them and keeps one snapshot
/// per ticker in a [`SnapshotStore`].
///
/// Providers are tried in registration order until one succeeds. Nothing is
/// written to the store unless a provider succeeds.
///
/// # Example
///
/// ```rust,ignore
/// use snapshot::{SnapshotService, SqliteStore, Symbol};
/// use std::sync::Arc;
///
/// let store = Arc::new(SqliteStore::from_env()?);
/// let service = SnapshotService::new(store).with_yahoo();
///
/// let snapshot = service.fetch_and_store(&Symbol::new("AAPL")).await?;
/// for year in &snapshot.financial_data.fiscal_years {
///     println!("{}: revenue {} growth {:?}", year.year, year.revenue, year.revenue_growth);
/// }
/// ```
pub struct SnapshotService {
    providers: Vec<Arc<dyn StatementProvider>>,
    store: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("store", &self.store)
            .finish()
    }
}

impl SnapshotService {
    /// Create a service over a store, with no providers registered.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            providers: Vec::new(),
            store,
        }
    }

    /// Create a service backed by the SQLite store named in the environment,
    /// fetching from Yahoo Finance.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    #[cfg(all(feature = "yahoo", feature = "store-sqlite"))]
    pub fn from_env() -> Result<Self> {
        Self::open(snapshot_store::sqlite::database_path())
    }

    /// Create a service backed by the SQLite database at `path`, fetching
    /// from Yahoo Finance.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    #[cfg(all(feature = "yahoo", feature = "store-sqlite"))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = snapshot_store::SqliteStore::new(path)?;
        Ok(Self::new(Arc::new(store)).with_yahoo())
    }

    /// Register a statement provider.
    pub fn register_provider(&mut self, provider: Arc<dyn StatementProvider>) {
        debug!(provider = provider.name(), "Registering statement provider");
        self.providers.push(provider);
    }

    /// Register a statement provider, builder style.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn StatementProvider>) -> Self {
        self.register_provider(provider);
        self
    }

    /// Add the Yahoo Finance provider.
    #[cfg(feature = "yahoo")]
    #[must_use]
    pub fn with_yahoo(self) -> Self {
        self.with_provider(Arc::new(snapshot_yahoo::YahooProvider::new()))
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Fetch statements for a ticker, normalize them and store the result,
    /// replacing any earlier snapshot of the same ticker.
    ///
    /// # Errors
    /// [`Error::Fetch`] if every provider fails (nothing is stored), or
    /// [`Error::Store`] if the write fails.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_and_store(&self, symbol: &Symbol) -> Result<CompanySnapshot> {
        if symbol.is_empty() {
            return Err(FetchError::InvalidParameter(
                "Ticker symbol must not be empty".to_string(),
            )
            .into());
        }

        let statements = self.fetch_statements(symbol).await?;
        let snapshot = normalize::assemble(symbol.clone(), statements, Utc::now());
        debug!(
            fiscal_years = snapshot.financial_data.fiscal_years.len(),
            fiscal_year_start_month = ?snapshot.fiscal_year_start_month,
            "Normalized statements"
        );

        let stored = self.store.upsert(snapshot).await?;
        debug!(id = stored.id, "Stored snapshot");
        Ok(stored)
    }

    /// Returns the stored snapshot for a ticker.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the ticker has never been fetched.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn get_latest(&self, symbol: &Symbol) -> Result<CompanySnapshot> {
        self.store
            .find_by_symbol(symbol)
            .await?
            .ok_or_else(|| Error::NotFound(symbol.to_string()))
    }

    /// Lists every stored snapshot, most recently fetched first.
    ///
    /// # Errors
    /// [`Error::Store`] if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<SnapshotSummary>> {
        let snapshots = self.store.list_all().await?;
        Ok(snapshots.iter().map(CompanySnapshot::summary).collect())
    }

    /// Deletes a snapshot by identifier. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// [`Error::Store`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.store.delete_by_id(id).await?)
    }

    /// Fetch statements, trying providers in order until one succeeds.
    async fn fetch_statements(&self, symbol: &Symbol) -> Result<StatementSet> {
        if self.providers.is_empty() {
            return Err(FetchError::ProviderNotConfigured(
                "No statement providers registered".to_string(),
            )
            .into());
        }

        let mut last_error = None;
        for provider in &self.providers {
            debug!(provider = provider.name(), "Fetching statements");

            match provider.fetch_statements(symbol).await {
                Ok(statements) => return Ok(statements),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| FetchError::Provider("All providers failed with no error".to_string()))
            .into())
    }
}
