//! In-memory snapshot store.

use async_trait::async_trait;
use snapshot_core::{CompanySnapshot, NewSnapshot, SnapshotStore, StoreResult, Symbol};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    snapshots: HashMap<i64, CompanySnapshot>,
    by_symbol: HashMap<Symbol, i64>,
}

/// Simple in-memory store for testing and development.
///
/// Snapshots live in `RwLock`-protected maps and are lost when the store is
/// dropped. Upserts run under a single write guard, so the symbol lookup and
/// the write cannot interleave with another writer.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn find_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<CompanySnapshot>> {
        let tables = self.tables.read().await;
        let found = tables
            .by_symbol
            .get(symbol)
            .and_then(|id| tables.snapshots.get(id))
            .cloned();
        debug!(hit = found.is_some(), "Looked up snapshot by symbol");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<CompanySnapshot>> {
        Ok(self.tables.read().await.snapshots.get(&id).cloned())
    }

    #[instrument(skip(self, snapshot), fields(symbol = %snapshot.symbol))]
    async fn upsert(&self, snapshot: NewSnapshot) -> StoreResult<CompanySnapshot> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .by_symbol
            .get(&snapshot.symbol)
            .and_then(|id| tables.snapshots.get(id))
            .map(|s| (s.id, s.created_at));

        let stored = match existing {
            Some((id, created_at)) => {
                debug!(id, "Replacing existing snapshot");
                CompanySnapshot::from_new(id, snapshot, created_at)
            }
            None => {
                tables.next_id += 1;
                let id = tables.next_id;
                debug!(id, "Inserting new snapshot");
                let created_at = snapshot.fetched_at;
                CompanySnapshot::from_new(id, snapshot, created_at)
            }
        };

        tables.by_symbol.insert(stored.symbol.clone(), stored.id);
        tables.snapshots.insert(stored.id, stored.clone());
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> StoreResult<Vec<CompanySnapshot>> {
        let tables = self.tables.read().await;
        let mut all: Vec<CompanySnapshot> = tables.snapshots.values().cloned().collect();
        all.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then(b.id.cmp(&a.id)));
        debug!("Listed {} snapshots", all.len());
        Ok(all)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.snapshots.remove(&id) {
            Some(removed) => {
                tables.by_symbol.remove(&removed.symbol);
                debug!("Deleted snapshot");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use snapshot_core::{CompanyInfo, FinancialData, FiscalYearRecord};
    use std::sync::Arc;

    fn new_snapshot(symbol: &str, revenue: f64) -> NewSnapshot {
        NewSnapshot {
            symbol: Symbol::new(symbol),
            info: CompanyInfo::new().with_name(format!("{symbol} Corp")),
            fiscal_year_start_month: Some(1),
            financial_data: FinancialData {
                fiscal_years: vec![FiscalYearRecord {
                    year: "2023-12-31".to_string(),
                    revenue,
                    revenue_growth: None,
                    ebit: 0.0,
                    ebitda: 0.0,
                    fcf: 0.0,
                    total_assets: 0.0,
                    cash: 0.0,
                    debt: 0.0,
                }],
            },
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryStore::new();

        let stored = store.upsert(new_snapshot("AAPL", 100.0)).await.unwrap();
        assert_eq!(stored.id, 1);

        let by_symbol = store.find_by_symbol(&Symbol::new("aapl")).await.unwrap();
        assert_eq!(by_symbol, Some(stored.clone()));

        let by_id = store.find_by_id(stored.id).await.unwrap();
        assert_eq!(by_id, Some(stored));

        assert!(store.find_by_id(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let store = InMemoryStore::new();

        let first = store.upsert(new_snapshot("AAPL", 100.0)).await.unwrap();
        let mut update = new_snapshot("AAPL", 250.0);
        update.fetched_at = first.fetched_at + Duration::seconds(5);
        let second = store.upsert(update).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.financial_data.fiscal_years[0].revenue, 250.0);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_most_recent_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut older = new_snapshot("MSFT", 1.0);
        older.fetched_at = now - Duration::hours(1);
        let mut newer = new_snapshot("AAPL", 1.0);
        newer.fetched_at = now;

        store.upsert(older).await.unwrap();
        store.upsert(newer).await.unwrap();

        let all = store.list_all().await.unwrap();
        let symbols: Vec<&str> = all.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_one_row() {
        let store = Arc::new(InMemoryStore::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upsert(new_snapshot("AAPL", f64::from(i)))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(results.iter().all(|r| r.id == all[0].id));
        assert!(results.contains(&all[0]));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let stored = store.upsert(new_snapshot("AAPL", 100.0)).await.unwrap();

        assert!(store.delete_by_id(stored.id).await.unwrap());
        assert!(!store.delete_by_id(stored.id).await.unwrap());
        assert!(
            store
                .find_by_symbol(&Symbol::new("AAPL"))
                .await
                .unwrap()
                .is_none()
        );

        // a fresh insert after delete gets a new id
        let again = store.upsert(new_snapshot("AAPL", 100.0)).await.unwrap();
        assert_ne!(again.id, stored.id);
    }
}
