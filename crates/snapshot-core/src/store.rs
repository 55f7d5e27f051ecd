//! Storage trait for persisted snapshots.
//!
//! This module defines the [`SnapshotStore`] trait that backends implement to
//! hold one snapshot per ticker symbol.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::StoreResult,
    types::{CompanySnapshot, NewSnapshot, Symbol},
};

/// Trait for persisting company snapshots.
///
/// A store holds at most one snapshot per symbol. Implementations must make
/// [`SnapshotStore::upsert`] atomic: the existence check and the write happen
/// as one unit, so concurrent upserts for the same symbol resolve to
/// last-write-wins and never produce two rows.
///
/// Stores are keyed by the normalized [`Symbol`] (trimmed, uppercase), so
/// `find_by_symbol` with `aapl` finds the row written for `AAPL`.
#[async_trait]
pub trait SnapshotStore: Send + Sync + Debug {
    /// Returns the snapshot stored for a symbol, if any.
    async fn find_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<CompanySnapshot>>;

    /// Returns the snapshot with the given identifier, if any.
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<CompanySnapshot>>;

    /// Inserts a snapshot, or replaces every data field of the existing
    /// snapshot for the same symbol.
    ///
    /// On replace, the identifier and creation time are kept. Historical
    /// fiscal years are not merged: the new data fully replaces the old.
    async fn upsert(&self, snapshot: NewSnapshot) -> StoreResult<CompanySnapshot>;

    /// Returns every stored snapshot, most recently fetched first.
    async fn list_all(&self) -> StoreResult<Vec<CompanySnapshot>>;

    /// Deletes the snapshot with the given identifier.
    ///
    /// Returns `false` if no such snapshot existed.
    async fn delete_by_id(&self, id: i64) -> StoreResult<bool>;
}
