#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/snapshot/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for company financial snapshots.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`StatementTable`](table::StatementTable) - Raw statement indexed by label and period
//! - [`StatementProvider`](provider::StatementProvider) - Fetches statements for a symbol
//! - [`SnapshotStore`](store::SnapshotStore) - Persists one snapshot per symbol
//! - [`normalize`] - Turns statements into fiscal-year records

/// Error types for fetch, store and service operations.
pub mod error;
/// Statement normalization engine.
pub mod normalize;
/// Provider traits for fetching statements.
pub mod provider;
/// Snapshot storage trait.
pub mod store;
/// Raw statement tables.
pub mod table;
/// Core data types (Symbol, CompanySnapshot, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{Error, FetchError, FetchResult, Result, StoreError, StoreResult};
pub use normalize::MAX_FISCAL_YEARS;
pub use provider::{DataProvider, StatementProvider};
pub use store::SnapshotStore;
pub use table::StatementTable;
pub use types::{
    CompanyInfo, CompanySnapshot, FinancialData, FiscalYearRecord, NewSnapshot, SnapshotSummary,
    StatementSet, Symbol,
};
