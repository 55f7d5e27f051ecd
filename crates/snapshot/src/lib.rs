#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/snapshot/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Company financial snapshots.
//!
//! Re-exports the core types, the store backends and the statement
//! providers, and provides a [`SnapshotService`] that fetches statements,
//! normalizes them into fiscal-year records and keeps the latest snapshot
//! per ticker.
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance statement provider
//! - `store-sqlite` - SQLite-backed snapshot store

// Core types and traits
pub use snapshot_core::*;

// Stores
#[cfg(feature = "store-sqlite")]
pub use snapshot_store::SqliteStore;
pub use snapshot_store::InMemoryStore;

// Providers
#[cfg(feature = "yahoo")]
pub use snapshot_yahoo::YahooProvider;

mod service;
pub use service::SnapshotService;
