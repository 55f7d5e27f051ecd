//! Provider traits for fetching company statements.
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`StatementProvider`] - Financial statements and company facts

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::FetchResult,
    types::{StatementSet, Symbol},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Yahoo Finance").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Provider for annual financial statements.
///
/// One call returns everything the normalization engine needs for a symbol.
#[async_trait]
pub trait StatementProvider: DataProvider {
    /// Fetches company facts plus the income statement, balance sheet and
    /// cash-flow statement for a symbol.
    ///
    /// Statement periods must be annual and ordered most-recent-first.
    /// Missing line items are simply absent rows; they are not errors.
    async fn fetch_statements(&self, symbol: &Symbol) -> FetchResult<StatementSet>;
}
