//! Core data types for company financial snapshots.
//!
//! - [`Symbol`] - Ticker symbol
//! - [`CompanyInfo`] - Scalar company facts reported by a provider
//! - [`StatementSet`] - Everything one provider fetch returns
//! - [`FiscalYearRecord`] - One normalized fiscal year
//! - [`NewSnapshot`] - A normalized snapshot that has not been persisted yet
//! - [`CompanySnapshot`] - A persisted snapshot
//! - [`SnapshotSummary`] - Listing view of a persisted snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::table::StatementTable;

/// A ticker symbol.
///
/// Symbols are trimmed and uppercased on creation, so `aapl` and `AAPL`
/// address the same snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Scalar company facts. Every field is optional because providers omit them
/// freely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    /// Company long name.
    pub name: Option<String>,
    /// Business sector.
    pub sector: Option<String>,
    /// Market capitalization.
    pub market_cap: Option<i64>,
    /// Return on equity, as a fraction.
    pub roe: Option<f64>,
    /// Price-to-book ratio.
    pub pbr: Option<f64>,
}

impl CompanyInfo {
    /// Creates company info with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the company name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the sector.
    #[must_use]
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Sets the market capitalization.
    #[must_use]
    pub const fn with_market_cap(mut self, market_cap: i64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// Sets the return on equity.
    #[must_use]
    pub const fn with_roe(mut self, roe: f64) -> Self {
        self.roe = Some(roe);
        self
    }

    /// Sets the price-to-book ratio.
    #[must_use]
    pub const fn with_pbr(mut self, pbr: f64) -> Self {
        self.pbr = Some(pbr);
        self
    }
}

/// The result of one provider fetch: company facts plus three statements.
#[derive(Clone, Debug, Default)]
pub struct StatementSet {
    /// Scalar company facts.
    pub info: CompanyInfo,
    /// Income statement.
    pub income: StatementTable,
    /// Balance sheet.
    pub balance_sheet: StatementTable,
    /// Cash-flow statement.
    pub cash_flow: StatementTable,
}

/// One normalized fiscal year.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiscalYearRecord {
    /// Period end date, `YYYY-MM-DD`.
    pub year: String,
    /// Total revenue.
    pub revenue: f64,
    /// Revenue growth against the prior period, in percent. `None` when the
    /// prior period is missing or its revenue is zero.
    pub revenue_growth: Option<f64>,
    /// Earnings before interest and tax.
    pub ebit: f64,
    /// Earnings before interest, tax, depreciation and amortization.
    pub ebitda: f64,
    /// Free cash flow (operating plus investing cash flow).
    pub fcf: f64,
    /// Total assets.
    pub total_assets: f64,
    /// Cash and cash equivalents.
    pub cash: f64,
    /// Total debt.
    pub debt: f64,
}

/// Normalized fiscal-year data, most recent year first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialData {
    /// Up to three fiscal years.
    pub fiscal_years: Vec<FiscalYearRecord>,
}

/// A normalized snapshot ready to be written to a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    /// Ticker symbol; the logical key.
    pub symbol: Symbol,
    /// Scalar company facts.
    pub info: CompanyInfo,
    /// Month (1-12) in which the fiscal year starts.
    pub fiscal_year_start_month: Option<u32>,
    /// Normalized fiscal years.
    pub financial_data: FinancialData,
    /// When the data was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// A persisted snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    /// Store-assigned identifier, stable across overwrites.
    pub id: i64,
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Scalar company facts.
    pub info: CompanyInfo,
    /// Month (1-12) in which the fiscal year starts.
    pub fiscal_year_start_month: Option<u32>,
    /// Normalized fiscal years.
    pub financial_data: FinancialData,
    /// When the data was last fetched.
    pub fetched_at: DateTime<Utc>,
    /// When the snapshot was first stored.
    pub created_at: DateTime<Utc>,
}

impl CompanySnapshot {
    /// Builds a persisted snapshot from normalized data.
    #[must_use]
    pub fn from_new(id: i64, snapshot: NewSnapshot, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: snapshot.symbol,
            info: snapshot.info,
            fiscal_year_start_month: snapshot.fiscal_year_start_month,
            financial_data: snapshot.financial_data,
            fetched_at: snapshot.fetched_at,
            created_at,
        }
    }

    /// Returns the listing view of this snapshot.
    #[must_use]
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id,
            symbol: self.symbol.clone(),
            name: self.info.name.clone(),
            sector: self.info.sector.clone(),
            market_cap: self.info.market_cap,
            fetched_at: self.fetched_at,
        }
    }
}

/// Listing view of a persisted snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Store-assigned identifier.
    pub id: i64,
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Company long name.
    pub name: Option<String>,
    /// Business sector.
    pub sector: Option<String>,
    /// Market capitalization.
    pub market_cap: Option<i64>,
    /// When the data was last fetched.
    pub fetched_at: DateTime<Utc>,
}
