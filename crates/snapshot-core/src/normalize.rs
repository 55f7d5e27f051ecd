//! Normalization of raw statements into fiscal-year records.
//!
//! Providers return sparse tables with whatever line items they happen to
//! have. This module maps them onto the fixed [`FiscalYearRecord`] schema:
//!
//! - every cell read goes through [`StatementTable::extract`], so missing and
//!   malformed values become `0.0` instead of errors
//! - EBIT falls back to operating income and EBITDA falls back to EBIT plus
//!   depreciation when the reported value is exactly `0.0`
//! - only the [`MAX_FISCAL_YEARS`] most recent periods are kept
//!
//! A reported EBIT (or EBITDA) of exactly zero cannot be told apart from a
//! missing one and always triggers the fallback. This is a known imprecision;
//! changing it would change stored output.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::{
    table::{StatementTable, period_key},
    types::{FinancialData, FiscalYearRecord, NewSnapshot, StatementSet, Symbol},
};

/// Maximum number of fiscal years kept per snapshot.
pub const MAX_FISCAL_YEARS: usize = 3;

/// Row labels read from provider statements.
pub mod labels {
    /// Income statement: total revenue.
    pub const TOTAL_REVENUE: &str = "Total Revenue";
    /// Income statement: EBIT.
    pub const EBIT: &str = "EBIT";
    /// Income statement: operating income, the EBIT fallback.
    pub const OPERATING_INCOME: &str = "Operating Income";
    /// Income statement: EBITDA.
    pub const EBITDA: &str = "EBITDA";

    /// Cash-flow labels tried, in order, for depreciation.
    pub const DEPRECIATION: [&str; 2] = ["Depreciation", "Depreciation And Amortization"];
    /// Cash flow: operating cash flow.
    pub const OPERATING_CASH_FLOW: &str = "Operating Cash Flow";
    /// Cash flow: investing cash flow.
    pub const INVESTING_CASH_FLOW: &str = "Investing Cash Flow";

    /// Balance sheet: total assets.
    pub const TOTAL_ASSETS: &str = "Total Assets";
    /// Balance sheet: cash and cash equivalents.
    pub const CASH_AND_EQUIVALENTS: &str = "Cash And Cash Equivalents";
    /// Balance sheet: total debt.
    pub const TOTAL_DEBT: &str = "Total Debt";
}

/// Builds fiscal-year records from a fetched statement set.
///
/// Periods come from the income statement. Records are most recent first and
/// there are at most [`MAX_FISCAL_YEARS`] of them; balance-sheet and cash-flow
/// values are looked up by the same period end dates.
#[must_use]
pub fn fiscal_years(statements: &StatementSet) -> Vec<FiscalYearRecord> {
    let periods = statements.income.periods();

    periods
        .iter()
        .take(MAX_FISCAL_YEARS)
        .enumerate()
        .map(|(i, &period)| fiscal_year(statements, period, periods.get(i + 1).copied()))
        .collect()
}

fn fiscal_year(
    statements: &StatementSet,
    period: NaiveDate,
    prior: Option<NaiveDate>,
) -> FiscalYearRecord {
    let income = &statements.income;
    let balance_sheet = &statements.balance_sheet;
    let cash_flow = &statements.cash_flow;

    let revenue = income.extract(labels::TOTAL_REVENUE, period);
    let prior_revenue = prior.map(|p| income.extract(labels::TOTAL_REVENUE, p));
    let ebit = ebit(income, period);

    FiscalYearRecord {
        year: period_key(period),
        revenue,
        revenue_growth: revenue_growth(revenue, prior_revenue),
        ebit,
        ebitda: ebitda(income, cash_flow, period, ebit),
        fcf: cash_flow.extract(labels::OPERATING_CASH_FLOW, period)
            + cash_flow.extract(labels::INVESTING_CASH_FLOW, period),
        total_assets: balance_sheet.extract(labels::TOTAL_ASSETS, period),
        cash: balance_sheet.extract(labels::CASH_AND_EQUIVALENTS, period),
        debt: balance_sheet.extract(labels::TOTAL_DEBT, period),
    }
}

/// Year-over-year growth in percent.
///
/// `None` when there is no prior period or the prior revenue is zero; a
/// computed `Some(0.0)` means revenue was flat.
#[must_use]
pub fn revenue_growth(revenue: f64, prior_revenue: Option<f64>) -> Option<f64> {
    match prior_revenue {
        Some(prior) if prior != 0.0 => Some((revenue - prior) / prior * 100.0),
        _ => None,
    }
}

/// Reported EBIT, or operating income when EBIT reads as zero.
#[must_use]
pub fn ebit(income: &StatementTable, period: NaiveDate) -> f64 {
    let ebit = income.extract(labels::EBIT, period);
    if ebit == 0.0 {
        income.extract(labels::OPERATING_INCOME, period)
    } else {
        ebit
    }
}

/// Reported EBITDA, or `ebit + depreciation` when EBITDA reads as zero.
///
/// `ebit` is the value after its own fallback.
#[must_use]
pub fn ebitda(
    income: &StatementTable,
    cash_flow: &StatementTable,
    period: NaiveDate,
    ebit: f64,
) -> f64 {
    let ebitda = income.extract(labels::EBITDA, period);
    if ebitda == 0.0 {
        ebit + depreciation(cash_flow, period)
    } else {
        ebitda
    }
}

/// Depreciation from the first depreciation row present in the cash-flow
/// statement, or `0.0` if there is none.
///
/// Row presence decides which label is used: a present `Depreciation` row
/// with an empty cell still wins over `Depreciation And Amortization`.
#[must_use]
pub fn depreciation(cash_flow: &StatementTable, period: NaiveDate) -> f64 {
    labels::DEPRECIATION
        .iter()
        .find(|label| cash_flow.has_row(label))
        .map_or(0.0, |label| cash_flow.extract(label, period))
}

/// Month in which the fiscal year starts, derived from the most recent period.
///
/// A fiscal year ending in month `M` is taken to start in `M + 1`, wrapping
/// December to January. `None` if the table has no periods.
#[must_use]
pub fn fiscal_year_start_month(income: &StatementTable) -> Option<u32> {
    income
        .periods()
        .first()
        .map(|period| (period.month() % 12) + 1)
}

/// Normalizes a fetched statement set into a snapshot ready to persist.
#[must_use]
pub fn assemble(
    symbol: Symbol,
    statements: StatementSet,
    fetched_at: DateTime<Utc>,
) -> NewSnapshot {
    let fiscal_years = fiscal_years(&statements);
    let fiscal_year_start_month = fiscal_year_start_month(&statements.income);

    NewSnapshot {
        symbol,
        info: statements.info,
        fiscal_year_start_month,
        financial_data: FinancialData { fiscal_years },
        fetched_at,
    }
}
