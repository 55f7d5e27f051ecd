//! Raw financial statement tables.
//!
//! A [`StatementTable`] is a polars [`DataFrame`] laid out the way providers
//! publish statements: one row per line item (identified by the `label`
//! column) and one column per fiscal period, named by the period end date.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{FetchError, FetchResult};

/// Name of the column holding row labels.
pub const LABEL_COLUMN: &str = "label";

/// Date format used for period column names.
pub const PERIOD_FORMAT: &str = "%Y-%m-%d";

/// Formats a period end date as its column name.
#[must_use]
pub fn period_key(period: NaiveDate) -> String {
    period.format(PERIOD_FORMAT).to_string()
}

/// A financial statement indexed by (row label, period end date).
///
/// Periods are kept most-recent-first. Cells may be null, NaN or of a
/// non-numeric type; [`StatementTable::extract`] reads all of them as `0.0`.
#[derive(Clone, Debug)]
pub struct StatementTable {
    frame: DataFrame,
    periods: Vec<NaiveDate>,
}

impl StatementTable {
    /// Creates a table with no rows and no periods.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
            periods: Vec::new(),
        }
    }

    /// Builds a table from labelled rows.
    ///
    /// `rows` yields `(label, values)` where `values[j]` belongs to
    /// `periods[j]`; short rows are padded with nulls. Periods are reordered
    /// most-recent-first and duplicate periods keep their first occurrence.
    ///
    /// # Errors
    /// Returns [`FetchError::Parse`] if the frame cannot be assembled.
    pub fn from_rows<I, L>(periods: Vec<NaiveDate>, rows: I) -> FetchResult<Self>
    where
        I: IntoIterator<Item = (L, Vec<Option<f64>>)>,
        L: Into<String>,
    {
        let (labels, values): (Vec<String>, Vec<Vec<Option<f64>>>) = rows
            .into_iter()
            .map(|(label, values)| (label.into(), values))
            .unzip();

        let mut order: Vec<usize> = (0..periods.len()).collect();
        order.sort_by(|&a, &b| periods[b].cmp(&periods[a]));
        order.dedup_by_key(|i| periods[*i]);

        let mut columns = Vec::with_capacity(order.len() + 1);
        columns.push(Column::new(LABEL_COLUMN.into(), labels));
        for &j in &order {
            let cells: Vec<Option<f64>> = values
                .iter()
                .map(|row| row.get(j).copied().flatten())
                .collect();
            columns.push(Column::new(period_key(periods[j]).into(), cells));
        }

        let frame = DataFrame::new(columns).map_err(|e| FetchError::Parse(e.to_string()))?;
        let periods = order.into_iter().map(|j| periods[j]).collect();
        Ok(Self { frame, periods })
    }

    /// Wraps an existing frame.
    ///
    /// The frame must contain a string [`LABEL_COLUMN`]; every other column
    /// whose name parses as a `YYYY-MM-DD` date is treated as a period.
    /// Columns of any dtype are accepted.
    ///
    /// # Errors
    /// Returns [`FetchError::Parse`] if the label column is missing or is not
    /// a string column.
    pub fn from_frame(frame: DataFrame) -> FetchResult<Self> {
        frame
            .column(LABEL_COLUMN)
            .and_then(|c| c.str().map(|_| ()))
            .map_err(|e| FetchError::Parse(format!("invalid statement label column: {e}")))?;

        let mut periods: Vec<NaiveDate> = frame
            .get_column_names()
            .into_iter()
            .filter_map(|name| NaiveDate::parse_from_str(name.as_str(), PERIOD_FORMAT).ok())
            .collect();
        periods.sort_by(|a, b| b.cmp(a));
        periods.dedup();

        Ok(Self { frame, periods })
    }

    /// Returns the period end dates, most recent first.
    #[must_use]
    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    /// Returns true if the table has no periods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Returns the underlying frame.
    #[must_use]
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Returns true if a row with this label exists, whatever its values.
    #[must_use]
    pub fn has_row(&self, label: &str) -> bool {
        self.row_index(label).is_some()
    }

    /// Reads the cell at (`label`, `period`) as a float.
    ///
    /// Returns `0.0` when the row or the period is absent, when the cell is
    /// null or NaN, when the column is not numeric, or when the lookup fails
    /// for any other reason. Absent and zero are indistinguishable here; use
    /// [`StatementTable::has_row`] where that matters.
    #[must_use]
    pub fn extract(&self, label: &str, period: NaiveDate) -> f64 {
        match self.lookup(label, period) {
            Ok(Some(value)) if !value.is_nan() => value,
            _ => 0.0,
        }
    }

    fn lookup(&self, label: &str, period: NaiveDate) -> PolarsResult<Option<f64>> {
        let Some(row) = self.row_index(label) else {
            return Ok(None);
        };
        let column = self.frame.column(&period_key(period))?;
        // text cells are never parsed, even when they look numeric
        let dtype = column.dtype();
        if !(dtype.is_float() || dtype.is_integer()) {
            return Ok(None);
        }
        let values = column.cast(&DataType::Float64)?;
        Ok(values.f64()?.get(row))
    }

    fn row_index(&self, label: &str) -> Option<usize> {
        let labels = self.frame.column(LABEL_COLUMN).ok()?.str().ok()?;
        labels.into_iter().position(|l| l == Some(label))
    }
}

impl Default for StatementTable {
    fn default() -> Self {
        Self::empty()
    }
}
