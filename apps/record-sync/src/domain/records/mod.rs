//! Transaction Records and Query Windows
//!
//! The data carried by live queries. Records are owned by the record
//! store; this layer treats them as immutable snapshots and only ever
//! passes query windows through to the store.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Transaction Record
// =============================================================================

/// A single ledger entry as delivered by the record store.
///
/// Amounts use [`Decimal`] so cents survive every hop; floating point
/// never touches money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Store-assigned document id.
    pub id: String,
    /// Human-entered description ("Groceries", "Rent").
    pub description: String,
    /// Signed amount; negative for spending, positive for income.
    pub amount: Decimal,
    /// Optional budget category.
    pub category: Option<String>,
    /// Calendar date the transaction occurred on.
    pub occurred_on: NaiveDate,
    /// Server-side last-modified timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Creates a record with no category and `updated_at` of now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        amount: Decimal,
        occurred_on: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            amount,
            category: None,
            occurred_on,
            updated_at: Utc::now(),
        }
    }

    /// Sets the budget category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

// =============================================================================
// Record Query
// =============================================================================

/// Date-window parameters for a live query.
///
/// Both bounds are optional and inclusive. The sync layer never
/// interprets the window itself; it is handed to the store verbatim on
/// every subscribe and fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Earliest `occurred_on` date to include, if bounded.
    pub start_date: Option<NaiveDate>,
    /// Latest `occurred_on` date to include, if bounded.
    pub end_date: Option<NaiveDate>,
}

impl RecordQuery {
    /// A query with no date bounds (every record).
    #[must_use]
    pub const fn all() -> Self {
        Self {
            start_date: None,
            end_date: None,
        }
    }

    /// Records on or after `start`.
    #[must_use]
    pub const fn since(start: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: None,
        }
    }

    /// Records between `start` and `end`, inclusive on both ends.
    #[must_use]
    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
        }
    }

    /// Whether a record's `occurred_on` date falls inside this window.
    #[must_use]
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(start) = self.start_date
            && record.occurred_on < start
        {
            return false;
        }
        if let Some(end) = self.end_date
            && record.occurred_on > end
        {
            return false;
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
