//! # Domain Models
//!
//! Canonical types for the dashboard: the selected [`Entity`], the payload
//! records each data source returns, and watchlist entries.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, uppercase ticker |
//! | [`Entity`] | Selected stock (symbol, name, exchange, currency) |
//! | [`SearchHit`] | Typeahead search result |
//! | [`MetricsRecord`] | Value metrics (P/E, P/B, Graham ratio, AISC, ...) |
//! | [`Financials`] | Income statement and balance sheet reports |
//! | [`OverviewRecord`] | Company profile |
//! | [`NewsItem`] | News headline |
//! | [`WatchlistItem`] | Watchlist entry keyed by symbol |
//!
//! Numeric fields on wire records are lenient: the backend serves some values
//! as strings, and placeholders like `"None"` decode to `None`.

mod models;
mod symbol;

pub use models::{
    BalanceSheetReport, Entity, Financials, IncomeStatementReport, MetricsRecord, NewsItem,
    OverviewRecord, SearchHit, WatchlistItem,
};
pub use symbol::Symbol;
