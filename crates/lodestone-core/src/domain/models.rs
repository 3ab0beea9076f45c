use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Symbol, ValidationError};

/// Typeahead search result returned by the symbol index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub symbol: Symbol,
    pub name: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Traded entity selected in the dashboard.
///
/// The symbol is the identity key for every source fetch; the entity is never
/// mutated once selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    symbol: Symbol,
    name: String,
    exchange: String,
    currency: Option<String>,
}

impl Entity {
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        exchange: impl Into<String>,
        currency: Option<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        Ok(Self {
            symbol,
            name,
            exchange: exchange.into(),
            currency: currency
                .map(|code| code.trim().to_ascii_uppercase())
                .filter(|code| !code.is_empty()),
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }
}

impl TryFrom<SearchHit> for Entity {
    type Error = ValidationError;

    fn try_from(hit: SearchHit) -> Result<Self, Self::Error> {
        Self::new(hit.symbol, hit.name, hit.exchange, hit.currency)
    }
}

/// Value-investing metrics snapshot produced by the metrics processor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub symbol: Option<Symbol>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pe_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pb_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub debt_equity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub graham_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub aisc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub production_oz: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub resources_oz: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub shares_outstanding: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// One quarterly income statement report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementReport {
    #[serde(default, deserialize_with = "lenient_integer")]
    pub fiscal_quarter: Option<u8>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub fiscal_year: Option<u16>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_revenue: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub net_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub operating_expenses: Option<f64>,
}

/// One quarterly balance sheet report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetReport {
    #[serde(default, deserialize_with = "lenient_integer")]
    pub fiscal_quarter: Option<u8>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub fiscal_year: Option<u16>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_assets: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_liabilities: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_shareholder_equity: Option<f64>,
}

/// Financial statements, newest report first as served by the API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Financials {
    #[serde(default)]
    pub income_statement: Vec<IncomeStatementReport>,
    #[serde(default)]
    pub balance_sheet: Vec<BalanceSheetReport>,
}

impl Financials {
    /// Latest `count` income reports, oldest first, labelled `Q{quarter} {year}`.
    pub fn recent_income(&self, count: usize) -> Vec<(String, &IncomeStatementReport)> {
        let mut rows = self
            .income_statement
            .iter()
            .take(count)
            .map(|report| (period_label(report.fiscal_quarter, report.fiscal_year), report))
            .collect::<Vec<_>>();
        rows.reverse();
        rows
    }

    /// Latest `count` balance sheet reports, oldest first.
    pub fn recent_balance(&self, count: usize) -> Vec<(String, &BalanceSheetReport)> {
        let mut rows = self
            .balance_sheet
            .iter()
            .take(count)
            .map(|report| (period_label(report.fiscal_quarter, report.fiscal_year), report))
            .collect::<Vec<_>>();
        rows.reverse();
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.income_statement.is_empty() && self.balance_sheet.is_empty()
    }
}

fn period_label(quarter: Option<u8>, year: Option<u16>) -> String {
    let quarter = quarter.map_or_else(|| String::from("?"), |q| q.to_string());
    let year = year.map_or_else(|| String::from("?"), |y| y.to_string());
    format!("Q{quarter} {year}")
}

/// Company profile shown in the overview panel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverviewRecord {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pe_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub dividend_yield: Option<f64>,
    #[serde(default, rename = "52_week_high", deserialize_with = "lenient_number")]
    pub week_52_high: Option<f64>,
    #[serde(default, rename = "52_week_low", deserialize_with = "lenient_number")]
    pub week_52_low: Option<f64>,
}

/// Headline in the company news feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub date: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Watchlist entry; the symbol is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub symbol: Symbol,
    pub name: String,
}

impl WatchlistItem {
    pub fn new(symbol: Symbol, name: impl Into<String>) -> Self {
        Self {
            symbol,
            name: name.into(),
        }
    }
}

/// Accepts JSON numbers, numeric strings, `null`, and placeholder strings
/// such as `"None"` or `"N/A"` (mapped to `None`).
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_f64().filter(|value| value.is_finite())),
        Some(Value::String(text)) => {
            let trimmed = text.trim().trim_end_matches('%');
            if trimmed.is_empty() || trimmed == "-" {
                return Ok(None);
            }
            Ok(trimmed.parse::<f64>().ok().filter(|value| value.is_finite()))
        }
        Some(other) => Err(D::Error::custom(format!(
            "expected number or numeric string, got {other}"
        ))),
    }
}

fn lenient_integer<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_u64().and_then(|n| T::try_from(n).ok())),
        Some(Value::String(text)) => Ok(text
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| T::try_from(n).ok())),
        Some(other) => Err(D::Error::custom(format!(
            "expected integer or numeric string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_from_search_hit_normalizes_currency() {
        let hit = SearchHit {
            symbol: Symbol::parse("abr").expect("valid"),
            name: String::from("Arbor Metals"),
            exchange: String::from("TSXV"),
            currency: Some(String::from(" cad ")),
        };

        let entity = Entity::try_from(hit).expect("valid entity");
        assert_eq!(entity.symbol().as_str(), "ABR");
        assert_eq!(entity.currency(), Some("CAD"));
    }

    #[test]
    fn entity_rejects_blank_name() {
        let symbol = Symbol::parse("ABR").expect("valid");
        let err = Entity::new(symbol, "  ", "TSXV", None).expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn metrics_accept_numeric_strings_and_placeholders() {
        let record: MetricsRecord = serde_json::from_str(
            r#"{"symbol":"NG","price":"12.5","pe_ratio":14.2,"pb_ratio":"None","market_cap":null}"#,
        )
        .expect("metrics should parse");

        assert_eq!(record.price, Some(12.5));
        assert_eq!(record.pe_ratio, Some(14.2));
        assert_eq!(record.pb_ratio, None);
        assert_eq!(record.market_cap, None);
        assert_eq!(record.aisc, None);
    }

    #[test]
    fn overview_reads_week_range_keys() {
        let record: OverviewRecord = serde_json::from_str(
            r#"{"sector":"Materials","52_week_high":"3.10","52_week_low":1.2,"dividend_yield":"0.5%"}"#,
        )
        .expect("overview should parse");

        assert_eq!(record.sector.as_deref(), Some("Materials"));
        assert_eq!(record.week_52_high, Some(3.1));
        assert_eq!(record.week_52_low, Some(1.2));
        assert_eq!(record.dividend_yield, Some(0.5));
    }

    #[test]
    fn recent_income_is_oldest_first_and_limited() {
        let financials: Financials = serde_json::from_str(
            r#"{
                "incomeStatement": [
                    {"fiscalQuarter": 4, "fiscalYear": 2023, "totalRevenue": 40.0},
                    {"fiscalQuarter": 3, "fiscalYear": 2023, "totalRevenue": 30.0},
                    {"fiscalQuarter": 2, "fiscalYear": 2023, "totalRevenue": 20.0},
                    {"fiscalQuarter": 1, "fiscalYear": 2023, "totalRevenue": 10.0},
                    {"fiscalQuarter": 4, "fiscalYear": 2022, "totalRevenue": 5.0}
                ],
                "balanceSheet": []
            }"#,
        )
        .expect("financials should parse");

        let rows = financials.recent_income(4);
        let labels = rows.iter().map(|(label, _)| label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["Q1 2023", "Q2 2023", "Q3 2023", "Q4 2023"]);
        assert_eq!(rows[0].1.total_revenue, Some(10.0));
    }
}
