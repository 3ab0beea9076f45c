//! Demo data for `--mock`.
//!
//! `ABC` loses its first financials request to a network error, so
//! `show ABC --retries 1` recovers all four sources. `NG` financials stay
//! unavailable upstream.

use lodestone_core::{FixtureHttpClient, HttpError, HttpMethod, HttpResponse};
use serde_json::json;

pub const MOCK_API_URL: &str = "http://mock.lodestone.local";
pub const MOCK_TOKEN: &str = "mock-id-token";

struct DemoEntity {
    symbol: &'static str,
    name: &'static str,
    exchange: &'static str,
    currency: &'static str,
}

const ENTITIES: [DemoEntity; 2] = [
    DemoEntity {
        symbol: "ABC",
        name: "Abc Mining Corp",
        exchange: "TSXV",
        currency: "CAD",
    },
    DemoEntity {
        symbol: "NG",
        name: "Northgate Gold",
        exchange: "NYSE American",
        currency: "USD",
    },
];

pub fn fixture_client() -> FixtureHttpClient {
    let client = FixtureHttpClient::new();

    for entity in &ENTITIES {
        let hits = json!([{
            "symbol": entity.symbol,
            "name": entity.name,
            "exchange": entity.exchange,
            "currency": entity.currency,
        }])
        .to_string();
        for query in [entity.symbol.to_owned(), entity.symbol.to_ascii_lowercase()] {
            client.push(
                HttpMethod::Get,
                format!("/symbols?query={query}"),
                Ok(HttpResponse::ok_json(hits.clone())),
            );
        }

        client.push(
            HttpMethod::Get,
            format!("/metrics/{}", entity.symbol),
            Ok(HttpResponse::ok_json(
                json!({
                    "symbol": entity.symbol,
                    "price": 1.42,
                    "change": -0.03,
                    "pe_ratio": 11.8,
                    "pb_ratio": "0.92",
                    "debt_equity": 0.31,
                    "current_ratio": 2.4,
                    "market_cap": 182_000_000,
                    "graham_ratio": "None",
                    "aisc": 1_310,
                    "last_updated": "2026-10-15",
                })
                .to_string(),
            )),
        );
        client.push(
            HttpMethod::Get,
            format!("/overview?symbol={}", entity.symbol),
            Ok(HttpResponse::ok_json(
                json!({
                    "description": format!("{} explores and develops gold projects.", entity.name),
                    "sector": "Basic Materials",
                    "industry": "Gold",
                    "market_cap": "182000000",
                    "52_week_high": 1.95,
                    "52_week_low": 0.88,
                })
                .to_string(),
            )),
        );
        client.push(
            HttpMethod::Get,
            format!("/news?symbol={}", entity.symbol),
            Ok(HttpResponse::ok_json(
                json!([{
                    "id": 1,
                    "title": format!("{} reports quarterly production", entity.name),
                    "date": "2026-10-14",
                    "source": "Newswire",
                }])
                .to_string(),
            )),
        );
    }

    let financials_path = "/financials?symbol=ABC";
    client.push(
        HttpMethod::Get,
        financials_path,
        Err(HttpError::no_response("connection reset by peer")),
    );
    client.push(
        HttpMethod::Get,
        financials_path,
        Ok(HttpResponse::ok_json(
            json!({
                "incomeStatement": [
                    {"fiscalQuarter": 2, "fiscalYear": 2026, "totalRevenue": "48200000", "netIncome": "6100000"},
                    {"fiscalQuarter": 1, "fiscalYear": 2026, "totalRevenue": "44900000", "netIncome": "5300000"},
                ],
                "balanceSheet": [
                    {"fiscalQuarter": 2, "fiscalYear": 2026, "totalAssets": "310000000", "totalLiabilities": "96000000"},
                ],
            })
            .to_string(),
        )),
    );
    client.push(
        HttpMethod::Get,
        "/financials?symbol=NG",
        Ok(HttpResponse::new(
            503,
            json!({"error": "unavailable", "error_detail": "AlphaVantageUnavailable"}).to_string(),
        )),
    );

    client.push(
        HttpMethod::Get,
        "/watchlist",
        Ok(HttpResponse::ok_json(
            json!([{"symbol": "ABC", "name": "Abc Mining Corp"}]).to_string(),
        )),
    );
    client.push(
        HttpMethod::Post,
        "/watchlist",
        Ok(HttpResponse::ok_json(json!({"message": "Added to watchlist"}).to_string())),
    );
    client.push(
        HttpMethod::Delete,
        "/watchlist",
        Ok(HttpResponse::ok_json(json!({"message": "Removed from watchlist"}).to_string())),
    );

    client
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lodestone_core::{
        ApiClient, ApiSourceFetcher, DashboardConfig, Entity, ErrorKind, FetchOrchestrator,
        InMemorySessionProvider, SourceName, SourceResult, Symbol,
    };

    use super::*;

    fn orchestrator() -> FetchOrchestrator {
        let config = DashboardConfig::builder()
            .with_api_base_url(MOCK_API_URL)
            .build()
            .expect("valid config");
        let api = Arc::new(ApiClient::new(
            Arc::new(fixture_client()),
            Arc::new(InMemorySessionProvider::new()),
            &config,
        ));
        FetchOrchestrator::new(ApiSourceFetcher::for_sources(&SourceName::ALL, &api))
    }

    fn entity(raw: &str) -> Entity {
        let symbol = Symbol::parse(raw).expect("valid symbol");
        Entity::new(symbol, raw, "", None).expect("valid entity")
    }

    #[tokio::test]
    async fn abc_financials_recover_on_first_retry() {
        let orchestrator = orchestrator();

        orchestrator.select(entity("ABC"));
        let state = orchestrator.settled().await;
        assert_eq!(state.failed_sources(), vec![SourceName::Financials]);
        assert_eq!(state.success_count(), 3);

        assert!(orchestrator.retry_source(SourceName::Financials));
        let state = orchestrator.settled().await;
        assert_eq!(state.success_count(), 4);
    }

    #[tokio::test]
    async fn ng_financials_report_provider_outage() {
        let orchestrator = orchestrator();

        orchestrator.select(entity("NG"));
        let state = orchestrator.settled().await;

        let error = state
            .result(SourceName::Financials)
            .and_then(SourceResult::error)
            .expect("financials failed");
        assert_eq!(error.kind(), ErrorKind::ServerError { status: 503 });
        assert!(error.provider_hint().is_some());
    }
}
