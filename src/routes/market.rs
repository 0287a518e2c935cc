use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{CompanyProfile, HistoryPoint, Quote, SearchResult, StockContext, HISTORY_INTERVALS};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quotes", get(get_quotes))
        .route("/search", get(search))
        .route("/:symbol/history", get(get_history))
        .route("/:symbol/profile", get(get_profile))
        .route("/:symbol/context", get(get_context))
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QuotesQuery {
    /// Comma-separated tickers.
    pub symbols: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub interval: Option<String>,
}

fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuotesQuery>,
) -> Result<Json<Vec<Quote>>, AppError> {
    let symbols = split_symbols(&query.symbols);
    if symbols.is_empty() {
        return Err(AppError::Validation("At least one symbol is required".to_string()));
    }
    info!("GET /api/market/quotes - {} symbols", symbols.len());
    Ok(Json(state.market.quotes(&symbols).await))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<SearchResult>> {
    info!("GET /api/market/search - q={}", query.q);
    Json(state.market.search(&query.q).await)
}

async fn get_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, AppError> {
    let interval = query.interval.unwrap_or_else(|| "1d".to_string());
    if !HISTORY_INTERVALS.contains(&interval.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported interval '{}', expected one of {}",
            interval,
            HISTORY_INTERVALS.join(", ")
        )));
    }
    info!("GET /api/market/{}/history - interval={}", symbol, interval);
    Ok(Json(state.market.history(&symbol, &interval).await))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CompanyProfile>, AppError> {
    info!("GET /api/market/{}/profile", symbol);
    state
        .market
        .profile(&symbol)
        .await
        .map(Json)
        .ok_or(AppError::NotFound)
}

async fn get_context(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<StockContext> {
    info!("GET /api/market/{}/context", symbol);
    Json(state.market.stock_context(&symbol).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_symbols_drops_blanks() {
        assert_eq!(split_symbols(" aapl, ,MSFT,"), vec!["aapl", "MSFT"]);
        assert!(split_symbols(" , ").is_empty());
    }
}
