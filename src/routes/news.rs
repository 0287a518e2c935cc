use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::models::NewsArticle;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_news))
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    pub symbol: Option<String>,
}

/// Company news when `symbol` is given, general market news otherwise.
async fn get_news(
    State(state): State<AppState>,
    Query(query): Query<NewsQuery>,
) -> Json<Vec<NewsArticle>> {
    info!("GET /api/news - symbol={:?}", query.symbol);
    Json(state.market.news(query.symbol.as_deref()).await)
}
