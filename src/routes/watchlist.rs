use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::Quote;
use crate::services::watchlist_service::AddOutcome;
use crate::state::AppState;
use crate::utils::parse::normalize_symbol;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/:symbol", delete(remove))
}

#[derive(Debug, Deserialize)]
pub struct AddSymbolRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub quote: Option<Quote>,
}

#[derive(Debug, Serialize)]
pub struct AddSymbolResponse {
    pub symbol: String,
    pub already_present: bool,
}

#[derive(Debug, Serialize)]
pub struct RemoveSymbolResponse {
    pub symbol: String,
    pub removed: bool,
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<WatchlistEntry>>, AppError> {
    info!("GET /api/watchlist");
    state.session.require_user()?;
    let symbols = state.watchlist.lock().stocks().to_vec();
    let entries = symbols
        .into_iter()
        .map(|symbol| WatchlistEntry {
            quote: state.market.last_quote(&symbol),
            symbol,
        })
        .collect();
    Ok(Json(entries))
}

async fn add(
    State(state): State<AppState>,
    Json(input): Json<AddSymbolRequest>,
) -> Result<(StatusCode, Json<AddSymbolResponse>), AppError> {
    info!("POST /api/watchlist - {}", input.symbol);
    let outcome = state.watchlist.lock().add_stock(&input.symbol)?;

    let status = match outcome {
        AddOutcome::Added => {
            state.checkpoint();
            StatusCode::CREATED
        }
        AddOutcome::AlreadyPresent => StatusCode::OK,
    };

    Ok((
        status,
        Json(AddSymbolResponse {
            symbol: normalize_symbol(&input.symbol),
            already_present: outcome == AddOutcome::AlreadyPresent,
        }),
    ))
}

async fn remove(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<RemoveSymbolResponse>, AppError> {
    info!("DELETE /api/watchlist/{}", symbol);
    let removed = state.watchlist.lock().remove_stock(&symbol)?;
    if removed {
        state.checkpoint();
    }
    Ok(Json(RemoveSymbolResponse {
        symbol: normalize_symbol(&symbol),
        removed,
    }))
}
