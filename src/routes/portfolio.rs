use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Holding, TradeRecord};
use crate::services::ledger_service::LedgerStore;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_portfolio))
        .route("/buy", post(buy))
        .route("/sell", post(sell))
        .route("/reset", post(reset))
        .route("/summary", get(summary))
        .route("/trades", get(trades))
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub symbol: String,
    pub quantity: u32,
    pub price: f64,
    pub company_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub holding_id: Uuid,
    pub quantity: u32,
    pub sell_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub holdings: Vec<Holding>,
    pub virtual_cash: f64,
    pub cost_basis: f64,
    pub portfolio_value: f64,
    pub total_profit: f64,
}

impl From<&LedgerStore> for PortfolioView {
    fn from(ledger: &LedgerStore) -> Self {
        Self {
            holdings: ledger.holdings().to_vec(),
            virtual_cash: ledger.virtual_cash(),
            cost_basis: ledger.cost_basis(),
            portfolio_value: ledger.portfolio_value(),
            total_profit: ledger.total_profit(),
        }
    }
}

// Signed-out reads get 401, never the previous account.
async fn get_portfolio(State(state): State<AppState>) -> Result<Json<PortfolioView>, AppError> {
    info!("GET /api/portfolio");
    state.session.require_user()?;
    let view = PortfolioView::from(&*state.ledger.lock());
    Ok(Json(view))
}

async fn buy(
    State(state): State<AppState>,
    Json(input): Json<BuyRequest>,
) -> Result<(StatusCode, Json<Holding>), AppError> {
    info!("POST /api/portfolio/buy - {} x{} @ {}", input.symbol, input.quantity, input.price);

    // Fall back to the quoted company name when the client did not send one.
    let company_name = input.company_name.or_else(|| {
        state
            .market
            .last_quote(&input.symbol)
            .and_then(|q| q.display_name().map(str::to_string))
    });

    let result = state
        .ledger
        .lock()
        .buy(&input.symbol, input.quantity, input.price, company_name.as_deref());
    let holding = result.map_err(|e| {
        error!("Buy rejected for {}: {}", input.symbol, e);
        e
    })?;

    state.checkpoint();
    Ok((StatusCode::CREATED, Json(holding)))
}

async fn sell(
    State(state): State<AppState>,
    Json(input): Json<SellRequest>,
) -> Result<Json<TradeRecord>, AppError> {
    info!("POST /api/portfolio/sell - {} x{} @ {}", input.holding_id, input.quantity, input.sell_price);

    let result = state
        .ledger
        .lock()
        .sell(input.holding_id, input.quantity, input.sell_price);
    let trade = result.map_err(|e| {
        error!("Sell rejected for {}: {}", input.holding_id, e);
        e
    })?;

    state.checkpoint();
    Ok(Json(trade))
}

async fn reset(State(state): State<AppState>) -> Result<Json<PortfolioView>, AppError> {
    info!("POST /api/portfolio/reset");
    let view = {
        let mut ledger = state.ledger.lock();
        ledger.clear_portfolio()?;
        PortfolioView::from(&*ledger)
    };
    state.checkpoint();
    Ok(Json(view))
}

async fn summary(State(state): State<AppState>) -> Result<String, AppError> {
    info!("GET /api/portfolio/summary");
    state.session.require_user()?;
    Ok(state.ledger.lock().portfolio_summary())
}

async fn trades(State(state): State<AppState>) -> Result<Json<Vec<TradeRecord>>, AppError> {
    state.session.require_user()?;
    Ok(Json(state.ledger.lock().trades().to_vec()))
}
