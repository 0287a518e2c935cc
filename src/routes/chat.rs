use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{AiResponse, ChatMessage, ChatRequest, StockContext};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_conversation).post(send_message).delete(clear_conversation))
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub messages: Vec<ChatMessage>,
    pub context: Option<StockContext>,
}

async fn send_message(
    State(state): State<AppState>,
    Json(input): Json<ChatRequest>,
) -> Result<Json<AiResponse>, AppError> {
    let message = input.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }
    info!("POST /api/chat - symbol={:?} portfolio={}", input.symbol, input.include_portfolio);

    if let Some(symbol) = input.symbol.as_deref().filter(|s| !s.trim().is_empty()) {
        let context = state.market.stock_context(symbol).await;
        state.chat.set_context(context);
    }

    let portfolio = (input.include_portfolio && state.session.current_user().is_some())
        .then(|| state.ledger.lock().portfolio_summary());

    Ok(Json(state.chat.send_message(message, portfolio).await))
}

async fn get_conversation(State(state): State<AppState>) -> Json<ConversationView> {
    Json(ConversationView {
        messages: state.chat.messages(),
        context: state.chat.context(),
    })
}

async fn clear_conversation(State(state): State<AppState>) -> StatusCode {
    info!("DELETE /api/chat");
    state.chat.clear_messages();
    state.chat.clear_context();
    StatusCode::NO_CONTENT
}
