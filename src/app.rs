use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::routes::{chat, health, market, news, portfolio, session, watchlist};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/session", session::router())
        .nest("/api/portfolio", portfolio::router())
        .nest("/api/watchlist", watchlist::router())
        .nest("/api/market", market::router())
        .nest("/api/news", news::router())
        .nest("/api/chat", chat::router())
        .layer(cors)
        .with_state(state)
}
