/// HTTP API
///
/// Drives the axum router in-process with `tower::ServiceExt::oneshot`.
/// Market and AI providers are stubbed; the cloud mirror is in memory.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use paperfolio::app::create_app;
use paperfolio::db::InMemoryCloudStore;
use paperfolio::errors::GatewayError;
use paperfolio::external::market_gateway::{QuoteGateway, Unconfigured};
use paperfolio::models::{AccountSnapshot, ChatMessage, ChatRole, Quote, TradeRecord, TradeType, STARTING_CASH};
use paperfolio::services::failure_cache::FailureCache;
use paperfolio::services::market_service::{MarketGateways, MarketService};
use paperfolio::services::session_service::SessionVerifier;
use paperfolio::services::sync_service::SyncOutbox;
use paperfolio::state::AppState;

const SECRET: &str = "test-secret";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct FixedQuotes;

#[async_trait]
impl QuoteGateway for FixedQuotes {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, GatewayError> {
        Ok(symbols
            .iter()
            .map(|s| {
                let mut quote = Quote::new(s.clone(), 200.0);
                quote.long_name = Some(format!("{} Corporation", s));
                quote
            })
            .collect())
    }
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    email: String,
    aud: String,
    exp: usize,
}

fn access_token(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: "trader@example.com".to_string(),
        aud: "authenticated".to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn app() -> Router {
    app_with_cloud(InMemoryCloudStore::new())
}

fn app_with_cloud(cloud: InMemoryCloudStore) -> Router {
    let none = Arc::new(Unconfigured("test"));
    let market = MarketService::new(
        MarketGateways {
            quotes: Arc::new(FixedQuotes),
            history: none.clone(),
            profiles: none.clone(),
            news: none.clone(),
            search: none.clone(),
        },
        FailureCache::new(),
    );
    let state = AppState::new(
        SessionVerifier::new(SECRET),
        SyncOutbox::disabled(),
        market,
        none,
        Arc::new(cloud),
        None,
    );
    create_app(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

async fn signed_in_app() -> Router {
    let app = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/session",
        Some(json!({ "access_token": access_token(Uuid::new_v4()) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    app
}

// ---------------------------------------------------------------------------
// Health and session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn test_sign_in_starts_a_fresh_account() {
    let app = app();
    let user_id = Uuid::new_v4();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/session",
        Some(json!({ "access_token": access_token(user_id) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], json!(user_id));
    assert_eq!(body["virtual_cash"], json!(STARTING_CASH));

    let (status, _) = send(&app, Method::GET, "/api/session", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::DELETE, "/api/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/session", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_refused_while_cloud_unreachable() {
    let cloud = InMemoryCloudStore::new();
    let user_id = Uuid::new_v4();
    cloud.seed(user_id, AccountSnapshot { virtual_cash: 42_000.0, ..AccountSnapshot::default() });
    cloud.set_failing(true);
    let app = app_with_cloud(cloud.clone());

    let body = json!({ "access_token": access_token(user_id) });
    let (status, _) = send(&app, Method::POST, "/api/session", Some(body.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, Method::GET, "/api/session", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "AAPL", "quantity": 1, "price": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    cloud.set_failing(false);
    let (status, session) = send(&app, Method::POST, "/api/session", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["virtual_cash"], json!(42_000.0));
}

#[tokio::test]
async fn test_sign_in_restores_trades_and_chat_history() {
    let cloud = InMemoryCloudStore::new();
    let user_id = Uuid::new_v4();
    cloud.seed(
        user_id,
        AccountSnapshot {
            trades: vec![
                TradeRecord::new(TradeType::Buy, "AAPL".into(), 2, 150.0),
                TradeRecord::new(TradeType::Sell, "AAPL".into(), 2, 160.0),
            ],
            chat_history: vec![
                ChatMessage::new(ChatRole::User, "Is AAPL a good buy?"),
                ChatMessage::new(ChatRole::Assistant, "Here is some context."),
            ],
            ..AccountSnapshot::default()
        },
    );
    let app = app_with_cloud(cloud);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/session",
        Some(json!({ "access_token": access_token(user_id) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, trades) = send(&app, Method::GET, "/api/portfolio/trades", None).await;
    let types: Vec<&str> = trades.as_array().unwrap().iter().map(|t| t["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["BUY", "SELL"]);

    let (_, conversation) = send(&app, Method::GET, "/api/chat", None).await;
    assert_eq!(conversation["messages"][0]["content"], "Is AAPL a good buy?");
    assert_eq!(conversation["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_signed_out_reads_hide_previous_account() {
    let app = signed_in_app().await;
    send(
        &app,
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "AAPL", "quantity": 1, "price": 100.0 })),
    )
    .await;
    send(&app, Method::POST, "/api/watchlist", Some(json!({ "symbol": "AAPL" }))).await;

    let (status, _) = send(&app, Method::DELETE, "/api/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for uri in ["/api/portfolio", "/api/portfolio/summary", "/api/portfolio/trades", "/api/watchlist"] {
        let (status, _) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_sign_in_rejects_bad_token() {
    let (status, _) = send(
        &app(),
        Method::POST,
        "/api/session",
        Some(json!({ "access_token": "not-a-jwt" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trading_requires_a_session() {
    let (status, _) = send(
        &app(),
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "AAPL", "quantity": 1, "price": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_buy_then_sell() {
    let app = signed_in_app().await;

    let (status, holding) = send(
        &app,
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "aapl", "quantity": 10, "price": 150.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(holding["symbol"], "AAPL");
    assert_eq!(holding["companyName"], "AAPL");

    let (_, portfolio) = send(&app, Method::GET, "/api/portfolio", None).await;
    assert_eq!(portfolio["virtualCash"], json!(STARTING_CASH - 1_500.0));
    assert_eq!(portfolio["holdings"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/portfolio/sell",
        Some(json!({ "holding_id": holding["id"], "quantity": 11, "sell_price": 160.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, trade) = send(
        &app,
        Method::POST,
        "/api/portfolio/sell",
        Some(json!({ "holding_id": holding["id"], "quantity": 10, "sell_price": 160.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trade["type"], "SELL");

    let (_, trades) = send(&app, Method::GET, "/api/portfolio/trades", None).await;
    assert_eq!(trades.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_buy_uses_quoted_company_name() {
    let app = signed_in_app().await;
    let (status, _) = send(&app, Method::GET, "/api/market/quotes?symbols=MSFT", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, holding) = send(
        &app,
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "MSFT", "quantity": 1, "price": 200.0 })),
    )
    .await;
    assert_eq!(holding["companyName"], "MSFT Corporation");
}

#[tokio::test]
async fn test_reset_restores_starting_cash() {
    let app = signed_in_app().await;
    send(
        &app,
        Method::POST,
        "/api/portfolio/buy",
        Some(json!({ "symbol": "TSLA", "quantity": 2, "price": 250.0 })),
    )
    .await;

    let (status, portfolio) = send(&app, Method::POST, "/api/portfolio/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(portfolio["virtualCash"], json!(STARTING_CASH));
    assert!(portfolio["holdings"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_watchlist_add_twice_then_remove() {
    let app = signed_in_app().await;

    let (status, body) = send(&app, Method::POST, "/api/watchlist", Some(json!({ "symbol": "nvda" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["symbol"], "NVDA");
    assert_eq!(body["already_present"], false);

    let (status, body) = send(&app, Method::POST, "/api/watchlist", Some(json!({ "symbol": "NVDA" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_present"], true);

    let (_, list) = send(&app, Method::GET, "/api/watchlist", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::DELETE, "/api/watchlist/nvda", None).await;
    assert_eq!(body["removed"], true);
}

// ---------------------------------------------------------------------------
// Market and chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_market_validation() {
    let app = app();

    let (status, _) = send(&app, Method::GET, "/api/market/quotes?symbols=,", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/market/AAPL/history?interval=2y", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, history) = send(&app, Method::GET, "/api/market/AAPL/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));

    let (status, _) = send(&app, Method::GET, "/api/market/AAPL/profile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_news_degrades_to_empty() {
    let (status, body) = send(&app(), Method::GET, "/api/news?symbol=AAPL", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_chat_degrades_without_ai_provider() {
    let app = app();

    let (status, _) = send(&app, Method::POST, "/api/chat", Some(json!({ "message": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reply) = send(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "message": "How is Apple doing?", "symbol": "AAPL" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["degraded"], true);

    let (_, conversation) = send(&app, Method::GET, "/api/chat", None).await;
    assert_eq!(conversation["messages"].as_array().unwrap().len(), 2);
    assert_eq!(conversation["context"]["symbol"], "AAPL");
    assert_eq!(conversation["context"]["currentPrice"], json!(200.0));

    let (status, _) = send(&app, Method::DELETE, "/api/chat", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, conversation) = send(&app, Method::GET, "/api/chat", None).await;
    assert!(conversation["messages"].as_array().unwrap().is_empty());
    assert!(conversation["context"].is_null());
}
