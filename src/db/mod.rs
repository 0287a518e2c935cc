pub mod memory_store;
pub mod pg_store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::SyncError;
use crate::models::{AccountSnapshot, ChatMessage, Holding, TradeRecord};

pub use memory_store::InMemoryCloudStore;
pub use pg_store::PgCloudStore;

/// Remote persistence for one account's holdings, watchlist, cash, trade log
/// and chat history.
///
/// Holding and watchlist rows are keyed by `(user_id, symbol)`; the cash
/// balance is a single row per `user_id`. Trades and chat messages are
/// append-only and keyed by their own ids.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn upsert_holding(&self, user_id: Uuid, holding: &Holding) -> Result<(), SyncError>;

    async fn delete_holding(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError>;

    async fn delete_all_holdings(&self, user_id: Uuid) -> Result<(), SyncError>;

    async fn upsert_cash(&self, user_id: Uuid, virtual_cash: f64) -> Result<(), SyncError>;

    async fn insert_trade(&self, user_id: Uuid, trade: &TradeRecord) -> Result<(), SyncError>;

    async fn insert_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError>;

    async fn delete_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError>;

    async fn insert_chat_message(&self, user_id: Uuid, message: &ChatMessage) -> Result<(), SyncError>;

    async fn delete_chat_history(&self, user_id: Uuid) -> Result<(), SyncError>;

    /// Full account state, `None` when the user has never been synced.
    /// Trades and chat messages come back oldest first.
    async fn load_account(&self, user_id: Uuid) -> Result<Option<AccountSnapshot>, SyncError>;
}
