use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::db::CloudStore;
use crate::errors::SyncError;
use crate::models::{AccountSnapshot, ChatMessage, Holding, TradeRecord};

#[derive(Debug, Clone, Default)]
pub struct AccountRecord {
    pub holdings: Vec<Holding>,
    pub virtual_cash: Option<f64>,
    pub stocks: Vec<String>,
    pub trades: Vec<TradeRecord>,
    pub chat_history: Vec<ChatMessage>,
}

/// Process-local stand-in for the cloud store, used when no database is
/// configured and by tests. `set_failing(true)` makes every call error.
#[derive(Clone, Default)]
pub struct InMemoryCloudStore {
    accounts: Arc<DashMap<Uuid, AccountRecord>>,
    failing: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of writes that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn record(&self, user_id: Uuid) -> Option<AccountRecord> {
        self.accounts.get(&user_id).map(|r| r.value().clone())
    }

    pub fn seed(&self, user_id: Uuid, snapshot: AccountSnapshot) {
        self.accounts.insert(
            user_id,
            AccountRecord {
                holdings: snapshot.holdings,
                virtual_cash: Some(snapshot.virtual_cash),
                stocks: snapshot.stocks,
                trades: snapshot.trades,
                chat_history: snapshot.chat_history,
            },
        );
    }

    fn check(&self) -> Result<(), SyncError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("in-memory store set to fail".into()));
        }
        Ok(())
    }

    fn write<F>(&self, user_id: Uuid, apply: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut AccountRecord),
    {
        self.check()?;
        let mut record = self.accounts.entry(user_id).or_default();
        apply(record.value_mut());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CloudStore for InMemoryCloudStore {
    async fn upsert_holding(&self, user_id: Uuid, holding: &Holding) -> Result<(), SyncError> {
        self.write(user_id, |r| {
            match r.holdings.iter_mut().find(|h| h.symbol == holding.symbol) {
                Some(existing) => *existing = holding.clone(),
                None => r.holdings.push(holding.clone()),
            }
        })
    }

    async fn delete_holding(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        self.write(user_id, |r| r.holdings.retain(|h| h.symbol != symbol))
    }

    async fn delete_all_holdings(&self, user_id: Uuid) -> Result<(), SyncError> {
        self.write(user_id, |r| r.holdings.clear())
    }

    async fn upsert_cash(&self, user_id: Uuid, virtual_cash: f64) -> Result<(), SyncError> {
        self.write(user_id, |r| r.virtual_cash = Some(virtual_cash))
    }

    async fn insert_trade(&self, user_id: Uuid, trade: &TradeRecord) -> Result<(), SyncError> {
        self.write(user_id, |r| r.trades.push(trade.clone()))
    }

    async fn insert_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        self.write(user_id, |r| {
            if !r.stocks.iter().any(|s| s == symbol) {
                r.stocks.push(symbol.to_string());
            }
        })
    }

    async fn delete_watchlist_symbol(&self, user_id: Uuid, symbol: &str) -> Result<(), SyncError> {
        self.write(user_id, |r| r.stocks.retain(|s| s != symbol))
    }

    async fn insert_chat_message(&self, user_id: Uuid, message: &ChatMessage) -> Result<(), SyncError> {
        self.write(user_id, |r| r.chat_history.push(message.clone()))
    }

    async fn delete_chat_history(&self, user_id: Uuid) -> Result<(), SyncError> {
        self.write(user_id, |r| r.chat_history.clear())
    }

    async fn load_account(&self, user_id: Uuid) -> Result<Option<AccountSnapshot>, SyncError> {
        self.check()?;
        Ok(self.accounts.get(&user_id).and_then(|r| {
            r.virtual_cash.map(|virtual_cash| {
                let mut trades = r.trades.clone();
                trades.sort_by_key(|t| t.executed_at);
                let mut chat_history = r.chat_history.clone();
                chat_history.sort_by_key(|m| m.timestamp);
                AccountSnapshot {
                    holdings: r.holdings.clone(),
                    virtual_cash,
                    stocks: r.stocks.clone(),
                    trades,
                    chat_history,
                }
            })
        }))
    }
}
