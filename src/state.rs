use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::db::CloudStore;
use crate::external::market_gateway::AiCompletion;
use crate::models::{AccountSnapshot, User};
use crate::services::chat_service::ChatSession;
use crate::services::ledger_service::LedgerStore;
use crate::services::local_store::LocalStore;
use crate::services::market_service::MarketService;
use crate::services::session_service::{SessionGate, SessionVerifier};
use crate::services::sync_service::SyncOutbox;
use crate::services::watchlist_service::WatchlistStore;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionGate,
    pub verifier: SessionVerifier,
    pub ledger: Arc<Mutex<LedgerStore>>,
    pub watchlist: Arc<Mutex<WatchlistStore>>,
    pub market: MarketService,
    pub chat: ChatSession,
    pub cloud: Arc<dyn CloudStore>,
    pub local_store: Option<LocalStore>,
}

impl AppState {
    pub fn new(
        verifier: SessionVerifier,
        outbox: SyncOutbox,
        market: MarketService,
        ai: Arc<dyn AiCompletion>,
        cloud: Arc<dyn CloudStore>,
        local_store: Option<LocalStore>,
    ) -> Self {
        let session = SessionGate::new();
        Self {
            ledger: Arc::new(Mutex::new(LedgerStore::new(session.clone(), outbox.clone()))),
            watchlist: Arc::new(Mutex::new(WatchlistStore::new(session.clone(), outbox.clone()))),
            chat: ChatSession::new(ai).with_sync(session.clone(), outbox),
            session,
            verifier,
            market,
            cloud,
            local_store,
        }
    }

    /// Ledger, watchlist and chat as one persisted snapshot. Locks ledger,
    /// then watchlist.
    pub fn snapshot(&self) -> AccountSnapshot {
        let ledger = self.ledger.lock();
        let stocks = self.watchlist.lock().stocks().to_vec();
        let mut snapshot = ledger.snapshot(stocks);
        snapshot.chat_history = self.chat.messages();
        snapshot
    }

    /// Replace local state wholesale.
    pub fn restore(&self, snapshot: AccountSnapshot) {
        let mut ledger = self.ledger.lock();
        let mut watchlist = self.watchlist.lock();
        ledger.replace_state(snapshot.holdings, snapshot.virtual_cash, snapshot.trades);
        watchlist.replace(snapshot.stocks);
        self.chat.replace_messages(snapshot.chat_history);
    }

    /// Make `user` the signed-in user and install their account in one step.
    /// Both store locks are held across the switch, so no request can see
    /// the new user next to the previous account's state.
    pub fn begin_session(&self, user: User, snapshot: AccountSnapshot) {
        {
            let mut ledger = self.ledger.lock();
            let mut watchlist = self.watchlist.lock();
            self.session.sign_in(user);
            ledger.replace_state(snapshot.holdings, snapshot.virtual_cash, snapshot.trades);
            watchlist.replace(snapshot.stocks);
            self.chat.replace_messages(snapshot.chat_history);
        }
        self.checkpoint();
    }

    /// Write the current state to the device-local cache, if one is configured.
    pub fn checkpoint(&self) {
        let Some(store) = &self.local_store else {
            return;
        };
        if let Err(e) = store.save(&self.snapshot()) {
            warn!("⚠️ Failed to write local state: {}", e);
        }
    }
}
