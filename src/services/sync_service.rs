use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::CloudStore;
use crate::errors::SyncError;
use crate::models::{AccountSnapshot, ChatMessage, Holding, TradeRecord};

/// One remote write, produced by a store after its in-memory mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    UpsertHolding { user_id: Uuid, holding: Holding },
    DeleteHolding { user_id: Uuid, symbol: String },
    ClearHoldings { user_id: Uuid },
    UpsertCash { user_id: Uuid, virtual_cash: f64 },
    AppendTrade { user_id: Uuid, trade: TradeRecord },
    AddWatchlistSymbol { user_id: Uuid, symbol: String },
    RemoveWatchlistSymbol { user_id: Uuid, symbol: String },
    AppendChatMessage { user_id: Uuid, message: ChatMessage },
    ClearChatHistory { user_id: Uuid },
}

impl SyncCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SyncCommand::UpsertHolding { .. } => "upsert_holding",
            SyncCommand::DeleteHolding { .. } => "delete_holding",
            SyncCommand::ClearHoldings { .. } => "clear_holdings",
            SyncCommand::UpsertCash { .. } => "upsert_cash",
            SyncCommand::AppendTrade { .. } => "append_trade",
            SyncCommand::AddWatchlistSymbol { .. } => "add_watchlist_symbol",
            SyncCommand::RemoveWatchlistSymbol { .. } => "remove_watchlist_symbol",
            SyncCommand::AppendChatMessage { .. } => "append_chat_message",
            SyncCommand::ClearChatHistory { .. } => "clear_chat_history",
        }
    }
}

/// Sending half of the sync queue. Enqueueing never blocks and never fails
/// the caller.
#[derive(Debug, Clone)]
pub struct SyncOutbox {
    tx: Option<UnboundedSender<SyncCommand>>,
}

impl SyncOutbox {
    pub fn channel() -> (Self, UnboundedReceiver<SyncCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// An outbox that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, command: SyncCommand) {
        let Some(tx) = &self.tx else {
            debug!("Sync disabled, dropping {}", command.name());
            return;
        };
        if let Err(err) = tx.send(command) {
            warn!("⚠️ Sync worker gone, dropping {}", err.0.name());
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Drains the outbox into a [`CloudStore`]. Failed writes are logged and
/// dropped; local state is never rolled back.
pub struct SyncWorker {
    store: Arc<dyn CloudStore>,
    policy: SyncPolicy,
}

impl SyncWorker {
    pub fn new(store: Arc<dyn CloudStore>, policy: SyncPolicy) -> Self {
        Self { store, policy }
    }

    pub fn spawn(self, rx: UnboundedReceiver<SyncCommand>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    pub async fn run(self, mut rx: UnboundedReceiver<SyncCommand>) {
        info!("🔄 Sync worker started (max_attempts={})", self.policy.max_attempts);
        while let Some(command) = rx.recv().await {
            self.process(command).await;
        }
        info!("Sync worker stopped");
    }

    /// Applies everything already queued, then returns how many commands
    /// were taken off the channel.
    pub async fn drain(&self, rx: &mut UnboundedReceiver<SyncCommand>) -> usize {
        let mut processed = 0;
        while let Ok(command) = rx.try_recv() {
            self.process(command).await;
            processed += 1;
        }
        processed
    }

    /// Applies one command with the configured retry policy. Returns whether
    /// the write eventually succeeded.
    pub async fn process(&self, command: SyncCommand) -> bool {
        let attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_backoff;

        for attempt in 1..=attempts {
            match self.apply(&command).await {
                Ok(()) => {
                    debug!("Synced {}", command.name());
                    return true;
                }
                Err(err) if attempt < attempts => {
                    warn!(
                        "Sync {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        command.name(),
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => {
                    warn!("⚠️ Sync {} dropped: {}", command.name(), err);
                }
            }
        }
        false
    }

    pub async fn apply(&self, command: &SyncCommand) -> Result<(), SyncError> {
        match command {
            SyncCommand::UpsertHolding { user_id, holding } => {
                self.store.upsert_holding(*user_id, holding).await
            }
            SyncCommand::DeleteHolding { user_id, symbol } => {
                self.store.delete_holding(*user_id, symbol).await
            }
            SyncCommand::ClearHoldings { user_id } => self.store.delete_all_holdings(*user_id).await,
            SyncCommand::UpsertCash { user_id, virtual_cash } => {
                self.store.upsert_cash(*user_id, *virtual_cash).await
            }
            SyncCommand::AppendTrade { user_id, trade } => {
                self.store.insert_trade(*user_id, trade).await
            }
            SyncCommand::AddWatchlistSymbol { user_id, symbol } => {
                self.store.insert_watchlist_symbol(*user_id, symbol).await
            }
            SyncCommand::RemoveWatchlistSymbol { user_id, symbol } => {
                self.store.delete_watchlist_symbol(*user_id, symbol).await
            }
            SyncCommand::AppendChatMessage { user_id, message } => {
                self.store.insert_chat_message(*user_id, message).await
            }
            SyncCommand::ClearChatHistory { user_id } => self.store.delete_chat_history(*user_id).await,
        }
    }
}

/// Remote account state for `user_id`, or a fresh account when the user has
/// never synced. An unreachable store is an error: callers must not mistake
/// it for an empty account.
pub async fn load_from_cloud(store: &dyn CloudStore, user_id: Uuid) -> Result<AccountSnapshot, SyncError> {
    match store.load_account(user_id).await {
        Ok(Some(snapshot)) => {
            info!(
                "☁️ Loaded {} holdings, {} trades, {} chat messages and {} watchlist symbols for {}",
                snapshot.holdings.len(),
                snapshot.trades.len(),
                snapshot.chat_history.len(),
                snapshot.stocks.len(),
                user_id
            );
            Ok(snapshot)
        }
        Ok(None) => {
            info!("No cloud state for {}, starting fresh", user_id);
            Ok(AccountSnapshot::default())
        }
        Err(err) => {
            warn!("⚠️ Failed to load cloud state for {}: {}", user_id, err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCloudStore;
    use crate::models::STARTING_CASH;

    #[tokio::test]
    async fn test_disabled_outbox_swallows_commands() {
        let outbox = SyncOutbox::disabled();
        outbox.send(SyncCommand::ClearHoldings { user_id: Uuid::new_v4() });
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_does_not_panic() {
        let (outbox, rx) = SyncOutbox::channel();
        drop(rx);
        outbox.send(SyncCommand::UpsertCash { user_id: Uuid::new_v4(), virtual_cash: 1.0 });
    }

    #[tokio::test]
    async fn test_drain_applies_queued_commands() {
        let store = InMemoryCloudStore::new();
        let worker = SyncWorker::new(Arc::new(store.clone()), SyncPolicy::default());
        let (outbox, mut rx) = SyncOutbox::channel();
        let user_id = Uuid::new_v4();

        outbox.send(SyncCommand::UpsertCash { user_id, virtual_cash: 42.0 });
        outbox.send(SyncCommand::AddWatchlistSymbol { user_id, symbol: "AAPL".into() });

        assert_eq!(worker.drain(&mut rx).await, 2);
        let record = store.record(user_id).unwrap();
        assert_eq!(record.virtual_cash, Some(42.0));
        assert_eq!(record.stocks, vec!["AAPL".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_write_is_dropped_after_policy_attempts() {
        let store = InMemoryCloudStore::new();
        store.set_failing(true);
        let worker = SyncWorker::new(
            Arc::new(store.clone()),
            SyncPolicy { max_attempts: 2, initial_backoff: Duration::from_millis(1) },
        );

        let ok = worker
            .process(SyncCommand::UpsertCash { user_id: Uuid::new_v4(), virtual_cash: 5.0 })
            .await;
        assert!(!ok);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_load_from_cloud_defaults_and_outage() {
        let store = InMemoryCloudStore::new();
        let fresh = load_from_cloud(&store, Uuid::new_v4()).await.unwrap();
        assert_eq!(fresh.virtual_cash, STARTING_CASH);

        store.set_failing(true);
        let offline = load_from_cloud(&store, Uuid::new_v4()).await;
        assert!(matches!(offline, Err(SyncError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_chat_commands_reach_store() {
        let store = InMemoryCloudStore::new();
        let worker = SyncWorker::new(Arc::new(store.clone()), SyncPolicy::default());
        let user_id = Uuid::new_v4();

        let message = ChatMessage::new(crate::models::ChatRole::User, "hello");
        assert!(worker.process(SyncCommand::AppendChatMessage { user_id, message: message.clone() }).await);
        assert_eq!(store.record(user_id).unwrap().chat_history, vec![message]);

        assert!(worker.process(SyncCommand::ClearChatHistory { user_id }).await);
        assert!(store.record(user_id).unwrap().chat_history.is_empty());
    }
}
