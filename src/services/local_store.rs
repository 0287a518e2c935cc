use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::StorageError;
use crate::models::AccountSnapshot;

pub const STORAGE_FILE: &str = "paperfolio-storage.json";

/// Device-local JSON checkpoint of the account, read at boot so state
/// survives a restart without network.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STORAGE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a temp file and rename so a crash never leaves half a file.
    pub fn save(&self, snapshot: &AccountSnapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<AccountSnapshot>, StorageError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "💾 No local state found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)?;
        let snapshot: AccountSnapshot = serde_json::from_str(&json)?;
        info!(
            path = %self.path.display(),
            cash = %format!("${:.2}", snapshot.virtual_cash),
            holdings = snapshot.holdings.len(),
            watchlist = snapshot.stocks.len(),
            "💾 Local state loaded"
        );
        Ok(Some(snapshot))
    }

    /// Like [`load`](Self::load) but treats a corrupt or unreadable file as empty.
    pub fn load_or_default(&self) -> AccountSnapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => AccountSnapshot::default(),
            Err(e) => {
                warn!(path = %self.path.display(), "⚠️ Ignoring unreadable local state: {}", e);
                AccountSnapshot::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, ChatRole, Holding, TradeRecord, TradeType, STARTING_CASH};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("paperfolio_{}_{}", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = temp_dir("missing");
        let store = LocalStore::new(&dir);
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.load_or_default().virtual_cash, STARTING_CASH);
    }

    #[test]
    fn test_save_then_load() {
        let dir = temp_dir("save");
        let store = LocalStore::new(&dir);
        let snapshot = AccountSnapshot {
            holdings: vec![Holding::new("AAPL".into(), "Apple".into(), 3, 150.0)],
            virtual_cash: 99_550.0,
            stocks: vec!["MSFT".into()],
            trades: vec![TradeRecord::new(TradeType::Buy, "AAPL".into(), 3, 150.0)],
            chat_history: vec![ChatMessage::new(ChatRole::User, "hi")],
        };

        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        let store = LocalStore::new(&dir);
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), AccountSnapshot::default());

        let _ = fs::remove_dir_all(dir);
    }
}
