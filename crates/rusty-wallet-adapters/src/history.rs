use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use rusty_wallet_core::ports::{HistoryPort, PortError};
use rusty_wallet_core::{SigningRecord, TxHistoryRecord, WatchEntry};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTx {
    pub record: TxHistoryRecord,
    pub explain: Option<Value>,
}

#[derive(Debug, Default)]
struct HistoryState {
    transactions: Vec<StoredTx>,
    submit_failed: Vec<StoredTx>,
    explain_cache: HashMap<String, Value>,
    watches: HashMap<String, WatchEntry>,
    signing: Vec<SigningRecord>,
    page_state_clears: usize,
}

/// In-memory transaction, watch and signing history.
#[derive(Debug, Clone, Default)]
pub struct HistoryAdapter {
    state: Arc<Mutex<HistoryState>>,
}

impl HistoryAdapter {
    fn lock(&self) -> Result<MutexGuard<'_, HistoryState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("history lock poisoned: {e}")))
    }

    pub fn set_explain_cache(
        &self,
        key: impl Into<String>,
        explain: Value,
    ) -> Result<(), PortError> {
        self.lock()?.explain_cache.insert(key.into(), explain);
        Ok(())
    }

    pub fn transactions(&self) -> Result<Vec<StoredTx>, PortError> {
        Ok(self.lock()?.transactions.clone())
    }

    pub fn submit_failed(&self) -> Result<Vec<StoredTx>, PortError> {
        Ok(self.lock()?.submit_failed.clone())
    }

    pub fn watch(&self, key: &str) -> Result<Option<WatchEntry>, PortError> {
        Ok(self.lock()?.watches.get(key).cloned())
    }

    pub fn watch_count(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.watches.len())
    }

    pub fn signing_records(&self) -> Result<Vec<SigningRecord>, PortError> {
        Ok(self.lock()?.signing.clone())
    }

    pub fn page_state_clears(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.page_state_clears)
    }
}

impl HistoryPort for HistoryAdapter {
    fn add_tx(&self, record: TxHistoryRecord, explain: Option<Value>) -> Result<(), PortError> {
        self.lock()?.transactions.push(StoredTx { record, explain });
        Ok(())
    }

    fn add_submit_failed_transaction(
        &self,
        record: TxHistoryRecord,
        explain: Option<Value>,
    ) -> Result<(), PortError> {
        if !record.is_submit_failed {
            return Err(PortError::Validation(
                "submit-failed record must set isSubmitFailed".to_owned(),
            ));
        }
        self.lock()?.submit_failed.push(StoredTx { record, explain });
        Ok(())
    }

    fn get_explain_cache(&self, key: &str) -> Result<Option<Value>, PortError> {
        Ok(self.lock()?.explain_cache.get(key).cloned())
    }

    fn add_watch(&self, key: &str, entry: WatchEntry) -> Result<(), PortError> {
        self.lock()?.watches.insert(key.to_owned(), entry);
        Ok(())
    }

    fn add_signing_record(&self, record: SigningRecord) -> Result<(), PortError> {
        self.lock()?.signing.push(record);
        Ok(())
    }

    fn clear_page_state(&self) -> Result<(), PortError> {
        self.lock()?.page_state_clears += 1;
        Ok(())
    }
}
