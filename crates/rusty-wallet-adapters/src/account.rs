use std::sync::{Arc, Mutex};

use rusty_wallet_core::ports::{AccountPort, PortError};
use rusty_wallet_core::Account;

/// Process-wide active account, switchable at any time.
#[derive(Debug, Clone, Default)]
pub struct ActiveAccountAdapter {
    current: Arc<Mutex<Option<Account>>>,
}

impl ActiveAccountAdapter {
    pub fn new(account: Option<Account>) -> Self {
        Self {
            current: Arc::new(Mutex::new(account)),
        }
    }

    /// Returns the previously active account.
    pub fn switch_to(&self, account: Option<Account>) -> Result<Option<Account>, PortError> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| PortError::Transport(format!("account lock poisoned: {e}")))?;
        if let Some(next) = &account {
            tracing::info!(address = %next.address, "active account switched");
        }
        Ok(std::mem::replace(&mut *current, account))
    }
}

impl AccountPort for ActiveAccountAdapter {
    fn current_account(&self) -> Result<Option<Account>, PortError> {
        self.current
            .lock()
            .map(|g| g.clone())
            .map_err(|e| PortError::Transport(format!("account lock poisoned: {e}")))
    }
}
