use alloy::primitives::Address;

use crate::chains::{ChainEnum, ChainInfo};
use crate::domain::{Account, ConnectedSite};
use crate::error::ProviderError;
use crate::ports::{AccountPort, PermissionPort};

/// Snapshot of the shared wallet state for one origin.
///
/// Never cached across suspension points: read again at dispatch,
/// pre-validation and signing.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub origin: String,
    pub account: Option<Account>,
    pub site: Option<ConnectedSite>,
    pub chain: &'static ChainInfo,
}

impl CallContext {
    pub fn read(
        accounts: &dyn AccountPort,
        permission: &dyn PermissionPort,
        origin: &str,
        default_chain: ChainEnum,
    ) -> Result<Self, ProviderError> {
        let account = accounts.current_account()?;
        let site = permission.get_connected_site(origin)?;
        let chain = site
            .as_ref()
            .map(|s| s.chain)
            .unwrap_or(default_chain)
            .info();
        Ok(Self {
            origin: origin.to_owned(),
            account,
            site,
            chain,
        })
    }

    pub fn active_account(&self) -> Result<&Account, ProviderError> {
        self.account
            .as_ref()
            .ok_or_else(|| ProviderError::invalid_params("no active account"))
    }

    /// `Address` equality is byte equality, so differently-cased hex inputs
    /// that parse to the same account compare equal.
    pub fn ensure_active(&self, address: Address, field: &str) -> Result<&Account, ProviderError> {
        let account = self.active_account()?;
        if account.address != address {
            return Err(ProviderError::invalid_params(format!(
                "{field} should be same as current account address"
            )));
        }
        Ok(account)
    }

    pub fn is_connected(&self) -> bool {
        self.site.as_ref().is_some_and(|s| s.is_connected)
    }
}
