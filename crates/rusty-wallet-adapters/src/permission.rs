use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use rusty_wallet_core::ports::{PermissionPort, PortError};
use rusty_wallet_core::{ConnectedSite, SitePatch};

/// In-memory site permission store.
#[derive(Debug, Clone, Default)]
pub struct PermissionStoreAdapter {
    sites: Arc<Mutex<HashMap<String, ConnectedSite>>>,
    internal_origins: Arc<HashSet<String>>,
}

impl PermissionStoreAdapter {
    pub fn new(internal_origins: impl IntoIterator<Item = String>) -> Self {
        Self {
            sites: Arc::new(Mutex::new(HashMap::new())),
            internal_origins: Arc::new(internal_origins.into_iter().collect()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ConnectedSite>>, PortError> {
        self.sites
            .lock()
            .map_err(|e| PortError::Transport(format!("permission lock poisoned: {e}")))
    }

    pub fn remove_site(&self, origin: &str) -> Result<Option<ConnectedSite>, PortError> {
        Ok(self.lock()?.remove(origin))
    }

    pub fn sites(&self) -> Result<Vec<ConnectedSite>, PortError> {
        let mut sites: Vec<_> = self.lock()?.values().cloned().collect();
        sites.sort_by(|a, b| a.origin.cmp(&b.origin));
        Ok(sites)
    }
}

impl PermissionPort for PermissionStoreAdapter {
    fn has_permission(&self, origin: &str) -> Result<bool, PortError> {
        Ok(self.lock()?.get(origin).is_some_and(|s| s.is_connected))
    }

    fn get_site(&self, origin: &str) -> Result<Option<ConnectedSite>, PortError> {
        Ok(self.lock()?.get(origin).cloned())
    }

    fn get_connected_site(&self, origin: &str) -> Result<Option<ConnectedSite>, PortError> {
        Ok(self
            .lock()?
            .get(origin)
            .filter(|s| s.is_connected)
            .cloned())
    }

    fn add_connected_site(&self, site: ConnectedSite) -> Result<(), PortError> {
        self.lock()?.insert(site.origin.clone(), site);
        Ok(())
    }

    fn update_connect_site(
        &self,
        origin: &str,
        patch: SitePatch,
        notify: bool,
    ) -> Result<(), PortError> {
        let mut sites = self.lock()?;
        let site = sites
            .get_mut(origin)
            .ok_or_else(|| PortError::NotFound(format!("no site for origin {origin}")))?;
        if let Some(chain) = patch.chain {
            site.chain = chain;
        }
        if let Some(is_connected) = patch.is_connected {
            site.is_connected = is_connected;
        }
        if let Some(is_signed) = patch.is_signed {
            site.is_signed = is_signed;
        }
        if notify {
            tracing::debug!(origin, chain = site.chain.as_str(), "site updated");
        }
        Ok(())
    }

    fn is_internal_origin(&self, origin: &str) -> bool {
        self.internal_origins.contains(origin)
    }
}
