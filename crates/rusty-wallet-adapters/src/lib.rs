pub mod account;
pub mod approval;
pub mod clock;
pub mod config;
pub mod history;
pub mod keyring;
pub mod permission;
pub mod relay;
pub mod telemetry;

use std::sync::Arc;

use rusty_wallet_core::{Ports, ProviderController};

pub use account::ActiveAccountAdapter;
pub use approval::ApprovalQueueAdapter;
pub use clock::SystemClockAdapter;
pub use config::{RuntimeProfile, WalletConfig};
pub use history::HistoryAdapter;
pub use keyring::LocalKeyringAdapter;
pub use permission::PermissionStoreAdapter;
pub use relay::RelayAdapter;
pub use telemetry::{DiagnosticsAdapter, EventBusAdapter, NotifierAdapter, TracingTelemetryAdapter};

/// Concrete adapters behind one controller. Handles stay clonable so the
/// host (UI, tests) can drive approvals and inspect side effects.
#[derive(Clone)]
pub struct WalletAdapters {
    pub keyring: LocalKeyringAdapter,
    pub permission: PermissionStoreAdapter,
    pub accounts: ActiveAccountAdapter,
    pub relay: RelayAdapter,
    pub history: HistoryAdapter,
    pub telemetry: TracingTelemetryAdapter,
    pub diagnostics: DiagnosticsAdapter,
    pub events: EventBusAdapter,
    pub notifier: NotifierAdapter,
    pub approval: ApprovalQueueAdapter,
    pub clock: SystemClockAdapter,
}

impl WalletAdapters {
    pub fn with_config(config: &WalletConfig) -> Self {
        Self {
            keyring: LocalKeyringAdapter::default(),
            permission: PermissionStoreAdapter::new(config.internal_origins.iter().cloned()),
            accounts: ActiveAccountAdapter::default(),
            relay: RelayAdapter::with_config(config),
            history: HistoryAdapter::default(),
            telemetry: TracingTelemetryAdapter::default(),
            diagnostics: DiagnosticsAdapter::default(),
            events: EventBusAdapter::default(),
            notifier: NotifierAdapter::default(),
            approval: ApprovalQueueAdapter::default(),
            clock: SystemClockAdapter,
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            keyring: Arc::new(self.keyring.clone()),
            permission: Arc::new(self.permission.clone()),
            accounts: Arc::new(self.accounts.clone()),
            relay: Arc::new(self.relay.clone()),
            history: Arc::new(self.history.clone()),
            telemetry: Arc::new(self.telemetry.clone()),
            diagnostics: Arc::new(self.diagnostics.clone()),
            events: Arc::new(self.events.clone()),
            notifier: Arc::new(self.notifier.clone()),
            approval: Arc::new(self.approval.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub fn controller(&self, config: &WalletConfig) -> ProviderController {
        ProviderController::new(self.ports(), config.controller_settings())
    }
}

impl Default for WalletAdapters {
    fn default() -> Self {
        Self::with_config(&WalletConfig::from_env())
    }
}
