use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    Account, AccountKind, ApprovalDecision, ApprovalRequest, ChainId, ConnectedSite, GasLevel,
    KeyringHandle, KeyringSignature, RpcCall, SignOptions, SigningRecord, SitePatch,
    TxHistoryRecord, TypedDataVersion, WatchEntry,
};
use crate::error::ProviderError;
use crate::tx_builder::TransactionObject;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Custody of private keys. Only reached after consent.
#[async_trait]
pub trait KeyringPort: Send + Sync {
    async fn keyring_for_account(
        &self,
        address: Address,
        kind: AccountKind,
    ) -> Result<KeyringHandle, PortError>;

    async fn sign_transaction(
        &self,
        handle: &KeyringHandle,
        tx: &TransactionObject,
        from: Address,
        opts: &SignOptions,
    ) -> Result<KeyringSignature, PortError>;

    async fn sign_personal_message(
        &self,
        handle: &KeyringHandle,
        address: Address,
        message: &[u8],
    ) -> Result<String, PortError>;

    async fn sign_typed_message(
        &self,
        handle: &KeyringHandle,
        address: Address,
        data: &Value,
        version: TypedDataVersion,
    ) -> Result<String, PortError>;

    async fn encryption_public_key(
        &self,
        handle: &KeyringHandle,
        address: Address,
    ) -> Result<String, PortError>;
}

pub trait PermissionPort: Send + Sync {
    fn has_permission(&self, origin: &str) -> Result<bool, PortError>;
    fn get_site(&self, origin: &str) -> Result<Option<ConnectedSite>, PortError>;
    fn get_connected_site(&self, origin: &str) -> Result<Option<ConnectedSite>, PortError>;
    fn add_connected_site(&self, site: ConnectedSite) -> Result<(), PortError>;
    fn update_connect_site(
        &self,
        origin: &str,
        patch: SitePatch,
        notify: bool,
    ) -> Result<(), PortError>;
    fn is_internal_origin(&self, origin: &str) -> bool;
}

pub trait AccountPort: Send + Sync {
    fn current_account(&self) -> Result<Option<Account>, PortError>;
}

#[async_trait]
pub trait RelayPort: Send + Sync {
    async fn push_tx(&self, payload: &Value, trace_id: Option<&str>) -> Result<B256, PortError>;
    async fn rpc_read(&self, chain_id: ChainId, call: RpcCall) -> Result<Value, PortError>;
    async fn gas_market(&self, chain_id: ChainId) -> Result<Vec<GasLevel>, PortError>;
}

pub trait HistoryPort: Send + Sync {
    fn add_tx(&self, record: TxHistoryRecord, explain: Option<Value>) -> Result<(), PortError>;
    fn add_submit_failed_transaction(
        &self,
        record: TxHistoryRecord,
        explain: Option<Value>,
    ) -> Result<(), PortError>;
    fn get_explain_cache(&self, key: &str) -> Result<Option<Value>, PortError>;
    fn add_watch(&self, key: &str, entry: WatchEntry) -> Result<(), PortError>;
    fn add_signing_record(&self, record: SigningRecord) -> Result<(), PortError>;
    fn clear_page_state(&self) -> Result<(), PortError>;
}

/// Outcome events. Implementations must never block or fail the caller.
pub trait TelemetryPort: Send + Sync {
    fn report(&self, event: &str, attributes: Value);
}

/// Non-fatal data-quality signals.
pub trait DiagnosticsPort: Send + Sync {
    fn capture(&self, error: &ProviderError);
}

pub trait EventBusPort: Send + Sync {
    fn broadcast_event(&self, name: &str, payload: Value, origin: Option<&str>);
}

pub trait NotifierPort: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Suspends until a human decides. Dropping the pending request (page closed)
/// resolves to `PortError::Cancelled`.
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest)
        -> Result<ApprovalDecision, PortError>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}

/// Every collaborator the controller talks to.
#[derive(Clone)]
pub struct Ports {
    pub keyring: Arc<dyn KeyringPort>,
    pub permission: Arc<dyn PermissionPort>,
    pub accounts: Arc<dyn AccountPort>,
    pub relay: Arc<dyn RelayPort>,
    pub history: Arc<dyn HistoryPort>,
    pub telemetry: Arc<dyn TelemetryPort>,
    pub diagnostics: Arc<dyn DiagnosticsPort>,
    pub events: Arc<dyn EventBusPort>,
    pub notifier: Arc<dyn NotifierPort>,
    pub approval: Arc<dyn ApprovalPort>,
    pub clock: Arc<dyn ClockPort>,
}
