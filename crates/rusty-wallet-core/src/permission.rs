use std::sync::Arc;

use crate::error::ProviderError;
use crate::ports::PermissionPort;

/// Read-only methods that disclose nothing about the user's accounts.
pub const SAFE_METHODS: &[&str] = &[
    "eth_accounts",
    "eth_blockNumber",
    "eth_call",
    "eth_chainId",
    "eth_coinbase",
    "eth_estimateGas",
    "eth_feeHistory",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getBlockTransactionCountByHash",
    "eth_getBlockTransactionCountByNumber",
    "eth_getCode",
    "eth_getFilterChanges",
    "eth_getFilterLogs",
    "eth_getLogs",
    "eth_getProof",
    "eth_getStorageAt",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getTransactionByBlockNumberAndIndex",
    "eth_getTransactionByHash",
    "eth_getTransactionCount",
    "eth_getTransactionReceipt",
    "eth_getUncleByBlockHashAndIndex",
    "eth_getUncleByBlockNumberAndIndex",
    "eth_getUncleCountByBlockHash",
    "eth_getUncleCountByBlockNumber",
    "eth_maxPriorityFeePerGas",
    "eth_newBlockFilter",
    "eth_newFilter",
    "eth_newPendingTransactionFilter",
    "eth_protocolVersion",
    "eth_requestAccounts",
    "eth_syncing",
    "eth_uninstallFilter",
    "net_listening",
    "net_peerCount",
    "net_version",
    "wallet_getPermissions",
    "wallet_requestPermissions",
    "web3_clientVersion",
    "web3_sha3",
];

pub fn is_safe_method(method: &str) -> bool {
    SAFE_METHODS.contains(&method)
}

#[derive(Clone)]
pub struct PermissionGate {
    store: Arc<dyn PermissionPort>,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn PermissionPort>) -> Self {
        Self { store }
    }

    pub fn authorize(&self, origin: &str, method: &str) -> Result<(), ProviderError> {
        if is_safe_method(method) || self.store.is_internal_origin(origin) {
            return Ok(());
        }
        if self.store.has_permission(origin)? {
            return Ok(());
        }
        tracing::debug!(origin, method, "rejecting call from unconnected origin");
        Err(ProviderError::Unauthorized(format!(
            "origin {origin} is not connected; call eth_requestAccounts first"
        )))
    }
}
