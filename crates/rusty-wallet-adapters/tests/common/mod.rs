#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use serde_json::Value;
use tokio::task::JoinHandle;

use rusty_wallet_adapters::{WalletAdapters, WalletConfig};
use rusty_wallet_core::chains::ChainEnum;
use rusty_wallet_core::ports::PermissionPort;
use rusty_wallet_core::{
    Account, AccountKind, ApprovalRequest, ConnectedSite, Ports, ProviderController,
    ProviderError, RpcRequest, Session,
};

pub const ORIGIN: &str = "https://dapp.example";
pub const INTERNAL_ORIGIN: &str = "rusty-wallet://internal";

pub struct Harness {
    pub adapters: WalletAdapters,
    pub controller: Arc<ProviderController>,
    pub account: Account,
    pub signer: PrivateKeySigner,
}

pub fn test_config() -> WalletConfig {
    WalletConfig {
        internal_origins: vec![INTERNAL_ORIGIN.to_owned()],
        ..WalletConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: WalletConfig) -> Harness {
    let adapters = WalletAdapters::with_config(&config);
    let controller = Arc::new(adapters.controller(&config));
    build(adapters, controller)
}

/// Same adapters, but the controller is wired to `ports` (used to swap one
/// port for a test double).
pub fn harness_with_ports(
    adapters: WalletAdapters,
    config: &WalletConfig,
    ports: Ports,
) -> Harness {
    let controller = Arc::new(ProviderController::new(ports, config.controller_settings()));
    build(adapters, controller)
}

fn build(adapters: WalletAdapters, controller: Arc<ProviderController>) -> Harness {
    let signer = PrivateKeySigner::random();
    let address = adapters
        .keyring
        .import_signer(signer.clone(), AccountKind::SimpleKeyPair)
        .expect("import signer");
    let account = Account {
        address,
        kind: AccountKind::SimpleKeyPair,
        brand_name: "Private Key".to_owned(),
    };
    adapters
        .accounts
        .switch_to(Some(account.clone()))
        .expect("activate account");
    Harness {
        adapters,
        controller,
        account,
        signer,
    }
}

impl Harness {
    pub fn address(&self) -> Address {
        self.account.address
    }

    pub fn address_hex(&self) -> String {
        format!("{:?}", self.account.address).to_lowercase()
    }

    pub fn connect(&self, origin: &str, chain: ChainEnum) {
        self.adapters
            .permission
            .add_connected_site(ConnectedSite::new(origin, chain))
            .expect("connect site");
    }

    /// A second local account the user can switch to.
    pub fn add_local_account(&self) -> Account {
        let address = self
            .adapters
            .keyring
            .import_signer(PrivateKeySigner::random(), AccountKind::SimpleKeyPair)
            .expect("import second signer");
        Account {
            address,
            kind: AccountKind::SimpleKeyPair,
            brand_name: "Private Key".to_owned(),
        }
    }

    pub async fn call(
        &self,
        origin: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ProviderError> {
        self.controller
            .handle(RpcRequest::new(Session::new(origin), method, params))
            .await
    }

    pub fn spawn(
        &self,
        origin: &str,
        method: &str,
        params: Value,
    ) -> JoinHandle<Result<Value, ProviderError>> {
        let controller = Arc::clone(&self.controller);
        let request = RpcRequest::new(Session::new(origin), method, params);
        tokio::spawn(async move { controller.handle(request).await })
    }

    pub async fn next_approval(&self) -> ApprovalRequest {
        tokio::time::timeout(Duration::from_secs(5), self.adapters.approval.next_pending())
            .await
            .expect("approval requested in time")
            .expect("pending approval")
    }

    pub async fn approve_next(&self, value: Value) -> ApprovalRequest {
        let request = self.next_approval().await;
        self.adapters
            .approval
            .approve(request.id, value)
            .expect("approve");
        request
    }

    pub fn assert_no_prompt(&self) {
        assert!(
            self.adapters.approval.pending().expect("pending").is_empty(),
            "no approval prompt expected"
        );
    }

    pub fn tx(&self, overrides: Value) -> Value {
        let mut tx = serde_json::json!({
            "from": self.address_hex(),
            "to": "0x2000000000000000000000000000000000000002",
            "value": "0x1",
            "data": "0x",
            "gas": "0x5208",
            "maxFeePerGas": "0x4a817c800",
            "maxPriorityFeePerGas": "0x3b9aca00",
            "nonce": "0x7",
            "chainId": 1,
            "isSend": true
        });
        if let (Some(base), Some(extra)) = (tx.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        tx
    }
}

pub async fn join(
    handle: JoinHandle<Result<Value, ProviderError>>,
) -> Result<Value, ProviderError> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("call settles in time")
        .expect("join call")
}
