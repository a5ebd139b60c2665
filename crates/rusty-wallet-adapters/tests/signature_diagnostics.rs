mod common;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use rusty_wallet_adapters::{LocalKeyringAdapter, WalletAdapters};
use rusty_wallet_core::chains::ChainEnum;
use rusty_wallet_core::error::SignatureComponent;
use rusty_wallet_core::ports::{KeyringPort, PortError};
use rusty_wallet_core::tx_builder::TransactionObject;
use rusty_wallet_core::{
    AccountKind, KeyringHandle, KeyringSignature, ProviderError, SignOptions, TypedDataVersion,
};

use common::{harness_with_ports, join, test_config, ORIGIN};

/// Returns the mirrored (high) `s` for every transaction signature.
struct HighSKeyring(LocalKeyringAdapter);

fn curve_order() -> U256 {
    U256::from_str_radix(
        "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141",
        16,
    )
    .expect("curve order")
}

#[async_trait]
impl KeyringPort for HighSKeyring {
    async fn keyring_for_account(
        &self,
        address: Address,
        kind: AccountKind,
    ) -> Result<KeyringHandle, PortError> {
        self.0.keyring_for_account(address, kind).await
    }

    async fn sign_transaction(
        &self,
        handle: &KeyringHandle,
        tx: &TransactionObject,
        from: Address,
        opts: &SignOptions,
    ) -> Result<KeyringSignature, PortError> {
        match self.0.sign_transaction(handle, tx, from, opts).await? {
            KeyringSignature::Rsv { r, s, v } => Ok(KeyringSignature::Rsv {
                r,
                s: curve_order() - s,
                v,
            }),
            other => Ok(other),
        }
    }

    async fn sign_personal_message(
        &self,
        handle: &KeyringHandle,
        address: Address,
        message: &[u8],
    ) -> Result<String, PortError> {
        self.0.sign_personal_message(handle, address, message).await
    }

    async fn sign_typed_message(
        &self,
        handle: &KeyringHandle,
        address: Address,
        data: &Value,
        version: TypedDataVersion,
    ) -> Result<String, PortError> {
        self.0.sign_typed_message(handle, address, data, version).await
    }

    async fn encryption_public_key(
        &self,
        handle: &KeyringHandle,
        address: Address,
    ) -> Result<String, PortError> {
        self.0.encryption_public_key(handle, address).await
    }
}

#[tokio::test]
async fn high_s_signature_is_reported_but_still_submitted() {
    let config = test_config();
    let adapters = WalletAdapters::with_config(&config);
    let mut ports = adapters.ports();
    ports.keyring = Arc::new(HighSKeyring(adapters.keyring.clone()));
    let h = harness_with_ports(adapters, &config, ports);
    h.connect(ORIGIN, ChainEnum::Eth);

    let call = h.spawn(ORIGIN, "eth_sendTransaction", json!([h.tx(json!({}))]));
    h.approve_next(json!({})).await;
    join(call).await.expect("submission proceeds");

    let captured = h.adapters.diagnostics.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(
        captured[0],
        ProviderError::SignatureInvalid {
            component: SignatureComponent::S,
            keyring_type: AccountKind::SimpleKeyPair.keyring_type().to_owned(),
        }
    );
    assert_eq!(h.adapters.relay.pushes().expect("pushes").len(), 1);
}
