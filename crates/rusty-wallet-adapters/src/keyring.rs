use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::dyn_abi::{DynSolType, TypedData};
use alloy::primitives::{hex, keccak256, Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use serde_json::Value;

use rusty_wallet_core::ports::{KeyringPort, PortError};
use rusty_wallet_core::tx_builder::TransactionObject;
use rusty_wallet_core::{
    AccountKind, ExecutionEnv, KeyringHandle, KeyringSignature, SignOptions, TypedDataVersion,
};

#[derive(Debug, Clone)]
enum KeyMaterial {
    Local(PrivateKeySigner),
    /// Keys live elsewhere: multi-party or contract wallets, watch-only.
    External,
}

#[derive(Debug, Clone)]
struct KeyEntry {
    kind: AccountKind,
    material: KeyMaterial,
    encryption_public_key: Option<String>,
}

/// In-process keyring backed by local secp256k1 keys.
#[derive(Debug, Clone, Default)]
pub struct LocalKeyringAdapter {
    keys: Arc<Mutex<HashMap<Address, KeyEntry>>>,
    sign_calls: Arc<AtomicUsize>,
    last_execution_env: Arc<Mutex<Option<ExecutionEnv>>>,
}

impl LocalKeyringAdapter {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Address, KeyEntry>>, PortError> {
        self.keys
            .lock()
            .map_err(|e| PortError::Transport(format!("keyring lock poisoned: {e}")))
    }

    pub fn import_signer(
        &self,
        signer: PrivateKeySigner,
        kind: AccountKind,
    ) -> Result<Address, PortError> {
        let address = signer.address();
        self.lock()?.insert(
            address,
            KeyEntry {
                kind,
                material: KeyMaterial::Local(signer),
                encryption_public_key: None,
            },
        );
        Ok(address)
    }

    pub fn import_private_key(
        &self,
        hex_key: &str,
        kind: AccountKind,
    ) -> Result<Address, PortError> {
        let signer: PrivateKeySigner = hex_key
            .trim()
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid private key: {e}")))?;
        self.import_signer(signer, kind)
    }

    pub fn register_external(&self, address: Address, kind: AccountKind) -> Result<(), PortError> {
        self.lock()?.insert(
            address,
            KeyEntry {
                kind,
                material: KeyMaterial::External,
                encryption_public_key: None,
            },
        );
        Ok(())
    }

    pub fn set_encryption_public_key(
        &self,
        address: Address,
        key: impl Into<String>,
    ) -> Result<(), PortError> {
        let mut keys = self.lock()?;
        let entry = keys
            .get_mut(&address)
            .ok_or_else(|| PortError::NotFound(format!("no keyring for {address}")))?;
        entry.encryption_public_key = Some(key.into());
        Ok(())
    }

    /// Number of signing operations performed, across all kinds.
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Environment handed to the most recent multi-party signing call.
    pub fn last_execution_env(&self) -> Option<ExecutionEnv> {
        self.last_execution_env.lock().ok().and_then(|e| e.clone())
    }

    fn entry(&self, address: Address) -> Result<KeyEntry, PortError> {
        self.lock()?
            .get(&address)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("no keyring for {address}")))
    }

    fn local_signer(&self, address: Address) -> Result<PrivateKeySigner, PortError> {
        match self.entry(address)?.material {
            KeyMaterial::Local(signer) => Ok(signer),
            KeyMaterial::External => Err(PortError::Policy(format!(
                "{address} has no local key material"
            ))),
        }
    }

    fn sign_digest(&self, address: Address, digest: B256) -> Result<PrimitiveSignature, PortError> {
        let signer = self.local_signer(address)?;
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        signer
            .sign_hash_sync(&digest)
            .map_err(|e| PortError::Transport(format!("signing failed: {e}")))
    }
}

#[async_trait]
impl KeyringPort for LocalKeyringAdapter {
    async fn keyring_for_account(
        &self,
        address: Address,
        kind: AccountKind,
    ) -> Result<KeyringHandle, PortError> {
        let entry = self.entry(address)?;
        if entry.kind != kind {
            return Err(PortError::Validation(format!(
                "{address} is registered as {}, not {}",
                entry.kind.keyring_type(),
                kind.keyring_type()
            )));
        }
        if entry.kind == AccountKind::WatchAddress {
            return Err(PortError::Policy(format!("{address} is watch-only")));
        }
        Ok(KeyringHandle {
            keyring_type: entry.kind.keyring_type().to_owned(),
            address,
        })
    }

    async fn sign_transaction(
        &self,
        handle: &KeyringHandle,
        tx: &TransactionObject,
        from: Address,
        opts: &SignOptions,
    ) -> Result<KeyringSignature, PortError> {
        let entry = self.entry(from)?;
        if entry.kind.requires_execution_env() {
            let env = opts.execution_env.as_ref().ok_or_else(|| {
                PortError::Validation(format!(
                    "{} accounts need an execution environment",
                    handle.keyring_type
                ))
            })?;
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_execution_env.lock() {
                *last = Some(env.clone());
            }
            tracing::info!(
                account = %env.account,
                chain_id = env.chain_id,
                "multi-party proposal created"
            );
            return Ok(KeyringSignature::Initiated(serde_json::json!({
                "account": env.account,
                "chainId": env.chain_id,
                "safeTxHash": tx.signature_hash(),
            })));
        }

        if !tx.is_fee_market() {
            eip155_v(tx.chain_id(), true)?;
        }
        let sig = self.sign_digest(from, tx.signature_hash())?;
        // legacy transactions carry the EIP-155 replay-protected v
        let v = if tx.is_fee_market() {
            u64::from(sig.v())
        } else {
            eip155_v(tx.chain_id(), sig.v())?
        };
        Ok(KeyringSignature::Rsv {
            r: sig.r(),
            s: sig.s(),
            v,
        })
    }

    async fn sign_personal_message(
        &self,
        _handle: &KeyringHandle,
        address: Address,
        message: &[u8],
    ) -> Result<String, PortError> {
        let signer = self.local_signer(address)?;
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let sig = signer
            .sign_message_sync(message)
            .map_err(|e| PortError::Transport(format!("signing failed: {e}")))?;
        Ok(hex::encode_prefixed(sig.as_bytes()))
    }

    async fn sign_typed_message(
        &self,
        _handle: &KeyringHandle,
        address: Address,
        data: &Value,
        version: TypedDataVersion,
    ) -> Result<String, PortError> {
        let digest = match version {
            TypedDataVersion::V1 => legacy_typed_data_hash(data)?,
            TypedDataVersion::V3 | TypedDataVersion::V4 => {
                let typed: TypedData = serde_json::from_value(data.clone())
                    .map_err(|e| PortError::Validation(format!("invalid typed data: {e}")))?;
                typed
                    .eip712_signing_hash()
                    .map_err(|e| PortError::Validation(format!("typed data hashing failed: {e}")))?
            }
        };
        let sig = self.sign_digest(address, digest)?;
        Ok(hex::encode_prefixed(sig.as_bytes()))
    }

    async fn encryption_public_key(
        &self,
        _handle: &KeyringHandle,
        address: Address,
    ) -> Result<String, PortError> {
        self.entry(address)?
            .encryption_public_key
            .ok_or(PortError::NotImplemented("encryption key not provisioned"))
    }
}

/// EIP-155 `v` for a legacy signature: `chain_id * 2 + 35 + parity`.
fn eip155_v(chain_id: u64, parity: bool) -> Result<u64, PortError> {
    chain_id
        .checked_mul(2)
        .and_then(|v| v.checked_add(35 + u64::from(parity)))
        .ok_or_else(|| {
            PortError::Validation(format!("chain id {chain_id} is out of EIP-155 range"))
        })
}

/// Pre-EIP-712 hash over `[{type, name, value}]`:
/// `keccak256(keccak256(packed "type name"...) ++ keccak256(packed values))`.
pub fn legacy_typed_data_hash(data: &Value) -> Result<B256, PortError> {
    let fields = data
        .as_array()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| {
            PortError::Validation("typed data v1 must be a non-empty array".to_owned())
        })?;
    let mut schema = Vec::new();
    let mut values = Vec::new();
    for field in fields {
        let ty = field_str(field, "type")?;
        let name = field_str(field, "name")?;
        schema.extend_from_slice(format!("{ty} {name}").as_bytes());

        let sol_type = DynSolType::parse(ty)
            .map_err(|e| PortError::Validation(format!("unsupported type {ty}: {e}")))?;
        let text = match field.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => return Err(PortError::Validation(format!("field {name} has no value"))),
        };
        let value = sol_type
            .coerce_str(&text)
            .map_err(|e| PortError::Validation(format!("invalid value for {name}: {e}")))?;
        values.extend_from_slice(&value.abi_encode_packed());
    }
    let mut outer = Vec::with_capacity(64);
    outer.extend_from_slice(keccak256(&schema).as_slice());
    outer.extend_from_slice(keccak256(&values).as_slice());
    Ok(keccak256(outer))
}

fn field_str<'a>(field: &'a Value, key: &str) -> Result<&'a str, PortError> {
    field
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Validation(format!("typed data field missing {key}")))
}
