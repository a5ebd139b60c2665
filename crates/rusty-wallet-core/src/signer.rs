use std::sync::Arc;

use alloy::primitives::{normalize_v, uint, Address, PrimitiveSignature, B256, U256};
use serde_json::Value;

use crate::domain::{
    Account, ExecutionEnv, KeyringHandle, KeyringSignature, SignOptions, SignedTransaction,
    TransactionParams, TypedDataVersion,
};
use crate::error::{ProviderError, SignatureComponent};
use crate::ports::{AccountPort, DiagnosticsPort, KeyringPort};
use crate::tx_builder::{self, TransactionObject};

/// secp256k1 group order.
const SECP256K1_N: U256 =
    uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    Signed(SignedTransaction),
    Broadcast(B256),
    Initiated(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignResult {
    pub keyring_type: String,
    pub outcome: SignOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSignature {
    pub keyring_type: String,
    pub signature: String,
}

pub struct SigningOrchestrator {
    keyring: Arc<dyn KeyringPort>,
    accounts: Arc<dyn AccountPort>,
    diagnostics: Arc<dyn DiagnosticsPort>,
}

impl SigningOrchestrator {
    pub fn new(
        keyring: Arc<dyn KeyringPort>,
        accounts: Arc<dyn AccountPort>,
        diagnostics: Arc<dyn DiagnosticsPort>,
    ) -> Self {
        Self {
            keyring,
            accounts,
            diagnostics,
        }
    }

    /// Re-reads the active account and refuses anything but an exact match.
    pub fn resolve_signer(&self, address: Address) -> Result<Account, ProviderError> {
        let current = self
            .accounts
            .current_account()?
            .ok_or_else(|| ProviderError::invalid_params("no active account"))?;
        if current.address != address {
            tracing::warn!(
                requested = %address,
                active = %current.address,
                "refusing to sign for an inactive account"
            );
            return Err(ProviderError::invalid_params(
                "from address does not match the current account",
            ));
        }
        Ok(current)
    }

    pub async fn keyring_for(&self, account: &Account) -> Result<KeyringHandle, ProviderError> {
        Ok(self
            .keyring
            .keyring_for_account(account.address, account.kind)
            .await?)
    }

    /// `approved` is the account the user approved with; multi-party signers
    /// get an execution environment bound to it rather than to the caller.
    pub async fn sign_transaction(
        &self,
        approved: &Account,
        params: &TransactionParams,
        extra: Value,
    ) -> Result<SignResult, ProviderError> {
        let current = self.resolve_signer(params.from)?;
        let params = &tx_builder::normalize(params)?;
        let tx = tx_builder::build(params)?;
        let handle = self.keyring_for(&current).await?;

        let execution_env = current
            .kind
            .requires_execution_env()
            .then(|| ExecutionEnv {
                account: approved.address,
                kind: approved.kind,
                chain_id: params.chain_id,
            });
        let opts = SignOptions {
            execution_env,
            extra,
        };

        let signature = self
            .keyring
            .sign_transaction(&handle, &tx, params.from, &opts)
            .await?;
        let outcome = match signature {
            KeyringSignature::Initiated(value) => {
                tracing::info!(from = %params.from, "multi-party signing flow initiated");
                SignOutcome::Initiated(value)
            }
            KeyringSignature::Broadcast(hash) => SignOutcome::Broadcast(hash),
            KeyringSignature::Rsv { r, s, v } => {
                SignOutcome::Signed(self.assemble(&handle, &tx, params, r, s, v))
            }
        };
        Ok(SignResult {
            keyring_type: handle.keyring_type,
            outcome,
        })
    }

    pub async fn sign_personal_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<MessageSignature, ProviderError> {
        let current = self.resolve_signer(address)?;
        let handle = self.keyring_for(&current).await?;
        let signature = self
            .keyring
            .sign_personal_message(&handle, address, message)
            .await?;
        Ok(MessageSignature {
            keyring_type: handle.keyring_type,
            signature,
        })
    }

    pub async fn sign_typed_data(
        &self,
        address: Address,
        data: &Value,
        version: TypedDataVersion,
    ) -> Result<MessageSignature, ProviderError> {
        let current = self.resolve_signer(address)?;
        let handle = self.keyring_for(&current).await?;
        let signature = self
            .keyring
            .sign_typed_message(&handle, address, data, version)
            .await?;
        Ok(MessageSignature {
            keyring_type: handle.keyring_type,
            signature,
        })
    }

    pub async fn encryption_public_key(&self, address: Address) -> Result<String, ProviderError> {
        let current = self.resolve_signer(address)?;
        let handle = self.keyring_for(&current).await?;
        Ok(self.keyring.encryption_public_key(&handle, address).await?)
    }

    /// Rebuilds the signed transaction from `{r, s, v}` and self-verifies it.
    /// A bad signature is reported, never fatal.
    fn assemble(
        &self,
        handle: &KeyringHandle,
        tx: &TransactionObject,
        params: &TransactionParams,
        r: U256,
        s: U256,
        v: u64,
    ) -> SignedTransaction {
        let parity = normalize_v(v);
        let signature = PrimitiveSignature::new(r, s, parity.unwrap_or_default());
        if let Some(component) = verify_signature(tx, params.from, r, s, v) {
            let err = ProviderError::SignatureInvalid {
                component,
                keyring_type: handle.keyring_type.clone(),
            };
            tracing::warn!(
                %err,
                from = %params.from,
                "signed transaction failed self-verification"
            );
            self.diagnostics.capture(&err);
        }
        let (raw, hash) = tx.encode_signed(signature);
        SignedTransaction {
            tx: params.clone(),
            r,
            s,
            v,
            raw,
            hash,
        }
    }
}

/// Returns the first failing component, if any.
pub fn verify_signature(
    tx: &TransactionObject,
    expected: Address,
    r: U256,
    s: U256,
    v: u64,
) -> Option<SignatureComponent> {
    if r.is_zero() || r >= SECP256K1_N {
        return Some(SignatureComponent::R);
    }
    // homestead rule: s must sit in the lower half of the curve order
    if s.is_zero() || s > SECP256K1_N >> 1 {
        return Some(SignatureComponent::S);
    }
    let Some(parity) = normalize_v(v) else {
        return Some(SignatureComponent::V);
    };
    if v >= 35 && !tx.is_fee_market() && (v - 35) / 2 != tx.chain_id() {
        return Some(SignatureComponent::V);
    }
    let signature = PrimitiveSignature::new(r, s, parity);
    match signature.recover_address_from_prehash(&tx.signature_hash()) {
        Ok(recovered) if recovered == expected => None,
        _ => Some(SignatureComponent::Signature),
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Bytes;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    use super::*;

    fn params(from: Address) -> TransactionParams {
        TransactionParams {
            from,
            to: Some(Address::repeat_byte(0x22)),
            value: U256::from(1u64),
            data: Bytes::new(),
            gas: 21_000,
            gas_price: None,
            max_fee_per_gas: Some(20),
            max_priority_fee_per_gas: Some(2),
            nonce: 0,
            chain_id: 1,
            is_send: true,
            is_speed_up: false,
            is_cancel: false,
        }
    }

    #[test]
    fn valid_signature_verifies_and_tampering_is_attributed() {
        let signer = PrivateKeySigner::random();
        let tx = tx_builder::build(&params(signer.address())).expect("build");
        let sig = signer
            .sign_hash_sync(&tx.signature_hash())
            .expect("sign");
        let v = u64::from(sig.v());
        assert_eq!(verify_signature(&tx, signer.address(), sig.r(), sig.s(), v), None);

        assert_eq!(
            verify_signature(&tx, signer.address(), U256::ZERO, sig.s(), v),
            Some(SignatureComponent::R)
        );
        assert_eq!(
            verify_signature(&tx, signer.address(), sig.r(), SECP256K1_N - U256::from(1u64), v),
            Some(SignatureComponent::S)
        );
        assert_eq!(
            verify_signature(&tx, signer.address(), sig.r(), sig.s(), 5),
            Some(SignatureComponent::V)
        );
        assert_eq!(
            verify_signature(&tx, Address::repeat_byte(0x99), sig.r(), sig.s(), v),
            Some(SignatureComponent::Signature)
        );
    }
}
