use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chains::ChainEnum;
use crate::error::ProviderError;

pub type ChainId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

/// One page context talking to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub origin: String,
    #[serde(default)]
    pub connected_chain: Option<ChainId>,
}

impl Session {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            connected_chain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub session: Session,
}

impl RpcRequest {
    pub fn new(session: Session, method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session,
        }
    }

    pub fn origin(&self) -> &str {
        &self.session.origin
    }

    /// Positional parameter, `InvalidParams` when absent.
    pub fn param(&self, index: usize) -> Result<&Value, ProviderError> {
        self.params
            .get(index)
            .ok_or_else(|| ProviderError::invalid_params(format!("missing params[{index}]")))
    }
}

/// Account categories the keyring layer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    SimpleKeyPair,
    HdKeyTree,
    Hardware,
    WatchAddress,
    Gnosis,
    Contract,
}

impl AccountKind {
    pub fn keyring_type(self) -> &'static str {
        match self {
            Self::SimpleKeyPair => "Simple Key Pair",
            Self::HdKeyTree => "HD Key Tree",
            Self::Hardware => "Hardware",
            Self::WatchAddress => "Watch Address",
            Self::Gnosis => "Gnosis",
            Self::Contract => "Contract",
        }
    }

    /// Multi-party and contract-backed accounts sign through an injected
    /// execution environment instead of producing a raw signature.
    pub fn requires_execution_env(self) -> bool {
        matches!(self, Self::Gnosis | Self::Contract)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub kind: AccountKind,
    pub brand_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedSite {
    pub origin: String,
    pub name: String,
    pub icon: String,
    pub chain: ChainEnum,
    pub is_connected: bool,
    pub is_signed: bool,
    pub is_top: bool,
}

impl ConnectedSite {
    pub fn new(origin: impl Into<String>, chain: ChainEnum) -> Self {
        Self {
            origin: origin.into(),
            name: String::new(),
            icon: String::new(),
            chain,
            is_connected: true,
            is_signed: false,
            is_top: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitePatch {
    pub chain: Option<ChainEnum>,
    pub is_connected: Option<bool>,
    pub is_signed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalKind {
    Connect,
    SignTx,
    SignText,
    SignTypedData,
    AddChain,
    AddAsset,
    GetPublicKey,
    Decrypt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiHint {
    pub height: Option<u32>,
    pub min_height: Option<u32>,
}

impl UiHint {
    pub const fn height(height: u32) -> Self {
        Self {
            height: Some(height),
            min_height: None,
        }
    }

    pub const fn min_height(min_height: u32) -> Self {
        Self {
            height: None,
            min_height: Some(min_height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: u64,
    pub origin: String,
    pub kind: ApprovalKind,
    pub params: Value,
    pub ui_hint: UiHint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    Approved(Value),
    Rejected(String),
}

/// Transaction fields after the approval payload has been merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: u64,
    pub chain_id: ChainId,
    #[serde(default)]
    pub is_send: bool,
    #[serde(default)]
    pub is_speed_up: bool,
    #[serde(default)]
    pub is_cancel: bool,
}

impl TransactionParams {
    /// Fee the sender declared per unit of gas, whichever representation is active.
    pub fn declared_fee(&self) -> Option<u128> {
        self.gas_price.or(self.max_fee_per_gas)
    }

    pub fn is_replacement(&self) -> bool {
        self.is_speed_up || self.is_cancel
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub tx: TransactionParams,
    pub r: U256,
    pub s: U256,
    pub v: u64,
    pub raw: Bytes,
    pub hash: B256,
}

impl SignedTransaction {
    /// Body handed to the broadcast collaborator: tx fields plus signature.
    pub fn push_payload(&self) -> Value {
        let mut payload = serde_json::to_value(&self.tx).unwrap_or_else(|_| Value::Null);
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("r".to_owned(), serde_json::json!(self.r));
            obj.insert("s".to_owned(), serde_json::json!(self.s));
            obj.insert("v".to_owned(), serde_json::json!(format!("0x{:x}", self.v)));
            obj.insert("rawTx".to_owned(), serde_json::json!(self.raw));
        }
        payload
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHistoryRecord {
    pub raw_tx: Value,
    pub created_at: TimestampMs,
    pub hash: String,
    pub is_completed: bool,
    pub failed: bool,
    pub is_submit_failed: bool,
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub nonce: u64,
    pub hash: B256,
    pub chain: ChainEnum,
}

/// Key the history and watch sinks use for one sender slot.
pub fn watch_key(from: Address, nonce: u64, chain: ChainEnum) -> String {
    format!("{}_{nonce}_{}", format!("{from:?}").to_lowercase(), chain.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypedDataVersion {
    V1,
    V3,
    V4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningVariant {
    PersonalSign,
    TypedData(TypedDataVersion),
}

impl SigningVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalSign => "personalSign",
            Self::TypedData(TypedDataVersion::V1) => "ethSignTypedData",
            Self::TypedData(TypedDataVersion::V3) => "ethSignTypedDataV3",
            Self::TypedData(TypedDataVersion::V4) => "ethSignTypedDataV4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRecord {
    pub origin: String,
    pub address: Address,
    pub variant: SigningVariant,
    pub payload: Value,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub created_at: TimestampMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLevel {
    pub level: String,
    pub price: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub origin: String,
    pub method: String,
    pub params: Value,
}

/// Opaque reference to the keyring that owns an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringHandle {
    pub keyring_type: String,
    pub address: Address,
}

/// Blockchain connection bound to the approved account, handed to
/// multi-party signers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEnv {
    pub account: Address,
    pub kind: AccountKind,
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignOptions {
    pub execution_env: Option<ExecutionEnv>,
    pub extra: Value,
}

/// What a keyring hands back for a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyringSignature {
    Rsv { r: U256, s: U256, v: u64 },
    /// The backend broadcast the transaction itself.
    Broadcast(B256),
    /// A multi-party flow was started; nothing to broadcast yet.
    Initiated(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_key_is_lowercase() {
        let from: Address = "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266"
            .parse()
            .expect("address");
        assert_eq!(
            watch_key(from, 7, ChainEnum::Eth),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266_7_ETH"
        );
    }
}
