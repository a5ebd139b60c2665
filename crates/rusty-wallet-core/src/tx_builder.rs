//! Chooses the on-chain encoding for an approved transaction.
//!
//! Fee-market (EIP-1559) encoding is used only when both `maxFeePerGas` and
//! `maxPriorityFeePerGas` are present and differ. Everything else is sent as
//! a legacy EIP-155 transaction; when downgrading, `gasPrice` is taken from
//! `maxFeePerGas`.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, PrimitiveSignature, TxKind, B256, U256};
use serde_json::Value;

use crate::domain::{ChainId, TransactionParams};
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hardfork {
    London,
}

/// Chain rules a fee-market transaction is encoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    pub chain_id: ChainId,
    pub hardfork: Hardfork,
}

impl ChainContext {
    pub fn fee_market(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            hardfork: Hardfork::London,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    Legacy {
        gas_price: u128,
    },
    FeeMarket {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

pub fn select_fee_mode(params: &TransactionParams) -> Result<FeeMode, ProviderError> {
    match (
        params.max_fee_per_gas,
        params.max_priority_fee_per_gas,
        params.gas_price,
    ) {
        (Some(max_fee), Some(priority), _) if max_fee != priority => Ok(FeeMode::FeeMarket {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        }),
        // equal fee-market fields and a lone maxFeePerGas both downgrade
        (Some(max_fee), _, _) => Ok(FeeMode::Legacy { gas_price: max_fee }),
        (None, _, Some(gas_price)) => Ok(FeeMode::Legacy { gas_price }),
        (None, _, None) => Err(ProviderError::invalid_params(
            "transaction has neither gasPrice nor maxFeePerGas",
        )),
    }
}

/// Params with exactly one fee representation left populated.
pub fn normalize(params: &TransactionParams) -> Result<TransactionParams, ProviderError> {
    let mut out = params.clone();
    match select_fee_mode(params)? {
        FeeMode::Legacy { gas_price } => {
            out.gas_price = Some(gas_price);
            out.max_fee_per_gas = None;
            out.max_priority_fee_per_gas = None;
        }
        FeeMode::FeeMarket {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            out.gas_price = None;
            out.max_fee_per_gas = Some(max_fee_per_gas);
            out.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionObject {
    Legacy(TxLegacy),
    FeeMarket {
        tx: TxEip1559,
        context: ChainContext,
    },
}

pub fn build(params: &TransactionParams) -> Result<TransactionObject, ProviderError> {
    let to = params.to.map(TxKind::Call).unwrap_or(TxKind::Create);
    Ok(match select_fee_mode(params)? {
        FeeMode::Legacy { gas_price } => TransactionObject::Legacy(TxLegacy {
            chain_id: Some(params.chain_id),
            nonce: params.nonce,
            gas_price,
            gas_limit: params.gas,
            to,
            value: params.value,
            input: params.data.clone(),
        }),
        FeeMode::FeeMarket {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => TransactionObject::FeeMarket {
            tx: TxEip1559 {
                chain_id: params.chain_id,
                nonce: params.nonce,
                gas_limit: params.gas,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to,
                value: params.value,
                input: params.data.clone(),
                ..Default::default()
            },
            context: ChainContext::fee_market(params.chain_id),
        },
    })
}

impl TransactionObject {
    pub fn is_fee_market(&self) -> bool {
        matches!(self, Self::FeeMarket { .. })
    }

    pub fn chain_id(&self) -> ChainId {
        match self {
            Self::Legacy(tx) => tx.chain_id.unwrap_or_default(),
            Self::FeeMarket { context, .. } => context.chain_id,
        }
    }

    /// Digest the keyring signs.
    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::Legacy(tx) => tx.signature_hash(),
            Self::FeeMarket { tx, .. } => tx.signature_hash(),
        }
    }

    /// Raw EIP-2718 bytes and transaction hash once the signature is attached.
    pub fn encode_signed(&self, signature: PrimitiveSignature) -> (Bytes, B256) {
        let envelope: TxEnvelope = match self.clone() {
            Self::Legacy(tx) => tx.into_signed(signature).into(),
            Self::FeeMarket { tx, .. } => tx.into_signed(signature).into(),
        };
        (
            Bytes::from(envelope.encoded_2718()),
            *envelope.tx_hash(),
        )
    }
}

/// Hex (`0x..`) or decimal quantity, as string or JSON number.
pub fn parse_quantity(value: &Value, field: &str) -> Result<U256, ProviderError> {
    let invalid = || ProviderError::invalid_params(format!("invalid quantity for {field}"));
    match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                if hex.is_empty() {
                    return Ok(U256::ZERO);
                }
                U256::from_str_radix(hex, 16).map_err(|_| invalid())
            } else {
                U256::from_str_radix(s, 10).map_err(|_| invalid())
            }
        }
        _ => Err(invalid()),
    }
}

fn optional_quantity(tx: &Value, field: &str) -> Result<Option<U256>, ProviderError> {
    match tx.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_quantity(v, field).map(Some),
    }
}

fn narrow<T: TryFrom<U256>>(value: U256, field: &str) -> Result<T, ProviderError> {
    T::try_from(value)
        .map_err(|_| ProviderError::invalid_params(format!("{field} out of range")))
}

fn parse_address(value: &Value, field: &str) -> Result<Address, ProviderError> {
    value
        .as_str()
        .ok_or_else(|| ProviderError::invalid_params(format!("{field} must be a hex string")))?
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid {field}: {e}")))
}

/// Typed projection of a merged transaction object.
pub fn parse_transaction_params(
    tx: &Value,
    default_chain_id: ChainId,
) -> Result<TransactionParams, ProviderError> {
    let from = parse_address(
        tx.get("from")
            .ok_or_else(|| ProviderError::invalid_params("missing from"))?,
        "from",
    )?;
    let to = match tx.get("to") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_address(v, "to")?),
    };
    let data = match tx.get("data").or_else(|| tx.get("input")) {
        None | Some(Value::Null) => Bytes::new(),
        Some(v) => v
            .as_str()
            .unwrap_or_default()
            .parse()
            .map_err(|e| ProviderError::invalid_params(format!("invalid data: {e}")))?,
    };
    let gas = optional_quantity(tx, "gas")?
        .or(optional_quantity(tx, "gasLimit")?)
        .ok_or_else(|| ProviderError::invalid_params("missing gas"))?;
    let nonce = optional_quantity(tx, "nonce")?
        .ok_or_else(|| ProviderError::invalid_params("missing nonce"))?;
    let chain_id = match optional_quantity(tx, "chainId")? {
        Some(id) => narrow(id, "chainId")?,
        None => default_chain_id,
    };
    let flag = |name: &str| tx.get(name).and_then(Value::as_bool).unwrap_or(false);

    Ok(TransactionParams {
        from,
        to,
        value: optional_quantity(tx, "value")?.unwrap_or_default(),
        data,
        gas: narrow(gas, "gas")?,
        gas_price: optional_quantity(tx, "gasPrice")?
            .map(|v| narrow(v, "gasPrice"))
            .transpose()?,
        max_fee_per_gas: optional_quantity(tx, "maxFeePerGas")?
            .map(|v| narrow(v, "maxFeePerGas"))
            .transpose()?,
        max_priority_fee_per_gas: optional_quantity(tx, "maxPriorityFeePerGas")?
            .map(|v| narrow(v, "maxPriorityFeePerGas"))
            .transpose()?,
        nonce: narrow(nonce, "nonce")?,
        chain_id,
        is_send: flag("isSend"),
        is_speed_up: flag("isSpeedUp"),
        is_cancel: flag("isCancel"),
    })
}
