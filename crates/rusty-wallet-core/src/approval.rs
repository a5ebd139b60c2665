use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::Value;

use crate::chains::{self, ChainEnum, ChainInfo};
use crate::context::CallContext;
use crate::domain::{
    Account, AccountKind, ApprovalDecision, ApprovalKind, ApprovalRequest, ChainId, RpcRequest,
    TransactionParams, UiHint,
};
use crate::error::ProviderError;
use crate::ports::ApprovalPort;
use crate::tx_builder;

/// Outcome of a pre-validator.
#[derive(Debug, Clone, PartialEq)]
pub enum PreCheck {
    Prompt,
    /// Skip the human prompt and proceed as if approved with this payload.
    AutoApprove(Value),
}

pub type PreValidator = fn(&CallContext, &RpcRequest) -> Result<PreCheck, ProviderError>;

#[derive(Clone, Copy)]
pub struct ApprovalSpec {
    pub kind: ApprovalKind,
    pub pre_validator: PreValidator,
    pub ui_hint: UiHint,
}

/// Transaction fields only the approval step may set. Page-supplied copies
/// are dropped before the approved fields are overlaid.
pub const APPROVAL_CONTROL_FIELDS: [&str; 5] =
    ["pushed", "result", "traceId", "isSpeedUp", "isCancel"];

/// Payload produced by one approval; consumed once by the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalResult {
    /// `None` when a pre-validator short-circuited the prompt.
    pub id: Option<u64>,
    /// Chain the origin was on when the approval was granted.
    pub chain_id: ChainId,
    pub value: Value,
}

impl ApprovalResult {
    pub fn was_prompted(&self) -> bool {
        self.id.is_some()
    }

    /// Overlays the approved fields onto the requested transaction without
    /// touching either input. Control fields come from the approval only and
    /// the chain defaults to the one the approval was granted on.
    pub fn project_transaction(&self, requested: &Value) -> Result<TxApproval, ProviderError> {
        let mut merged = requested
            .as_object()
            .cloned()
            .ok_or_else(|| ProviderError::invalid_params("transaction must be an object"))?;
        for field in APPROVAL_CONTROL_FIELDS {
            merged.remove(field);
        }
        if let Some(approved) = self.value.as_object() {
            for (k, v) in approved {
                if !k.starts_with('$') {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        let merged = Value::Object(merged);
        let pushed = self.value.get("pushed").and_then(Value::as_bool).unwrap_or(false);
        let result = self.value.get("result").cloned();
        let trace_id = self
            .value
            .get("traceId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let account = self
            .value
            .get("$account")
            .map(|v| serde_json::from_value::<Account>(v.clone()))
            .transpose()
            .map_err(|e| ProviderError::invalid_params(format!("invalid approved account: {e}")))?;
        let extra = self.value.get("extra").cloned().unwrap_or(Value::Null);

        // an already-pushed approval only needs its result, not parseable tx fields
        let params = if pushed {
            None
        } else {
            Some(tx_builder::parse_transaction_params(&merged, self.chain_id)?)
        };
        Ok(TxApproval {
            params,
            pushed,
            result,
            trace_id,
            account,
            extra,
        })
    }

    /// Plaintext the approval step decrypted.
    pub fn project_decrypt(&self) -> Result<String, ProviderError> {
        self.value
            .get("data")
            .unwrap_or(&self.value)
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ProviderError::Internal("decrypt approval carried no data".to_owned()))
    }

    pub fn project_connect(&self, fallback: ChainEnum) -> ChainEnum {
        self.value
            .get("defaultChain")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxApproval {
    pub params: Option<TransactionParams>,
    pub pushed: bool,
    pub result: Option<Value>,
    pub trace_id: Option<String>,
    pub account: Option<Account>,
    pub extra: Value,
}

pub struct ApprovalGate {
    port: Arc<dyn ApprovalPort>,
    next_id: AtomicU64,
}

impl ApprovalGate {
    pub fn new(port: Arc<dyn ApprovalPort>) -> Self {
        Self {
            port,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn run_pre_validator(
        &self,
        spec: &ApprovalSpec,
        ctx: &CallContext,
        request: &RpcRequest,
    ) -> Result<PreCheck, ProviderError> {
        (spec.pre_validator)(ctx, request)
    }

    pub async fn await_approval(
        &self,
        origin: &str,
        chain_id: ChainId,
        kind: ApprovalKind,
        params: Value,
        ui_hint: UiHint,
    ) -> Result<ApprovalResult, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = ApprovalRequest {
            id,
            origin: origin.to_owned(),
            kind,
            params,
            ui_hint,
        };
        tracing::debug!(id, origin, ?kind, "awaiting user approval");
        match self.port.request_approval(request).await? {
            ApprovalDecision::Approved(value) => {
                tracing::debug!(id, origin, ?kind, "approval granted");
                Ok(ApprovalResult {
                    id: Some(id),
                    chain_id,
                    value,
                })
            }
            ApprovalDecision::Rejected(reason) => {
                tracing::debug!(id, origin, ?kind, %reason, "approval rejected");
                Err(ProviderError::UserRejected(reason))
            }
        }
    }

    /// Pre-validates, then prompts unless the validator short-circuits.
    pub async fn gate(
        &self,
        spec: &ApprovalSpec,
        ctx: &CallContext,
        request: &RpcRequest,
    ) -> Result<ApprovalResult, ProviderError> {
        match self.run_pre_validator(spec, ctx, request)? {
            PreCheck::AutoApprove(value) => Ok(ApprovalResult {
                id: None,
                chain_id: ctx.chain.id,
                value,
            }),
            PreCheck::Prompt => {
                self.await_approval(
                    request.origin(),
                    ctx.chain.id,
                    spec.kind,
                    request.params.clone(),
                    spec.ui_hint,
                )
                .await
            }
        }
    }
}

fn address_param(
    request: &RpcRequest,
    index: usize,
    field: &str,
) -> Result<Address, ProviderError> {
    request
        .param(index)?
        .as_str()
        .ok_or_else(|| ProviderError::invalid_params(format!("{field} must be a hex string")))?
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid {field}: {e}")))
}

pub fn validate_none(_: &CallContext, _: &RpcRequest) -> Result<PreCheck, ProviderError> {
    Ok(PreCheck::Prompt)
}

pub fn validate_connect(ctx: &CallContext, _: &RpcRequest) -> Result<PreCheck, ProviderError> {
    if ctx.is_connected() {
        return Ok(PreCheck::AutoApprove(Value::Null));
    }
    Ok(PreCheck::Prompt)
}

pub fn validate_sign_tx(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    let tx = request.param(0)?;
    let from = tx
        .get("from")
        .ok_or_else(|| ProviderError::invalid_params("missing from"))?;
    let from: Address = from
        .as_str()
        .ok_or_else(|| ProviderError::invalid_params("from must be a hex string"))?
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid from: {e}")))?;
    let account = ctx.ensure_active(from, "from")?;
    if account.kind == AccountKind::WatchAddress {
        return Err(ProviderError::invalid_params(
            "watch-only accounts cannot sign transactions",
        ));
    }
    if let Some(chain_id) = tx.get("chainId").filter(|v| !v.is_null()) {
        let chain_id = tx_builder::parse_quantity(chain_id, "chainId")?;
        if chain_id != alloy::primitives::U256::from(ctx.chain.id) {
            return Err(ProviderError::invalid_params(
                "chainId should be same as current chainId",
            ));
        }
    }
    Ok(PreCheck::Prompt)
}

/// `personal_sign` and typed-data v1: `[message, address]`.
pub fn validate_message_first(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    request.param(0)?;
    let address = address_param(request, 1, "address")?;
    ctx.ensure_active(address, "address")?;
    Ok(PreCheck::Prompt)
}

/// Typed-data v3/v4: `[address, message]`.
pub fn validate_address_first(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    let address = address_param(request, 0, "address")?;
    ctx.ensure_active(address, "address")?;
    request.param(1)?;
    Ok(PreCheck::Prompt)
}

pub fn validate_get_public_key(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    let address = address_param(request, 0, "address")?;
    ctx.ensure_active(address, "address")?;
    Ok(PreCheck::Prompt)
}

/// `eth_decrypt`: `[ciphertext, address]`.
pub fn validate_decrypt(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    request.param(0)?;
    let address = address_param(request, 1, "address")?;
    ctx.ensure_active(address, "address")?;
    Ok(PreCheck::Prompt)
}

/// Chain named by `params[0].chainId` of an add/switch-chain call.
pub fn requested_chain(request: &RpcRequest) -> Result<&'static ChainInfo, ProviderError> {
    let raw = request
        .param(0)?
        .get("chainId")
        .ok_or_else(|| ProviderError::invalid_params("missing chainId"))?;
    let chain_id = match raw {
        Value::String(s) => chains::parse_chain_id(s),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
    .ok_or_else(|| ProviderError::invalid_params("invalid chainId"))?;
    chains::chain_by_id(chain_id)
        .ok_or_else(|| ProviderError::invalid_params(format!("chain {chain_id} is not supported")))
}

pub fn validate_add_chain(
    ctx: &CallContext,
    request: &RpcRequest,
) -> Result<PreCheck, ProviderError> {
    let chain = requested_chain(request)?;
    if ctx.site.as_ref().is_some_and(|s| s.chain == chain.chain) {
        return Ok(PreCheck::AutoApprove(Value::Null));
    }
    Ok(PreCheck::Prompt)
}
