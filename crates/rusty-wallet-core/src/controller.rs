use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::Value;

use crate::approval::{self, ApprovalGate, ApprovalResult};
use crate::cache::{self, CacheKey, ResponseCache};
use crate::chains::{self, ChainEnum};
use crate::context::CallContext;
use crate::domain::{ConnectedSite, RpcCall, RpcRequest, SigningVariant, SitePatch};
use crate::error::ProviderError;
use crate::messages::MessageSigner;
use crate::permission::PermissionGate;
use crate::ports::Ports;
use crate::registry::{Handler, MethodRegistry, MethodSpec};
use crate::signer::{SignOutcome, SigningOrchestrator};
use crate::submit::Submitter;

pub const EVENT_SIGN_TRANSACTION: &str = "signTransaction";
pub const EVENT_ACCOUNTS_CHANGED: &str = "accountsChanged";
pub const EVENT_CHAIN_CHANGED: &str = "chainChanged";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub cache_ttl_ms: u64,
    pub max_gas_price_multiplier: u128,
    pub default_chain: ChainEnum,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 2_000,
            max_gas_price_multiplier: 10,
            default_chain: ChainEnum::Eth,
        }
    }
}

/// Entry point for every provider call coming from a page context.
pub struct ProviderController {
    ports: Ports,
    settings: ControllerSettings,
    registry: MethodRegistry,
    permission: PermissionGate,
    approvals: ApprovalGate,
    cache: ResponseCache,
    signer: Arc<SigningOrchestrator>,
    messages: MessageSigner,
    submitter: Submitter,
}

impl ProviderController {
    pub fn new(ports: Ports, settings: ControllerSettings) -> Self {
        Self::with_registry(ports, settings, MethodRegistry::standard())
    }

    pub fn with_registry(
        ports: Ports,
        settings: ControllerSettings,
        registry: MethodRegistry,
    ) -> Self {
        let signer = Arc::new(SigningOrchestrator::new(
            Arc::clone(&ports.keyring),
            Arc::clone(&ports.accounts),
            Arc::clone(&ports.diagnostics),
        ));
        let messages = MessageSigner::new(
            Arc::clone(&signer),
            Arc::clone(&ports.history),
            Arc::clone(&ports.telemetry),
            Arc::clone(&ports.clock),
        );
        let submitter = Submitter::new(
            Arc::clone(&ports.relay),
            Arc::clone(&ports.history),
            Arc::clone(&ports.telemetry),
            Arc::clone(&ports.notifier),
            Arc::clone(&ports.clock),
            settings.max_gas_price_multiplier,
        );
        Self {
            permission: PermissionGate::new(Arc::clone(&ports.permission)),
            approvals: ApprovalGate::new(Arc::clone(&ports.approval)),
            cache: ResponseCache::new(settings.cache_ttl_ms, Arc::clone(&ports.clock)),
            signer,
            messages,
            submitter,
            registry,
            settings,
            ports,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn handle(&self, request: RpcRequest) -> Result<Value, ProviderError> {
        let spec = self.registry.resolve(&request.method);
        tracing::debug!(
            origin = request.origin(),
            method = %request.method,
            "dispatching provider call"
        );
        let result = self.dispatch(&spec, &request).await;
        if let Err(err) = &result {
            tracing::debug!(
                origin = request.origin(),
                method = %request.method,
                code = err.code(),
                %err,
                "provider call failed"
            );
        }
        result
    }

    async fn dispatch(
        &self,
        spec: &MethodSpec,
        request: &RpcRequest,
    ) -> Result<Value, ProviderError> {
        let origin = request.origin();
        if !spec.safe {
            self.permission.authorize(origin, &request.method)?;
        }
        let approval = match &spec.approval {
            Some(approval_spec) => {
                let ctx = self.context(request)?;
                Some(self.approvals.gate(approval_spec, &ctx, request).await?)
            }
            None => None,
        };

        match spec.handler {
            Handler::Accounts => Ok(Value::Array(self.exposed_accounts(request)?)),
            Handler::Coinbase => Ok(self
                .exposed_accounts(request)?
                .into_iter()
                .next()
                .unwrap_or(Value::Null)),
            Handler::ChainId => Ok(Value::String(self.context(request)?.chain.hex.to_owned())),
            Handler::NetVersion => Ok(Value::String(
                self.context(request)?.chain.network.to_owned(),
            )),
            Handler::RequestAccounts => {
                self.connect(request, required(approval)?)?;
                Ok(Value::Array(self.exposed_accounts(request)?))
            }
            Handler::RequestPermissions => {
                self.connect(request, required(approval)?)?;
                self.permissions(request)
            }
            Handler::GetPermissions => self.permissions(request),
            Handler::SendTransaction => self.send_transaction(request, required(approval)?).await,
            Handler::PersonalSign => {
                self.messages
                    .sign(origin, SigningVariant::PersonalSign, &request.params)
                    .await
            }
            Handler::SignTypedData(version) => {
                self.messages
                    .sign(origin, SigningVariant::TypedData(version), &request.params)
                    .await
            }
            Handler::AddChain | Handler::SwitchChain => {
                self.switch_chain(request, &required(approval)?)?;
                Ok(Value::Null)
            }
            Handler::WatchAsset => Err(ProviderError::UnsupportedOperation(
                "wallet_watchAsset is not supported".to_owned(),
            )),
            Handler::GetEncryptionPublicKey => {
                let address = address_at(request, 0)?;
                self.context(request)?.ensure_active(address, "address")?;
                let key = self.signer.encryption_public_key(address).await?;
                Ok(Value::String(key))
            }
            Handler::Decrypt => {
                let approval = required(approval)?;
                let address = address_at(request, 1)?;
                self.context(request)?.ensure_active(address, "address")?;
                Ok(Value::String(approval.project_decrypt()?))
            }
            Handler::Forward => self.forward(request).await,
        }
    }

    /// Fresh snapshot of account and site state for the calling origin.
    fn context(&self, request: &RpcRequest) -> Result<CallContext, ProviderError> {
        let fallback = request
            .session
            .connected_chain
            .and_then(chains::chain_by_id)
            .map(|c| c.chain)
            .unwrap_or(self.settings.default_chain);
        CallContext::read(
            self.ports.accounts.as_ref(),
            self.ports.permission.as_ref(),
            request.origin(),
            fallback,
        )
    }

    fn has_permission(&self, origin: &str) -> Result<bool, ProviderError> {
        Ok(self.ports.permission.is_internal_origin(origin)
            || self.ports.permission.has_permission(origin)?)
    }

    fn exposed_accounts(&self, request: &RpcRequest) -> Result<Vec<Value>, ProviderError> {
        if !self.has_permission(request.origin())? {
            return Ok(Vec::new());
        }
        Ok(self
            .context(request)?
            .account
            .map(|a| vec![Value::String(hex_address(a.address))])
            .unwrap_or_default())
    }

    fn permissions(&self, request: &RpcRequest) -> Result<Value, ProviderError> {
        if !self.has_permission(request.origin())? {
            return Ok(Value::Array(Vec::new()));
        }
        Ok(serde_json::json!([{
            "parentCapability": "eth_accounts",
            "invoker": request.origin(),
            "caveats": [{
                "type": "restrictReturnedAccounts",
                "value": self.exposed_accounts(request)?,
            }],
        }]))
    }

    /// Grants the origin a connected site on the chain picked during approval.
    fn connect(&self, request: &RpcRequest, approval: ApprovalResult) -> Result<(), ProviderError> {
        let origin = request.origin();
        let ctx = self.context(request)?;
        let account = ctx
            .account
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthorized("no account is available".to_owned()))?;
        if !approval.was_prompted() && ctx.is_connected() {
            return Ok(());
        }

        let chain = approval.project_connect(ctx.chain.chain);
        let store = &self.ports.permission;
        if store.get_site(origin)?.is_some() {
            store.update_connect_site(
                origin,
                SitePatch {
                    chain: Some(chain),
                    is_connected: Some(true),
                    is_signed: None,
                },
                true,
            )?;
        } else {
            store.add_connected_site(ConnectedSite::new(origin, chain))?;
        }
        tracing::info!(origin, chain = chain.as_str(), "origin connected");
        self.ports.events.broadcast_event(
            EVENT_ACCOUNTS_CHANGED,
            serde_json::json!([hex_address(account.address)]),
            Some(origin),
        );
        Ok(())
    }

    fn switch_chain(
        &self,
        request: &RpcRequest,
        approval: &ApprovalResult,
    ) -> Result<(), ProviderError> {
        let origin = request.origin();
        let chain = approval::requested_chain(request)?;
        let ctx = self.context(request)?;
        if !approval.was_prompted() && ctx.site.as_ref().is_some_and(|s| s.chain == chain.chain) {
            return Ok(());
        }
        self.ports.permission.update_connect_site(
            origin,
            SitePatch {
                chain: Some(chain.chain),
                ..SitePatch::default()
            },
            true,
        )?;
        tracing::info!(origin, chain = chain.key, "origin switched chain");
        self.ports.events.broadcast_event(
            EVENT_CHAIN_CHANGED,
            serde_json::json!({
                "chain": chain.hex,
                "networkVersion": chain.network,
            }),
            Some(origin),
        );
        Ok(())
    }

    async fn send_transaction(
        &self,
        request: &RpcRequest,
        approval: ApprovalResult,
    ) -> Result<Value, ProviderError> {
        let origin = request.origin();
        let tx = approval.project_transaction(request.param(0)?)?;
        // already broadcast under this approval: at most one sign and push
        if tx.pushed {
            tracing::info!(origin, "approval already pushed, returning prior result");
            return Ok(tx.result.unwrap_or(Value::Null));
        }
        let params = tx
            .params
            .ok_or_else(|| ProviderError::invalid_params("approved transaction has no fields"))?;
        let ctx = self.context(request)?;
        if params.chain_id != approval.chain_id || params.chain_id != ctx.chain.id {
            tracing::warn!(
                origin,
                tx_chain = params.chain_id,
                approved_chain = approval.chain_id,
                current_chain = ctx.chain.id,
                "refusing to sign for a chain the origin is not on"
            );
            return Err(ProviderError::invalid_params(
                "chainId should be same as current chainId",
            ));
        }
        let approved_account = match tx.account {
            Some(account) => account,
            None => ctx.active_account()?.clone(),
        };

        let signed = match self
            .signer
            .sign_transaction(&approved_account, &params, tx.extra)
            .await
        {
            Ok(signed) => signed,
            Err(err) => {
                self.ports.telemetry.report(
                    EVENT_SIGN_TRANSACTION,
                    serde_json::json!({
                        "success": false,
                        "chainId": params.chain_id,
                        "source": origin,
                        "error": err.to_string(),
                    }),
                );
                return Err(err);
            }
        };
        self.ports.telemetry.report(
            EVENT_SIGN_TRANSACTION,
            serde_json::json!({
                "success": true,
                "keyringType": signed.keyring_type,
                "chainId": params.chain_id,
                "source": origin,
            }),
        );

        match signed.outcome {
            SignOutcome::Initiated(_) => Ok(Value::Null),
            SignOutcome::Broadcast(hash) => {
                self.submitter
                    .track_broadcast(origin, &params, hash, &signed.keyring_type);
                Ok(Value::String(hash.to_string()))
            }
            SignOutcome::Signed(signed_tx) => {
                let hash = self
                    .submitter
                    .submit(origin, &signed_tx, &signed.keyring_type, tx.trace_id.as_deref())
                    .await?;
                Ok(Value::String(hash.to_string()))
            }
        }
    }

    async fn forward(&self, request: &RpcRequest) -> Result<Value, ProviderError> {
        let ctx = self.context(request)?;
        let chain_id = ctx.chain.id;
        let call = RpcCall {
            origin: request.origin().to_owned(),
            method: request.method.clone(),
            params: request.params.clone(),
        };
        let relay = Arc::clone(&self.ports.relay);
        if !cache::is_cacheable(&request.method) {
            return Ok(relay.rpc_read(chain_id, call).await?);
        }
        let key = CacheKey::new(
            ctx.account.as_ref().map(|a| a.address),
            chain_id,
            &request.method,
            &request.params,
        );
        self.cache
            .get_or_fetch(key, async move {
                relay
                    .rpc_read(chain_id, call)
                    .await
                    .map_err(ProviderError::from)
            })
            .await
    }
}

fn required(approval: Option<ApprovalResult>) -> Result<ApprovalResult, ProviderError> {
    approval.ok_or_else(|| ProviderError::Internal("handler requires an approval step".to_owned()))
}

fn address_at(request: &RpcRequest, index: usize) -> Result<Address, ProviderError> {
    request
        .param(index)?
        .as_str()
        .ok_or_else(|| ProviderError::invalid_params("address must be a hex string"))?
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid address: {e}")))
}

fn hex_address(address: Address) -> String {
    format!("{address:?}").to_lowercase()
}

/// Wraps a handler outcome in a JSON-RPC 2.0 response envelope.
pub fn rpc_response(id: Value, result: Result<Value, ProviderError>) -> Value {
    match result {
        Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(err) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": err.to_rpc_error() }),
    }
}
