use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{hex, keccak256, B256};
use async_trait::async_trait;
use serde_json::Value;

use rusty_wallet_core::ports::{PortError, RelayPort};
use rusty_wallet_core::{ChainId, GasLevel, RpcCall};

use crate::WalletConfig;

#[derive(Debug, Clone)]
pub struct RelayAdapter {
    mode: RelayMode,
    state: Arc<Mutex<RelayState>>,
    request_id: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
enum RelayMode {
    Disabled(String),
    Deterministic,
    Http(HttpRuntime),
}

#[derive(Debug, Clone)]
struct HttpRuntime {
    base_url: String,
    chain_id: ChainId,
    client: reqwest::Client,
}

impl HttpRuntime {
    /// One upstream serves one chain; anything else is refused.
    fn ensure_chain(&self, chain_id: ChainId) -> Result<(), PortError> {
        if chain_id != self.chain_id {
            return Err(PortError::Policy(format!(
                "relay serves chain {} only, refusing chain {chain_id}",
                self.chain_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct RelayState {
    block_number: u64,
    read_latency_ms: u64,
    gas_levels: Vec<GasLevel>,
    fail_next_push: Option<String>,
    reads: Vec<RpcCall>,
    pushes: Vec<Value>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            block_number: 0x1000,
            read_latency_ms: 0,
            gas_levels: vec![
                GasLevel {
                    level: "slow".to_owned(),
                    price: 1_000_000_000,
                },
                GasLevel {
                    level: "normal".to_owned(),
                    price: 2_000_000_000,
                },
                GasLevel {
                    level: "fast".to_owned(),
                    price: 3_000_000_000,
                },
            ],
            fail_next_push: None,
            reads: Vec::new(),
            pushes: Vec::new(),
        }
    }
}

impl Default for RelayAdapter {
    fn default() -> Self {
        Self::with_config(&WalletConfig::from_env())
    }
}

impl RelayAdapter {
    pub fn deterministic() -> Self {
        Self::from_mode(RelayMode::Deterministic)
    }

    pub fn with_config(config: &WalletConfig) -> Self {
        let mode = match &config.relay_url {
            Some(base_url) => {
                match reqwest::Client::builder()
                    .timeout(Duration::from_millis(config.relay_timeout_ms))
                    .build()
                {
                    Ok(client) => RelayMode::Http(HttpRuntime {
                        base_url: base_url.clone(),
                        chain_id: config.relay_chain_id(),
                        client,
                    }),
                    Err(e) if config.strict_runtime_required() => RelayMode::Disabled(format!(
                        "failed to initialize relay client in production profile: {e}"
                    )),
                    Err(e) => {
                        tracing::warn!(%e, "relay client unavailable, using deterministic relay");
                        RelayMode::Deterministic
                    }
                }
            }
            None if config.strict_runtime_required() => RelayMode::Disabled(
                "relay URL not configured in production runtime profile".to_owned(),
            ),
            None => RelayMode::Deterministic,
        };
        Self::from_mode(mode)
    }

    fn from_mode(mode: RelayMode) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(RelayState::default())),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            RelayMode::Disabled(_) => "disabled",
            RelayMode::Deterministic => "deterministic",
            RelayMode::Http(_) => "http",
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RelayState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))
    }

    pub fn debug_set_read_latency(&self, latency_ms: u64) -> Result<(), PortError> {
        self.lock()?.read_latency_ms = latency_ms;
        Ok(())
    }

    pub fn debug_set_block_number(&self, block_number: u64) -> Result<(), PortError> {
        self.lock()?.block_number = block_number;
        Ok(())
    }

    pub fn debug_set_gas_levels(&self, levels: Vec<GasLevel>) -> Result<(), PortError> {
        self.lock()?.gas_levels = levels;
        Ok(())
    }

    pub fn debug_fail_next_push(&self, reason: impl Into<String>) -> Result<(), PortError> {
        self.lock()?.fail_next_push = Some(reason.into());
        Ok(())
    }

    /// Read calls that reached the deterministic upstream.
    pub fn reads(&self) -> Result<Vec<RpcCall>, PortError> {
        Ok(self.lock()?.reads.clone())
    }

    /// Payloads accepted (or refused) by `push_tx`, in order.
    pub fn pushes(&self) -> Result<Vec<Value>, PortError> {
        Ok(self.lock()?.pushes.clone())
    }

    async fn json_rpc(
        &self,
        runtime: &HttpRuntime,
        method: &str,
        params: Value,
        trace_id: Option<&str>,
    ) -> Result<Value, PortError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::SeqCst),
            "method": method,
            "params": params,
        });
        let mut request = runtime.client.post(&runtime.base_url).json(&body);
        if let Some(trace_id) = trace_id {
            request = request.header("x-trace-id", trace_id);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("relay request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!("relay returned HTTP {status}")));
        }
        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("relay response is not JSON: {e}")))?;
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown relay error");
            return Err(PortError::Validation(message.to_owned()));
        }
        payload
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| PortError::Transport("relay response has no result".to_owned()))
    }

    fn deterministic_read(&self, chain_id: ChainId, call: &RpcCall) -> Result<Value, PortError> {
        let state = self.lock()?;
        Ok(match call.method.as_str() {
            "eth_blockNumber" => Value::String(format!("0x{:x}", state.block_number)),
            "eth_chainId" => Value::String(format!("0x{chain_id:x}")),
            "net_version" => Value::String(chain_id.to_string()),
            "eth_gasPrice" => Value::String(format!(
                "0x{:x}",
                state.gas_levels.iter().map(|l| l.price).max().unwrap_or(0)
            )),
            "eth_getBalance" | "eth_getTransactionCount" => Value::String("0x0".to_owned()),
            "eth_getCode" | "eth_call" => Value::String("0x".to_owned()),
            "eth_sendRawTransaction" => call
                .params
                .get(0)
                .and_then(Value::as_str)
                .and_then(|raw| hex::decode(raw).ok())
                .map(|raw| Value::String(keccak256(raw).to_string()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }
}

#[async_trait]
impl RelayPort for RelayAdapter {
    async fn push_tx(&self, payload: &Value, trace_id: Option<&str>) -> Result<B256, PortError> {
        match &self.mode {
            RelayMode::Disabled(reason) => Err(PortError::Transport(reason.clone())),
            RelayMode::Deterministic => {
                let failure = {
                    let mut state = self.lock()?;
                    state.pushes.push(payload.clone());
                    state.fail_next_push.take()
                };
                if let Some(reason) = failure {
                    return Err(PortError::Transport(reason));
                }
                let raw = payload
                    .get("rawTx")
                    .and_then(Value::as_str)
                    .and_then(|s| hex::decode(s).ok())
                    .ok_or_else(|| PortError::Validation("payload has no rawTx".to_owned()))?;
                Ok(keccak256(raw))
            }
            RelayMode::Http(runtime) => {
                if let Some(chain_id) = payload.get("chainId").and_then(Value::as_u64) {
                    runtime.ensure_chain(chain_id)?;
                }
                let raw = payload
                    .get("rawTx")
                    .cloned()
                    .ok_or_else(|| PortError::Validation("payload has no rawTx".to_owned()))?;
                let result = self
                    .json_rpc(runtime, "eth_sendRawTransaction", Value::Array(vec![raw]), trace_id)
                    .await?;
                result
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        PortError::Transport(format!("relay returned invalid hash {result}"))
                    })
            }
        }
    }

    async fn rpc_read(&self, chain_id: ChainId, call: RpcCall) -> Result<Value, PortError> {
        match &self.mode {
            RelayMode::Disabled(reason) => Err(PortError::Transport(reason.clone())),
            RelayMode::Deterministic => {
                let latency = {
                    let mut state = self.lock()?;
                    state.reads.push(call.clone());
                    state.read_latency_ms
                };
                if latency > 0 {
                    tokio::time::sleep(Duration::from_millis(latency)).await;
                }
                self.deterministic_read(chain_id, &call)
            }
            RelayMode::Http(runtime) => {
                runtime.ensure_chain(chain_id)?;
                tracing::debug!(
                    chain_id,
                    method = %call.method,
                    origin = %call.origin,
                    "relaying read"
                );
                self.json_rpc(runtime, &call.method, call.params, None).await
            }
        }
    }

    async fn gas_market(&self, chain_id: ChainId) -> Result<Vec<GasLevel>, PortError> {
        match &self.mode {
            RelayMode::Disabled(reason) => Err(PortError::Transport(reason.clone())),
            RelayMode::Deterministic => Ok(self.lock()?.gas_levels.clone()),
            RelayMode::Http(runtime) => {
                runtime.ensure_chain(chain_id)?;
                let result = self
                    .json_rpc(runtime, "eth_gasPrice", Value::Array(Vec::new()), None)
                    .await?;
                let price = result
                    .as_str()
                    .and_then(|s| s.strip_prefix("0x"))
                    .and_then(|s| u128::from_str_radix(s, 16).ok())
                    .ok_or_else(|| PortError::Transport(format!("invalid gas price {result}")))?;
                Ok(vec![GasLevel {
                    level: "market".to_owned(),
                    price,
                }])
            }
        }
    }
}
