//! JSON-lines replay.
//!
//! Each line is one call: `{"id": 1, "origin": "https://app.example",
//! "method": "eth_chainId", "params": [], "chainId": 1}`. Consecutive lines
//! form a group that is dispatched concurrently; a blank line waits for the
//! group to settle before the next one starts. Responses go to stdout in
//! input order as JSON-RPC envelopes.

use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use rusty_wallet_core::{rpc_response, ProviderController, ProviderError, RpcRequest, Session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayLine {
    #[serde(default)]
    id: Value,
    origin: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    chain_id: Option<u64>,
}

impl ReplayLine {
    fn into_request(self) -> (Value, RpcRequest) {
        let session = Session {
            origin: self.origin,
            connected_chain: self.chain_id,
        };
        (self.id, RpcRequest::new(session, self.method, self.params))
    }
}

type Pending = (Value, JoinHandle<Result<Value, ProviderError>>);

pub async fn replay_file(controller: Arc<ProviderController>, path: &Path) -> eyre::Result<()> {
    let input = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    let mut group: Vec<Pending> = Vec::new();
    let mut dispatched = 0usize;
    for (lineno, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut group).await;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let parsed: ReplayLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(line = lineno + 1, %e, "skipping malformed request");
                continue;
            }
        };
        let (id, request) = parsed.into_request();
        let controller = Arc::clone(&controller);
        group.push((id, tokio::spawn(async move { controller.handle(request).await })));
        dispatched += 1;
    }
    flush(&mut group).await;

    tracing::info!(dispatched, "replay finished");
    Ok(())
}

async fn flush(group: &mut Vec<Pending>) {
    for (id, handle) in group.drain(..) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(ProviderError::Internal(format!("request task failed: {e}"))),
        };
        println!("{}", rpc_response(id, result));
    }
}
