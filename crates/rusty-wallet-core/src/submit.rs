use std::sync::Arc;

use alloy::primitives::B256;
use serde_json::Value;

use crate::chains;
use crate::domain::{SignedTransaction, TimestampMs, TransactionParams, TxHistoryRecord, WatchEntry};
use crate::error::ProviderError;
use crate::ports::{ClockPort, HistoryPort, NotifierPort, RelayPort, TelemetryPort};

pub const EVENT_SUBMIT_TRANSACTION: &str = "submitTransaction";

/// Broadcasts signed transactions and keeps history, watches and telemetry
/// in step with the outcome.
pub struct Submitter {
    relay: Arc<dyn RelayPort>,
    history: Arc<dyn HistoryPort>,
    telemetry: Arc<dyn TelemetryPort>,
    notifier: Arc<dyn NotifierPort>,
    clock: Arc<dyn ClockPort>,
    max_gas_price_multiplier: u128,
}

impl Submitter {
    pub fn new(
        relay: Arc<dyn RelayPort>,
        history: Arc<dyn HistoryPort>,
        telemetry: Arc<dyn TelemetryPort>,
        notifier: Arc<dyn NotifierPort>,
        clock: Arc<dyn ClockPort>,
        max_gas_price_multiplier: u128,
    ) -> Self {
        Self {
            relay,
            history,
            telemetry,
            notifier,
            clock,
            max_gas_price_multiplier,
        }
    }

    pub async fn submit(
        &self,
        origin: &str,
        signed: &SignedTransaction,
        keyring_type: &str,
        trace_id: Option<&str>,
    ) -> Result<B256, ProviderError> {
        let pushed = match self.check_gas_price(&signed.tx).await {
            Ok(()) => self
                .relay
                .push_tx(&signed.push_payload(), trace_id)
                .await
                .map_err(|e| ProviderError::SubmitFailed(e.to_string())),
            Err(err) => Err(err),
        };

        match pushed {
            Ok(hash) => {
                self.record_success(
                    origin,
                    &signed.tx,
                    serde_json::json!(signed),
                    hash,
                    keyring_type,
                );
                Ok(hash)
            }
            Err(err) => {
                self.record_failure(origin, signed, keyring_type, &err);
                Err(err)
            }
        }
    }

    /// Bookkeeping for a transaction the signer backend broadcast itself.
    pub fn track_broadcast(
        &self,
        origin: &str,
        params: &TransactionParams,
        hash: B256,
        keyring_type: &str,
    ) {
        self.record_success(origin, params, serde_json::json!(params), hash, keyring_type);
    }

    /// Declared fee must not exceed the fastest market level times the
    /// configured multiplier.
    async fn check_gas_price(&self, tx: &TransactionParams) -> Result<(), ProviderError> {
        let Some(fee) = tx.declared_fee() else {
            return Err(ProviderError::SubmitFailed("transaction declares no fee".to_owned()));
        };
        let levels = match self.relay.gas_market(tx.chain_id).await {
            Ok(levels) => levels,
            Err(err) => {
                tracing::warn!(
                    %err,
                    chain_id = tx.chain_id,
                    "gas market unavailable, skipping fee check"
                );
                return Ok(());
            }
        };
        let Some(highest) = levels.iter().map(|l| l.price).max() else {
            return Ok(());
        };
        if highest > 0 && fee == 0 {
            return Err(ProviderError::SubmitFailed(
                "gas price is zero but the network requires a fee".to_owned(),
            ));
        }
        let ceiling = highest.saturating_mul(self.max_gas_price_multiplier);
        if highest > 0 && fee > ceiling {
            return Err(ProviderError::SubmitFailed(format!(
                "gas price {fee} exceeds allowed maximum {ceiling}"
            )));
        }
        Ok(())
    }

    fn now(&self) -> TimestampMs {
        TimestampMs(self.clock.now_ms().unwrap_or_default())
    }

    fn explain(&self, tx: &TransactionParams) -> Option<Value> {
        let key = explain_key(tx);
        self.history.get_explain_cache(&key).unwrap_or_else(|err| {
            tracing::warn!(%err, key, "explain cache lookup failed");
            None
        })
    }

    fn record_success(
        &self,
        origin: &str,
        tx: &TransactionParams,
        raw_tx: Value,
        hash: B256,
        keyring_type: &str,
    ) {
        let chain = chains::chain_by_id(tx.chain_id).map(|c| c.chain);
        let record = TxHistoryRecord {
            raw_tx,
            created_at: self.now(),
            hash: hash.to_string(),
            is_completed: false,
            failed: false,
            is_submit_failed: false,
            origin: origin.to_owned(),
        };
        // broadcast already happened: bookkeeping failures are logged, never retried
        if let Err(err) = self.history.add_tx(record, self.explain(tx)) {
            tracing::error!(%err, %hash, "failed to record transaction history");
        }
        if let Some(chain) = chain {
            let key = crate::domain::watch_key(tx.from, tx.nonce, chain);
            let entry = WatchEntry {
                nonce: tx.nonce,
                hash,
                chain,
            };
            if let Err(err) = self.history.add_watch(&key, entry) {
                tracing::error!(%err, %hash, "failed to register transaction watch");
            }
        }
        if tx.is_send {
            if let Err(err) = self.history.clear_page_state() {
                tracing::warn!(%err, "failed to clear page state cache");
            }
        }
        tracing::info!(%hash, origin, chain_id = tx.chain_id, "transaction submitted");
        self.telemetry.report(
            EVENT_SUBMIT_TRANSACTION,
            serde_json::json!({
                "success": true,
                "keyringType": keyring_type,
                "chainId": tx.chain_id,
                "source": origin,
                "isSpeedUp": tx.is_speed_up,
                "isCancel": tx.is_cancel,
            }),
        );
    }

    fn record_failure(
        &self,
        origin: &str,
        signed: &SignedTransaction,
        keyring_type: &str,
        err: &ProviderError,
    ) {
        let tx = &signed.tx;
        tracing::warn!(%err, origin, chain_id = tx.chain_id, "transaction submission failed");
        self.telemetry.report(
            EVENT_SUBMIT_TRANSACTION,
            serde_json::json!({
                "success": false,
                "keyringType": keyring_type,
                "chainId": tx.chain_id,
                "source": origin,
                "isSpeedUp": tx.is_speed_up,
                "isCancel": tx.is_cancel,
                "error": err.to_string(),
            }),
        );
        // replacements supersede an existing record instead of adding a failed one
        if !tx.is_replacement() {
            let record = TxHistoryRecord {
                raw_tx: serde_json::json!(signed),
                created_at: self.now(),
                hash: String::new(),
                is_completed: false,
                failed: false,
                is_submit_failed: true,
                origin: origin.to_owned(),
            };
            if let Err(history_err) = self
                .history
                .add_submit_failed_transaction(record, self.explain(tx))
            {
                tracing::error!(%history_err, "failed to record submit failure");
            }
        }
        self.notifier.notify("Transaction push failed", &err.to_string());
    }
}

fn explain_key(tx: &TransactionParams) -> String {
    format!(
        "{}-{}-{}",
        format!("{:?}", tx.from).to_lowercase(),
        tx.chain_id,
        tx.nonce
    )
}
