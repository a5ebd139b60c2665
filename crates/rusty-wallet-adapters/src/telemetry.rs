use std::sync::{Arc, Mutex};

use serde_json::Value;

use rusty_wallet_core::ports::{DiagnosticsPort, EventBusPort, NotifierPort, TelemetryPort};
use rusty_wallet_core::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub payload: Value,
    pub origin: Option<String>,
}

/// Emits outcome events through `tracing` and keeps them for inspection.
///
/// Reporting never fails: a poisoned buffer only loses the in-memory copy.
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetryAdapter {
    reports: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl TracingTelemetryAdapter {
    pub fn reports(&self) -> Vec<RecordedEvent> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn reports_named(&self, name: &str) -> Vec<RecordedEvent> {
        self.reports()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }
}

impl TelemetryPort for TracingTelemetryAdapter {
    fn report(&self, event: &str, attributes: Value) {
        tracing::info!(target: "rusty_wallet::telemetry", event, %attributes, "outcome");
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(RecordedEvent {
                name: event.to_owned(),
                payload: attributes,
                origin: None,
            });
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsAdapter {
    captured: Arc<Mutex<Vec<ProviderError>>>,
}

impl DiagnosticsAdapter {
    pub fn captured(&self) -> Vec<ProviderError> {
        self.captured.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DiagnosticsPort for DiagnosticsAdapter {
    fn capture(&self, error: &ProviderError) {
        tracing::warn!(target: "rusty_wallet::diagnostics", %error, "diagnostic captured");
        if let Ok(mut captured) = self.captured.lock() {
            captured.push(error.clone());
        }
    }
}

/// Fan-out point for `accountsChanged` / `chainChanged`.
#[derive(Debug, Clone, Default)]
pub struct EventBusAdapter {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventBusAdapter {
    pub fn drain_events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventBusPort for EventBusAdapter {
    fn broadcast_event(&self, name: &str, payload: Value, origin: Option<&str>) {
        tracing::debug!(event = name, ?origin, %payload, "broadcast event");
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                name: name.to_owned(),
                payload,
                origin: origin.map(str::to_owned),
            });
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifierAdapter {
    notices: Arc<Mutex<Vec<(String, String)>>>,
}

impl NotifierAdapter {
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl NotifierPort for NotifierAdapter {
    fn notify(&self, title: &str, message: &str) {
        tracing::warn!(title, message, "user notification");
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((title.to_owned(), message.to_owned()));
        }
    }
}
