use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use rusty_wallet_core::ports::{ApprovalPort, PortError};
use rusty_wallet_core::{ApprovalDecision, ApprovalRequest};

struct Pending {
    request: ApprovalRequest,
    reply: oneshot::Sender<ApprovalDecision>,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<Pending>,
}

/// Removes a still-queued request when its caller stops waiting.
struct PendingGuard {
    state: Arc<Mutex<QueueState>>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let before = state.pending.len();
        state.pending.retain(|p| p.request.id != self.id);
        if state.pending.len() != before {
            tracing::debug!(id = self.id, "caller went away, approval withdrawn");
        }
    }
}

/// Holds approval requests until a UI (or test) resolves them.
///
/// Dropping a pending entry, e.g. when its page closes, wakes the waiting
/// call with `PortError::Cancelled`.
#[derive(Clone, Default)]
pub struct ApprovalQueueAdapter {
    state: Arc<Mutex<QueueState>>,
    arrived: Arc<Notify>,
}

impl ApprovalQueueAdapter {
    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("approval queue lock poisoned: {e}")))
    }

    pub fn pending(&self) -> Result<Vec<ApprovalRequest>, PortError> {
        Ok(self
            .lock()?
            .pending
            .iter()
            .map(|p| p.request.clone())
            .collect())
    }

    /// Waits until at least one request is queued and returns the oldest.
    pub async fn next_pending(&self) -> Result<ApprovalRequest, PortError> {
        loop {
            let arrived = self.arrived.notified();
            let first = self.lock()?.pending.first().map(|p| p.request.clone());
            if let Some(first) = first {
                return Ok(first);
            }
            arrived.await;
        }
    }

    pub fn approve(&self, id: u64, value: Value) -> Result<(), PortError> {
        self.resolve(id, ApprovalDecision::Approved(value))
    }

    pub fn reject(&self, id: u64, reason: impl Into<String>) -> Result<(), PortError> {
        self.resolve(id, ApprovalDecision::Rejected(reason.into()))
    }

    /// Abandons every pending request of `origin`. Returns how many were dropped.
    pub fn close_origin(&self, origin: &str) -> Result<usize, PortError> {
        let mut state = self.lock()?;
        let before = state.pending.len();
        state.pending.retain(|p| p.request.origin != origin);
        let dropped = before - state.pending.len();
        if dropped > 0 {
            tracing::debug!(origin, dropped, "abandoned pending approvals");
        }
        Ok(dropped)
    }

    fn resolve(&self, id: u64, decision: ApprovalDecision) -> Result<(), PortError> {
        let pending = {
            let mut state = self.lock()?;
            let idx = state
                .pending
                .iter()
                .position(|p| p.request.id == id)
                .ok_or_else(|| PortError::NotFound(format!("no pending approval {id}")))?;
            state.pending.remove(idx)
        };
        pending
            .reply
            .send(decision)
            .map_err(|_| PortError::Cancelled(format!("approval {id} is no longer awaited")))
    }
}

#[async_trait]
impl ApprovalPort for ApprovalQueueAdapter {
    async fn request_approval(
        &self,
        request: ApprovalRequest,
    ) -> Result<ApprovalDecision, PortError> {
        let (reply, decision) = oneshot::channel();
        let id = request.id;
        self.lock()?.pending.push(Pending { request, reply });
        let _guard = PendingGuard {
            state: Arc::clone(&self.state),
            id,
        };
        self.arrived.notify_one();
        decision
            .await
            .map_err(|_| PortError::Cancelled(format!("approval {id} was abandoned")))
    }
}

#[cfg(test)]
mod tests {
    use rusty_wallet_core::{ApprovalKind, UiHint};

    use super::*;

    fn request(id: u64, origin: &str) -> ApprovalRequest {
        ApprovalRequest {
            id,
            origin: origin.to_owned(),
            kind: ApprovalKind::SignText,
            params: Value::Null,
            ui_hint: UiHint::default(),
        }
    }

    #[tokio::test]
    async fn approve_reject_and_abandon() {
        let queue = ApprovalQueueAdapter::default();

        let waiting = tokio::spawn({
            let queue = queue.clone();
            async move { queue.request_approval(request(1, "https://a.example")).await }
        });
        let pending = queue.next_pending().await.expect("pending");
        queue.approve(pending.id, serde_json::json!({"ok": true})).expect("approve");
        assert_eq!(
            waiting.await.expect("join").expect("decision"),
            ApprovalDecision::Approved(serde_json::json!({"ok": true}))
        );

        let waiting = tokio::spawn({
            let queue = queue.clone();
            async move { queue.request_approval(request(2, "https://a.example")).await }
        });
        queue.next_pending().await.expect("pending");
        assert_eq!(queue.close_origin("https://a.example").expect("close"), 1);
        assert!(matches!(
            waiting.await.expect("join"),
            Err(PortError::Cancelled(_))
        ));
        assert!(queue.pending().expect("pending").is_empty());
        assert!(matches!(queue.reject(2, "late"), Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn dropped_caller_withdraws_its_request() {
        let queue = ApprovalQueueAdapter::default();

        let waiting = tokio::spawn({
            let queue = queue.clone();
            async move { queue.request_approval(request(3, "https://b.example")).await }
        });
        queue.next_pending().await.expect("pending");
        waiting.abort();
        assert!(waiting.await.expect_err("aborted").is_cancelled());

        assert!(queue.pending().expect("pending").is_empty());
        assert!(matches!(queue.approve(3, Value::Null), Err(PortError::NotFound(_))));
    }
}
