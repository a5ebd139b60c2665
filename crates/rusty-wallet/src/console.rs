use std::io::{BufRead, Write};

use serde_json::Value;

use rusty_wallet_adapters::ApprovalQueueAdapter;
use rusty_wallet_core::ApprovalRequest;

/// Resolves queued approvals from the terminal until the task is aborted.
pub async fn serve_approvals(queue: ApprovalQueueAdapter, auto_approve: bool) {
    loop {
        let request = match queue.next_pending().await {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(%e, "approval queue unavailable");
                return;
            }
        };

        let approved = auto_approve || prompt(&request).await;
        let resolved = if approved {
            queue.approve(request.id, Value::Object(Default::default()))
        } else {
            queue.reject(request.id, "rejected from console")
        };
        if let Err(e) = resolved {
            // the caller may have gone away while the prompt was open
            tracing::warn!(%e, id = request.id, "approval could not be delivered");
        }
    }
}

async fn prompt(request: &ApprovalRequest) -> bool {
    let summary = format!(
        "[{:?}] {} asks for approval #{}\n  params: {}\napprove? [y/N] ",
        request.kind, request.origin, request.id, request.params
    );
    let answer = tokio::task::spawn_blocking(move || {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(summary.as_bytes());
        let _ = stderr.flush();
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await;

    match answer {
        Ok(Ok(line)) => matches!(line.trim(), "y" | "Y" | "yes"),
        Ok(Err(e)) => {
            tracing::warn!(%e, "failed to read approval answer, rejecting");
            false
        }
        Err(e) => {
            tracing::warn!(%e, "approval prompt task failed, rejecting");
            false
        }
    }
}
