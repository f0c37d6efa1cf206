//! Best-effort webhook delivery (§4.5, §7): failures are logged and
//! swallowed, never retried, never surfaced to the caller.

use crate::run::Run;

pub async fn deliver(client: &reqwest::Client, url: &str, run: &Run) {
    let body = serde_json::json!({ "run": run });
    match client.post(url).json(&body).send().await {
        Ok(response) if response.status().is_success() => {
            log::debug!("webhook delivered to {} for run {}", url, run.id);
        }
        Ok(response) => {
            log::warn!("webhook to {} for run {} returned {}", url, run.id, response.status());
        }
        Err(err) => {
            log::warn!("webhook to {} for run {} failed: {}", url, run.id, err);
        }
    }
}
