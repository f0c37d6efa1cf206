//! `WorkerClient`: the scheduler-facing half of the worker protocol (§4.4).
//!
//! Tracks the `initializing -> ready -> executing -> ready|error` state
//! machine. Cancellation is cooperative between nodes but destructive
//! within one: `cancel` swaps the live sandbox handle out from under an
//! in-flight execution and reports the partial result as discarded, never
//! recovered.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{EngineError, Result};
use crate::worker::handles::HandleStore;
use crate::worker::sandbox::{SandboxEvent, ScriptOutcome, ScriptSandbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Initializing,
    Ready,
    Executing,
    Error,
}

const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct WorkerClient {
    state: Mutex<ClientState>,
    sandbox: Arc<dyn ScriptSandbox>,
    pub handles: HandleStore,
    cancel_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl WorkerClient {
    pub fn new(sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self {
            state: Mutex::new(ClientState::Initializing),
            sandbox,
            handles: HandleStore::new(),
            cancel_tx: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ClientState {
        *self.state.lock().await
    }

    /// Sent exactly once on connection. A client must not accept work
    /// before this completes.
    pub async fn initialize(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        *state = ClientState::Ready;
        log::debug!("worker client ready");
        Ok(Vec::new())
    }

    /// Executes a script with the per-message timeout (default 60s,
    /// independent of the script's own `timeout` option which bounds the
    /// sandbox call itself). Rejects the request if the client is not
    /// `ready`. Progress events the sandbox emits while running are
    /// forwarded onto `progress` as they arrive.
    pub async fn execute_script(
        &self,
        code: &str,
        inputs: Value,
        script_timeout: Duration,
        progress: mpsc::Sender<SandboxEvent>,
    ) -> Result<ScriptOutcome> {
        {
            let mut state = self.state.lock().await;
            if *state != ClientState::Ready {
                return Err(EngineError::Validation(
                    "worker client is not in the ready state".to_string(),
                ));
            }
            *state = ClientState::Executing;
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.cancel_tx.lock().await = Some(cancel_tx);

        let message_timeout = DEFAULT_MESSAGE_TIMEOUT.max(script_timeout);
        let exec = self.sandbox.execute(code, inputs, script_timeout, progress);

        let outcome = tokio::select! {
            result = tokio::time::timeout(message_timeout, exec) => {
                match result {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(EngineError::Timeout(format!(
                        "worker did not respond within {:?}",
                        message_timeout
                    ))),
                }
            }
            _ = cancel_rx.changed() => Err(EngineError::WorkerTerminated),
        };

        *self.cancel_tx.lock().await = None;
        let mut state = self.state.lock().await;
        *state = match &outcome {
            Ok(_) => ClientState::Ready,
            Err(EngineError::WorkerTerminated) => ClientState::Initializing,
            Err(_) => ClientState::Error,
        };
        if let Err(err) = &outcome {
            log::warn!("worker execution ended in error: {}", err);
        }
        outcome
    }

    /// If not `executing`, returns `false`. Otherwise atomically swaps the
    /// in-flight execution out, flips to `initializing`, and reports
    /// `true`; the caller is expected to create a new worker for
    /// subsequent work.
    pub async fn cancel(&self) -> bool {
        let is_executing = *self.state.lock().await == ClientState::Executing;
        if !is_executing {
            return false;
        }
        if let Some(tx) = self.cancel_tx.lock().await.take() {
            log::warn!("terminating worker mid-execution");
            let _ = tx.send(true);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::sandbox::ThreadSandbox;

    #[tokio::test]
    async fn initialize_transitions_to_ready() {
        let client = WorkerClient::new(Arc::new(ThreadSandbox::default()));
        assert_eq!(client.state().await, ClientState::Initializing);
        client.initialize().await.unwrap();
        assert_eq!(client.state().await, ClientState::Ready);
    }

    #[tokio::test]
    async fn execute_script_rejected_before_ready() {
        let client = WorkerClient::new(Arc::new(ThreadSandbox::default()));
        let (tx, _rx) = mpsc::channel(1);
        let result = client
            .execute_script("code", Value::Null, Duration::from_secs(1), tx)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_script_returns_to_ready_on_success() {
        let client = WorkerClient::new(Arc::new(ThreadSandbox::default()));
        client.initialize().await.unwrap();
        let (tx, _rx) = mpsc::channel(1);
        client
            .execute_script("code", Value::Null, Duration::from_secs(1), tx)
            .await
            .unwrap();
        assert_eq!(client.state().await, ClientState::Ready);
    }

    #[tokio::test]
    async fn cancel_without_an_in_flight_execution_reports_false() {
        let client = WorkerClient::new(Arc::new(ThreadSandbox::default()));
        client.initialize().await.unwrap();
        assert!(!client.cancel().await);
    }
}
