//! Script sandbox transports.
//!
//! The scripting language's own lexer/parser/sandbox internals are outside
//! this crate's scope — what lives here is the transport that gets a
//! `(code, inputs)` pair to *some* evaluator and a result back, the same
//! spawn-plus-channel shape the teacher uses for external process
//! supervision. `ThreadSandbox` runs the evaluator in-process via a
//! `tokio::task`; `ProcessSandbox` (feature-gated) shells out to a real
//! subprocess, exchanging JSON over stdio.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutcome {
    pub success: bool,
    pub result: Value,
    #[serde(default)]
    pub schematics: Vec<Value>,
    pub execution_time_ms: u64,
}

/// Unsolicited messages a sandbox may emit while a script is running.
#[derive(Debug, Clone)]
pub enum SandboxEvent {
    Progress { message: String, percent: Option<u8> },
}

/// The plug point for "what actually runs the script". Out-of-process
/// concerns (lexing, parsing, per-language sandboxing) live behind this
/// trait, not in this crate.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        code: &str,
        inputs: Value,
        events: mpsc::Sender<SandboxEvent>,
    ) -> std::result::Result<Value, String>;
}

/// An evaluator that echoes its inputs back as the result. Used as the
/// default when no language runtime has been wired in — exercises the full
/// transport (timeout, cancellation, progress) without depending on a
/// particular scripting engine.
pub struct PassthroughEvaluator;

#[async_trait]
impl ScriptEvaluator for PassthroughEvaluator {
    async fn evaluate(
        &self,
        _code: &str,
        inputs: Value,
        _events: mpsc::Sender<SandboxEvent>,
    ) -> std::result::Result<Value, String> {
        Ok(inputs)
    }
}

#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        inputs: Value,
        timeout: Duration,
        progress: mpsc::Sender<SandboxEvent>,
    ) -> Result<ScriptOutcome>;
}

/// Default transport: runs the evaluator on a `tokio::task`, same process.
/// Cancellation is achieved by dropping the `JoinHandle`'s result (the
/// task keeps running to completion but its output is discarded) — true
/// pre-emption of in-process code is not possible without the language
/// runtime's cooperation, which is exactly the internals this crate does
/// not own.
pub struct ThreadSandbox {
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl ThreadSandbox {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl Default for ThreadSandbox {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughEvaluator))
    }
}

#[async_trait]
impl ScriptSandbox for ThreadSandbox {
    async fn execute(
        &self,
        code: &str,
        inputs: Value,
        timeout: Duration,
        progress: mpsc::Sender<SandboxEvent>,
    ) -> Result<ScriptOutcome> {
        let evaluator = self.evaluator.clone();
        let code = code.to_string();
        let started = std::time::Instant::now();

        log::debug!("spawning script execution task");
        let task = tokio::spawn(async move { evaluator.evaluate(&code, inputs, progress).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(result))) => Ok(ScriptOutcome {
                success: true,
                result,
                schematics: Vec::new(),
                execution_time_ms: started.elapsed().as_millis() as u64,
            }),
            Ok(Ok(Err(message))) => Err(EngineError::Script {
                message,
                kind: "ScriptError".to_string(),
                stack: None,
                line: None,
                column: None,
            }),
            Ok(Err(join_err)) => Err(EngineError::Script {
                message: join_err.to_string(),
                kind: "TaskPanic".to_string(),
                stack: None,
                line: None,
                column: None,
            }),
            Err(_elapsed) => {
                log::warn!("script execution timed out after {:?}", timeout);
                Err(EngineError::Timeout(format!(
                    "script did not complete within {:?}",
                    timeout
                )))
            }
        }
    }
}

/// A real-subprocess transport, reusing the spawn-plus-channel idiom used
/// for external process supervision elsewhere in this codebase: the
/// subprocess receives `{code, inputs}` as a JSON line on stdin and is
/// expected to write `{success, result}` as a JSON line on stdout before
/// exiting. Stderr lines are forwarded as progress events.
#[cfg(feature = "process-sandbox")]
pub struct ProcessSandbox {
    pub command: String,
    pub args: Vec<String>,
}

#[cfg(feature = "process-sandbox")]
#[async_trait]
impl ScriptSandbox for ProcessSandbox {
    async fn execute(
        &self,
        code: &str,
        inputs: Value,
        timeout: Duration,
        progress: mpsc::Sender<SandboxEvent>,
    ) -> Result<ScriptOutcome> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::process::Command;

        let started = std::time::Instant::now();
        log::debug!("spawning subprocess sandbox: {} {:?}", self.command, self.args);
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(EngineError::Io)?;

        let payload = serde_json::json!({ "code": code, "inputs": inputs });
        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", payload);
            stdin.write_all(line.as_bytes()).await.map_err(EngineError::Io)?;
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = progress
                        .send(SandboxEvent::Progress { message: line, percent: None })
                        .await;
                }
            });
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Script {
                message: "subprocess produced no stdout".to_string(),
                kind: "TransportError".to_string(),
                stack: None,
                line: None,
                column: None,
            }
        })?;

        let read = async {
            let mut lines = BufReader::new(stdout).lines();
            lines.next_line().await
        };

        match tokio::time::timeout(timeout, read).await {
            Ok(Ok(Some(line))) => {
                let _ = child.kill().await;
                let outcome: Value = serde_json::from_str(&line).map_err(EngineError::Serialization)?;
                Ok(ScriptOutcome {
                    success: outcome
                        .get("success")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                    result: outcome.get("result").cloned().unwrap_or(Value::Null),
                    schematics: Vec::new(),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                })
            }
            Ok(Ok(None)) => {
                let _ = child.kill().await;
                Err(EngineError::WorkerTerminated)
            }
            Ok(Err(err)) => {
                let _ = child.kill().await;
                Err(EngineError::Io(err))
            }
            Err(_elapsed) => {
                let _ = child.kill().await;
                Err(EngineError::Timeout(format!(
                    "subprocess did not respond within {:?}",
                    timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn thread_sandbox_echoes_inputs_by_default() {
        let sandbox = ThreadSandbox::default();
        let (tx, _rx) = mpsc::channel(1);
        let outcome = sandbox
            .execute("ignored", serde_json::json!({"x": 1}), Duration::from_secs(1), tx)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result, serde_json::json!({"x": 1}));
    }

    struct SlowEvaluator;

    #[async_trait]
    impl ScriptEvaluator for SlowEvaluator {
        async fn evaluate(
            &self,
            _code: &str,
            _inputs: Value,
            _events: mpsc::Sender<SandboxEvent>,
        ) -> std::result::Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn thread_sandbox_times_out() {
        let sandbox = ThreadSandbox::new(Arc::new(SlowEvaluator));
        let (tx, _rx) = mpsc::channel(1);
        let result = sandbox
            .execute("ignored", Value::Null, Duration::from_millis(10), tx)
            .await;
        assert!(matches!(result, Err(EngineError::Timeout(_))));
    }

    struct FailingEvaluator;

    #[async_trait]
    impl ScriptEvaluator for FailingEvaluator {
        async fn evaluate(
            &self,
            _code: &str,
            _inputs: Value,
            _events: mpsc::Sender<SandboxEvent>,
        ) -> std::result::Result<Value, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn thread_sandbox_surfaces_script_errors() {
        let sandbox = ThreadSandbox::new(Arc::new(FailingEvaluator));
        let (tx, _rx) = mpsc::channel(1);
        let result = sandbox
            .execute("ignored", Value::Null, Duration::from_secs(1), tx)
            .await;
        assert!(matches!(result, Err(EngineError::Script { .. })));
    }

    struct ProgressReportingEvaluator;

    #[async_trait]
    impl ScriptEvaluator for ProgressReportingEvaluator {
        async fn evaluate(
            &self,
            _code: &str,
            inputs: Value,
            events: mpsc::Sender<SandboxEvent>,
        ) -> std::result::Result<Value, String> {
            events
                .send(SandboxEvent::Progress { message: "halfway".into(), percent: Some(50) })
                .await
                .ok();
            Ok(inputs)
        }
    }

    #[tokio::test]
    async fn progress_events_reach_the_caller_supplied_channel() {
        let sandbox = ThreadSandbox::new(Arc::new(ProgressReportingEvaluator));
        let (tx, mut rx) = mpsc::channel(4);
        sandbox
            .execute("ignored", Value::Null, Duration::from_secs(1), tx)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SandboxEvent::Progress { percent: Some(50), .. }));
    }
}
