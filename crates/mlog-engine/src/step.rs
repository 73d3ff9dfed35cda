//! External step invocation.
//!
//! A step is a separate OS process identified by its registry name, called
//! as `<script> <record_id> <auth_token>`. The exit code is the contract:
//! zero means success, anything else leaves the record at its in-progress
//! marker for a later cycle to retry. Stdout is informational only; stderr
//! is captured and surfaced on failure.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use mlog_store::TokenCache;

use crate::error::{EngineError, EngineResult};
use crate::registry::StepSpec;

/// Cap on the stderr excerpt kept for logs.
const STDERR_EXCERPT: usize = 2000;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Typed result of one step execution.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub ok: bool,
    /// Failure context, from stderr or the timeout reason
    pub error: Option<String>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl StepReport {
    fn success(duration: Duration) -> Self {
        Self {
            ok: true,
            error: None,
            timed_out: false,
            duration,
        }
    }

    fn failure(error: String, duration: Duration) -> Self {
        Self {
            ok: false,
            error: Some(error),
            timed_out: false,
            duration,
        }
    }

    fn timeout(limit: Duration) -> Self {
        Self {
            ok: false,
            error: Some(format!("step timed out after {}s", limit.as_secs())),
            timed_out: true,
            duration: limit,
        }
    }
}

/// Step invocation boundary, injected into the engine so tests can stub
/// the external executables.
pub trait StepInvoker: Send + Sync {
    fn invoke<'a>(&'a self, step: &'a StepSpec, record_id: &'a str)
        -> BoxFuture<'a, EngineResult<StepReport>>;
}

/// Production invoker: spawns the step executable as a child process with
/// the shared store session token as its second argument.
pub struct ProcessStepRunner {
    tokens: Arc<TokenCache>,
}

impl ProcessStepRunner {
    pub fn new(tokens: Arc<TokenCache>) -> Self {
        Self { tokens }
    }

    async fn run(&self, step: &StepSpec, record_id: &str) -> EngineResult<StepReport> {
        if !step.script.is_file() {
            return Err(EngineError::MissingExecutable(
                step.script.display().to_string(),
            ));
        }

        let token = self.tokens.get_token().await?;

        let started = Instant::now();
        let child = Command::new(&step.script)
            .arg(record_id)
            .arg(&token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (soft timeout, shutdown) must not leave the
            // process running unattended past its own timeout.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::SpawnFailed(format!("{}: {}", step.name, e)))?;

        // wait_with_output drains stdout and stderr concurrently, so a step
        // writing a large stderr buffer cannot deadlock against us.
        match tokio::time::timeout(step.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let duration = started.elapsed();
                if output.status.success() {
                    debug!(step = step.name, record_id, ?duration, "Step process succeeded");
                    Ok(StepReport::success(duration))
                } else {
                    let stderr: String = String::from_utf8_lossy(&output.stderr)
                        .trim()
                        .chars()
                        .take(STDERR_EXCERPT)
                        .collect();
                    let code = output.status.code();
                    Ok(StepReport::failure(
                        format!(
                            "exit code {}: {}",
                            code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                            stderr
                        ),
                        duration,
                    ))
                }
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => {
                // kill_on_drop already reaped the child when the wait future
                // was dropped by the timeout.
                Ok(StepReport::timeout(step.timeout))
            }
        }
    }
}

impl StepInvoker for ProcessStepRunner {
    fn invoke<'a>(
        &'a self,
        step: &'a StepSpec,
        record_id: &'a str,
    ) -> BoxFuture<'a, EngineResult<StepReport>> {
        Box::pin(self.run(step, record_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use mlog_store::{StoreResult, TokenSource};

    struct StaticToken;

    impl TokenSource for StaticToken {
        fn fetch_token(&self) -> mlog_store::auth::BoxFuture<'_, StoreResult<String>> {
            Box::pin(async { Ok("test-token".to_string()) })
        }
    }

    fn runner() -> ProcessStepRunner {
        ProcessStepRunner::new(Arc::new(TokenCache::new(
            Arc::new(StaticToken),
            Duration::from_secs(60),
        )))
    }

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spec(script: PathBuf, timeout: Duration) -> StepSpec {
        StepSpec {
            name: "test_step",
            script,
            timeout,
        }
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "ok", "exit 0");
        let report = runner()
            .invoke(&spec(script, Duration::from_secs(10)), "AF0001")
            .await
            .unwrap();
        assert!(report.ok);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "fail", "echo probe failed >&2; exit 3");
        let report = runner()
            .invoke(&spec(script, Duration::from_secs(10)), "AF0001")
            .await
            .unwrap();
        assert!(!report.ok);
        assert!(!report.timed_out);
        let error = report.error.unwrap();
        assert!(error.contains("exit code 3"), "{error}");
        assert!(error.contains("probe failed"), "{error}");
    }

    #[tokio::test]
    async fn timeout_kills_the_child_with_a_distinct_reason() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "slow", "sleep 30");
        let report = runner()
            .invoke(&spec(script, Duration::from_millis(200)), "AF0001")
            .await
            .unwrap();
        assert!(!report.ok);
        assert!(report.timed_out);
        assert!(report.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_executable_is_fatal() {
        let result = runner()
            .invoke(
                &spec(PathBuf::from("/nonexistent/step"), Duration::from_secs(1)),
                "AF0001",
            )
            .await;
        assert!(matches!(result, Err(EngineError::MissingExecutable(_))));
    }

    #[tokio::test]
    async fn record_id_and_token_are_passed_as_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            "check_args",
            r#"[ "$1" = "AF0042" ] && [ "$2" = "test-token" ] && exit 0; exit 1"#,
        );
        let report = runner()
            .invoke(&spec(script, Duration::from_secs(10)), "AF0042")
            .await
            .unwrap();
        assert!(report.ok);
    }
}
