//! Execution collaborator - the only place a command touches the OS
//!
//! The executor never spawns processes itself. It hands approved command
//! text to a `CommandRunner` and classifies what comes back.

use async_trait::async_trait;
use remedy_shared::RawOutput;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;

/// What happened when the runner tried a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process ran to completion (any exit code)
    Completed(RawOutput),
    /// Process exceeded the bound and was killed
    TimedOut { elapsed_ms: u64 },
    /// Process could not be started
    SpawnFailed(String),
}

/// Runs one command with a time bound
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome;
}

/// Runs commands through a configured shell (`powershell -NoProfile
/// -Command` on Windows, `sh -c` elsewhere)
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<String>,
    max_output_bytes: usize,
}

impl ShellRunner {
    pub fn new(shell: Vec<String>, max_output_bytes: usize) -> Self {
        Self {
            shell,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.shell.clone(), config.max_output_bytes)
    }

    fn build(&self, command: &str) -> Option<Command> {
        let (program, args) = self.shell.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Some(cmd)
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome {
        let Some(mut cmd) = self.build(command) else {
            return RunOutcome::SpawnFailed("no shell configured".to_string());
        };

        info!("RUN: {}", command);
        let start = Instant::now();

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn '{}': {}", command, e);
                return RunOutcome::SpawnFailed(e.to_string());
            }
        };

        // Dropping the wait future drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let exit_code = output.status.code().unwrap_or(-1);
                info!("EXIT {} ({}ms)", exit_code, duration_ms);
                let stdout = truncate_output(&output.stdout, self.max_output_bytes);
                let stderr = truncate_output(&output.stderr, self.max_output_bytes);
                if !stdout.is_empty() {
                    debug!("STDOUT: {}", stdout);
                }
                if !stderr.is_empty() {
                    debug!("STDERR: {}", stderr);
                }
                RunOutcome::Completed(RawOutput {
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms,
                })
            }
            Ok(Err(e)) => {
                warn!("Failed waiting on '{}': {}", command, e);
                RunOutcome::SpawnFailed(e.to_string())
            }
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!("TIMEOUT after {}ms: {}", elapsed_ms, command);
                RunOutcome::TimedOut { elapsed_ms }
            }
        }
    }
}

/// Lossy UTF-8, trimmed, capped at `max_bytes` on a char boundary
fn truncate_output(bytes: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output(b"  hello \n", 100), "hello");
        let long = "é".repeat(10);
        let truncated = truncate_output(long.as_bytes(), 5);
        assert!(truncated.starts_with("éé"));
        assert!(truncated.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn test_empty_shell_fails_to_spawn() {
        let runner = ShellRunner::new(vec![], 1024);
        let outcome = runner.run("echo hi", Duration::from_secs(1)).await;
        assert!(matches!(outcome, RunOutcome::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sh_echo() {
        let runner = ShellRunner::new(vec!["sh".into(), "-c".into()], 1024);
        match runner.run("echo hello", Duration::from_secs(5)).await {
            RunOutcome::Completed(output) => {
                assert_eq!(output.exit_code, 0);
                assert_eq!(output.stdout, "hello");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sh_nonzero_exit() {
        let runner = ShellRunner::new(vec!["sh".into(), "-c".into()], 1024);
        match runner.run("exit 3", Duration::from_secs(5)).await {
            RunOutcome::Completed(output) => assert_eq!(output.exit_code, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sh_timeout() {
        let runner = ShellRunner::new(vec!["sh".into(), "-c".into()], 1024);
        let outcome = runner.run("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(outcome, RunOutcome::TimedOut { .. }));
    }
}
