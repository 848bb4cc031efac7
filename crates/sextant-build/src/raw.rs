//! Thin wrapper around the external build tool
//!
//! The analyzer never inspects build rules itself; it shells out to the
//! Buck-style build tool that owns the repository and consumes its JSON
//! output. Everything above this module talks to the [`RawCommand`] trait
//! so tests can substitute canned output for a live tool.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

use sextant_config::ToolVersion;

/// How many trailing lines of tool diagnostics are retained on failure
pub const LOG_TAIL_LINE_COUNT: usize = 100;

/// The external tool failed.
///
/// Carries the full argument vector so the failing invocation can be
/// reproduced from the error alone.
#[derive(Debug, Error)]
#[error("build tool `{executable}` failed: {description}")]
pub struct ToolError {
    pub executable: String,
    pub args: Vec<String>,
    pub description: String,
    /// Absent when the tool was terminated by a signal
    pub exit_code: Option<i32>,
    /// Bounded tail of the tool's diagnostic output
    pub logs: Vec<String>,
}

/// The two command families the build tool exposes
#[async_trait]
pub trait RawCommand: Send + Sync {
    /// Ask the tool a question about targets; returns its JSON answer
    async fn query(
        &self,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Result<String, ToolError>;

    /// Force artifact generation; returns the tool's JSON description of
    /// what was built
    async fn build(
        &self,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Result<String, ToolError>;
}

/// Production implementation spawning the real tool
#[derive(Debug, Clone)]
pub struct RawBuildTool {
    version: ToolVersion,
}

impl RawBuildTool {
    /// Create a wrapper for the given tool version
    pub fn new(version: ToolVersion) -> Self {
        Self { version }
    }

    fn executable(&self) -> &'static str {
        match self.version {
            ToolVersion::V1 => "buck",
            ToolVersion::V2 => "buck2",
        }
    }

    fn assemble_args(
        &self,
        subcommand: &str,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Vec<String> {
        let mut args = Vec::with_capacity(arguments.len() + 4);
        if let Some(prefix) = isolation_prefix {
            match self.version {
                ToolVersion::V1 => args.push(format!("--isolation-prefix={prefix}")),
                ToolVersion::V2 => {
                    args.push("--isolation-dir".to_owned());
                    args.push(prefix.to_owned());
                }
            }
        }
        args.push(subcommand.to_owned());
        if let Some(mode) = mode {
            args.push(mode.to_owned());
        }
        args.extend(arguments.iter().cloned());
        args
    }

    async fn run(
        &self,
        subcommand: &str,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Result<String, ToolError> {
        let executable = self.executable();
        let args = self.assemble_args(subcommand, mode, isolation_prefix, arguments);
        debug!(%executable, ?args, "invoking build tool");

        let spawned = tokio::process::Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                return Err(self.tool_error(args, format!("failed to spawn: {error}"), None, Vec::new()))
            }
        };

        // Drain stderr concurrently so a chatty tool cannot dead-lock on a
        // full pipe while we wait for stdout.
        let mut stderr_stream = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(stream) = stderr_stream.as_mut() {
                let _ = stream.read_to_string(&mut captured).await;
            }
            captured
        });

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(error) => {
                return Err(self.tool_error(args, format!("failed to wait: {error}"), None, Vec::new()))
            }
        };
        let stderr = stderr_task.await.unwrap_or_default();
        let logs = tail_lines(&stderr, LOG_TAIL_LINE_COUNT);

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let (description, exit_code) = match output.status.code() {
                Some(code) => (format!("exited with code {code}"), Some(code)),
                None => ("terminated by signal".to_owned(), None),
            };
            Err(self.tool_error(args, description, exit_code, logs))
        }
    }

    fn tool_error(
        &self,
        args: Vec<String>,
        description: String,
        exit_code: Option<i32>,
        logs: Vec<String>,
    ) -> ToolError {
        ToolError {
            executable: self.executable().to_owned(),
            args,
            description,
            exit_code,
            logs,
        }
    }
}

#[async_trait]
impl RawCommand for RawBuildTool {
    async fn query(
        &self,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Result<String, ToolError> {
        self.run("query", mode, isolation_prefix, arguments).await
    }

    async fn build(
        &self,
        mode: Option<&str>,
        isolation_prefix: Option<&str>,
        arguments: &[String],
    ) -> Result<String, ToolError> {
        self.run("build", mode, isolation_prefix, arguments).await
    }
}

fn tail_lines(text: &str, count: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(|line| line.to_string()).collect()
}
