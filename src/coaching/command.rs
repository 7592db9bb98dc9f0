use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CoachFuture, CoachingRequest, CoachingRequester, CoachingResponse, RuleCoach};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Runs an external analyzer: the request goes to its stdin as JSON and a
/// `CoachingResponse` is read back from stdout. Anything short of a clean
/// exit with parseable output is handed to the fallback requester.
#[derive(Clone)]
pub struct CommandCoach {
    program: String,
    args: Vec<String>,
    fallback: Arc<dyn CoachingRequester>,
}

impl CommandCoach {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            fallback: Arc::new(RuleCoach::new()),
        }
    }

    /// Split a shell-style command line on whitespace. No quoting support.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("analyzer command is empty"))?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn CoachingRequester>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl CoachingRequester for CommandCoach {
    fn analyze(&self, request: CoachingRequest) -> CoachFuture {
        let program = self.program.clone();
        let args = self.args.clone();
        let fallback = Arc::clone(&self.fallback);

        Box::pin(async move {
            match run_analyzer(&program, &args, &request).await {
                Ok(response) => Ok(response),
                Err(err) => {
                    log_warn!(
                        "analyzer '{}' failed ({err:#}); falling back to {} coach",
                        program,
                        fallback.name()
                    );
                    fallback.analyze(request).await
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

async fn run_analyzer(
    program: &str,
    args: &[String],
    request: &CoachingRequest,
) -> Result<CoachingResponse> {
    let payload = serde_json::to_vec(request).context("failed to encode coaching request")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn analyzer {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&payload)
            .await
            .context("failed to write request to analyzer")?;
        // Dropping stdin closes the pipe so the analyzer sees EOF.
    }

    let output = child
        .wait_with_output()
        .await
        .context("analyzer did not complete")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("analyzer exited with {}: {}", output.status, stderr.trim());
    }

    serde_json::from_slice(&output.stdout).context("failed to parse analyzer output")
}
