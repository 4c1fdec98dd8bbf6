//! Two-phase submission of manifests to the declarative-resource controller.
//!
//! Every manifest is first submitted with `--dry-run=server`. Only when the
//! controller accepts it is the same manifest applied for real, so validation
//! problems never reach the mutating call and are reported separately from
//! apply failures.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::errors::ControllerError;
use crate::manifest::Manifest;

/// How a manifest is submitted to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    DryRun,
    Apply,
}

/// Which of the two submissions produced an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Validation,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => f.write_str("validation"),
            Self::Apply => f.write_str("apply"),
        }
    }
}

impl From<SubmitMode> for Phase {
    fn from(mode: SubmitMode) -> Self {
        match mode {
            SubmitMode::DryRun => Self::Validation,
            SubmitMode::Apply => Self::Apply,
        }
    }
}

/// Captured result of one controller CLI run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self { success: true, exit_code: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { success: false, exit_code: Some(exit_code), stdout: String::new(), stderr: stderr.into() }
    }
}

/// The external controller command: accepts a manifest and a mode, returns
/// captured output.
#[async_trait]
pub trait ControllerCli: Send + Sync {
    async fn submit(
        &self,
        manifest: &Manifest,
        mode: SubmitMode,
    ) -> Result<CommandOutput, ControllerError>;
}

/// Classification of a non-zero controller exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// A resource with the requested name already exists.
    Conflict,
    Other,
}

/// Decides whether a rejection is a name conflict.
///
/// `kubectl` has no structured conflict signal for this case, so the decision
/// rests on the "already exists" wording in stderr. Keep every caller going
/// through this function so the heuristic can be swapped in one place.
pub fn classify_rejection(stderr: &str) -> Rejection {
    if stderr.to_ascii_lowercase().contains("already exists") {
        Rejection::Conflict
    } else {
        Rejection::Other
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { dry_run_output: String, apply_output: String },
    Conflict { phase: Phase, details: String },
    Failed { phase: Phase, details: String },
}

impl ApplyOutcome {
    pub fn details(&self) -> String {
        match self {
            Self::Applied { dry_run_output, apply_output } => {
                format!("Dry run output: {dry_run_output}\nApply output: {apply_output}")
            }
            Self::Conflict { details, .. } | Self::Failed { details, .. } => details.clone(),
        }
    }
}

/// Validates then applies manifests through a [`ControllerCli`].
#[derive(Clone)]
pub struct ResourceController {
    cli: Arc<dyn ControllerCli>,
}

impl ResourceController {
    pub fn new(cli: Arc<dyn ControllerCli>) -> Self {
        Self { cli }
    }

    pub async fn validate_and_apply(&self, manifest: &Manifest) -> ApplyOutcome {
        let dry_run_output = match self.submit(manifest, SubmitMode::DryRun).await {
            Ok(stdout) => stdout,
            Err(outcome) => return outcome,
        };
        debug!(
            event_name = "controller.dry_run.accepted",
            resource_name = manifest.resource_name(),
            output = %dry_run_output.trim(),
            "dry run accepted manifest"
        );

        let apply_output = match self.submit(manifest, SubmitMode::Apply).await {
            Ok(stdout) => stdout,
            Err(outcome) => return outcome,
        };
        info!(
            event_name = "controller.apply.succeeded",
            resource_name = manifest.resource_name(),
            "manifest applied"
        );

        ApplyOutcome::Applied { dry_run_output, apply_output }
    }

    /// Runs one submission, returning stdout on success or the terminal
    /// outcome for this manifest on failure.
    async fn submit(&self, manifest: &Manifest, mode: SubmitMode) -> Result<String, ApplyOutcome> {
        let phase = Phase::from(mode);

        let output = match self.cli.submit(manifest, mode).await {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    event_name = "controller.invoke.error",
                    resource_name = manifest.resource_name(),
                    phase = %phase,
                    error = %error,
                    "controller invocation failed"
                );
                return Err(ApplyOutcome::Failed {
                    phase,
                    details: format!("Unexpected error: {error}"),
                });
            }
        };

        if output.success {
            return Ok(output.stdout);
        }

        let details = output.stderr.trim().to_string();
        let outcome = match classify_rejection(&output.stderr) {
            Rejection::Conflict => ApplyOutcome::Conflict { phase, details },
            Rejection::Other => ApplyOutcome::Failed { phase, details },
        };
        warn!(
            event_name = "controller.invoke.rejected",
            resource_name = manifest.resource_name(),
            phase = %phase,
            exit_code = output.exit_code,
            conflict = matches!(outcome, ApplyOutcome::Conflict { .. }),
            "controller rejected manifest"
        );
        Err(outcome)
    }
}

/// [`ControllerCli`] backed by `kubectl apply`, with the manifest piped on
/// stdin.
#[derive(Clone, Debug)]
pub struct KubectlCli {
    binary: PathBuf,
    context: Option<String>,
    timeout: Duration,
}

impl KubectlCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { binary: binary.into(), context: None, timeout }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Builds the CLI from configuration, resolving `kubectl` on `PATH` when
    /// no explicit binary is configured.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, ControllerError> {
        let binary = match &config.kubectl_path {
            Some(path) => path.clone(),
            None => which::which("kubectl")
                .map_err(|_| ControllerError::BinaryNotFound("kubectl".to_string()))?,
        };

        let mut cli = Self::new(binary, Duration::from_secs(config.timeout_secs));
        if let Some(context) = &config.context {
            cli = cli.with_context(context.clone());
        }
        Ok(cli)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self, mode: SubmitMode) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.push("apply".to_string());
        if mode == SubmitMode::DryRun {
            args.push("--dry-run=server".to_string());
        }
        args.push("-f".to_string());
        args.push("-".to_string());
        args
    }

    async fn run(&self, document: &str, mode: SubmitMode) -> Result<CommandOutput, ControllerError> {
        let mut child = Command::new(&self.binary)
            .args(self.args(mode))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ControllerError::Spawn { path: self.binary.clone(), source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(document.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ControllerCli for KubectlCli {
    async fn submit(
        &self,
        manifest: &Manifest,
        mode: SubmitMode,
    ) -> Result<CommandOutput, ControllerError> {
        let document = manifest.to_yaml()?;
        debug!(
            event_name = "controller.kubectl.spawn",
            binary = %self.binary.display(),
            mode = ?mode,
            resource_name = manifest.resource_name(),
            "running kubectl"
        );

        tokio::time::timeout(self.timeout, self.run(&document, mode))
            .await
            .map_err(|_| ControllerError::Timeout(self.timeout))?
    }
}
