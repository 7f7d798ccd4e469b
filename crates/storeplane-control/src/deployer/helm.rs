//! Child-process deployer driving `helm` and `kubectl`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::error::{ControlError, ControlResult};

use super::{Deployer, PodPhase, ReleaseSpec};

/// Limit for calls that have no caller-supplied timeout.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured output of a finished command.
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
}

/// Deployer that shells out to `helm` and `kubectl`.
///
/// Every invocation passes `--kubeconfig` explicitly so the control plane
/// never picks up a stray context from its environment.
#[derive(Debug, Clone)]
pub struct HelmDeployer {
    helm_bin: PathBuf,
    kubectl_bin: PathBuf,
    kubeconfig: PathBuf,
}

impl HelmDeployer {
    /// Create a deployer from cluster configuration.
    #[must_use]
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            helm_bin: config.helm_bin.clone(),
            kubectl_bin: config.kubectl_bin.clone(),
            kubeconfig: config.kubeconfig.clone(),
        }
    }

    fn kubeconfig(&self) -> String {
        self.kubeconfig.to_string_lossy().into_owned()
    }

    fn install_args(&self, spec: &ReleaseSpec) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_owned(),
            "--install".to_owned(),
            spec.release.clone(),
            spec.chart.to_string_lossy().into_owned(),
            "--kubeconfig".to_owned(),
            self.kubeconfig(),
            "--namespace".to_owned(),
            spec.namespace.clone(),
            "--create-namespace".to_owned(),
            "--values".to_owned(),
            spec.values_file.to_string_lossy().into_owned(),
        ];
        for (key, value) in &spec.values {
            args.push("--set".to_owned());
            args.push(format!("{key}={value}"));
        }
        args
    }

    fn uninstall_args(&self, namespace: &str, release: &str) -> Vec<String> {
        vec![
            "uninstall".to_owned(),
            release.to_owned(),
            "--namespace".to_owned(),
            namespace.to_owned(),
            "--kubeconfig".to_owned(),
            self.kubeconfig(),
        ]
    }

    fn delete_namespace_args(&self, namespace: &str) -> Vec<String> {
        vec![
            "delete".to_owned(),
            "namespace".to_owned(),
            namespace.to_owned(),
            "--kubeconfig".to_owned(),
            self.kubeconfig(),
        ]
    }

    fn phase_args(&self, namespace: &str, selector: &str) -> Vec<String> {
        vec![
            "get".to_owned(),
            "pods".to_owned(),
            "--namespace".to_owned(),
            namespace.to_owned(),
            "--selector".to_owned(),
            selector.to_owned(),
            "--output".to_owned(),
            "jsonpath={.items[*].status.phase}".to_owned(),
            "--kubeconfig".to_owned(),
            self.kubeconfig(),
        ]
    }
}

/// Run a command to completion, killing it if it outlives `limit`.
async fn run(
    program: &Path,
    args: &[String],
    operation: &'static str,
    limit: Duration,
) -> ControlResult<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ControlError::deployment(format!("failed to spawn {}: {e}", program.display()))
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stdout) = stdout {
            stdout.read_to_string(&mut buf).await.ok();
        }
        buf
    });

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            stderr.read_to_string(&mut buf).await.ok();
        }
        buf
    });

    debug!(operation, program = %program.display(), "running command");
    let start = Instant::now();

    let status = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(ControlError::deployment(format!("{operation} process error: {e}")));
        }
        Err(_) => {
            child.kill().await.ok();
            return Err(ControlError::Timeout { operation, limit });
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    debug!(
        operation,
        duration_ms = start.elapsed().as_millis(),
        exit_code = status.code(),
        "command finished"
    );

    if !status.success() {
        let exit_code = status.code().unwrap_or(-1);
        let detail = stderr.trim();
        return Err(ControlError::deployment(if detail.is_empty() {
            format!("{operation} exited with code {exit_code}")
        } else {
            format!("{operation} exited with code {exit_code}: {detail}")
        }));
    }

    Ok(CommandOutput { stdout, stderr })
}

#[async_trait]
impl Deployer for HelmDeployer {
    async fn deploy(&self, spec: &ReleaseSpec, limit: Duration) -> ControlResult<()> {
        let output = run(
            &self.helm_bin,
            &self.install_args(spec),
            "helm upgrade --install",
            limit,
        )
        .await?;

        if !output.stderr.trim().is_empty() {
            warn!(release = %spec.release, stderr = %output.stderr.trim(), "helm reported warnings");
        }
        Ok(())
    }

    async fn teardown(&self, namespace: &str, release: &str) -> ControlResult<()> {
        run(
            &self.helm_bin,
            &self.uninstall_args(namespace, release),
            "helm uninstall",
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .map(drop)
    }

    async fn delete_namespace(&self, namespace: &str) -> ControlResult<()> {
        run(
            &self.kubectl_bin,
            &self.delete_namespace_args(namespace),
            "kubectl delete namespace",
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .map(drop)
    }

    async fn query_phase(&self, namespace: &str, selector: &str) -> ControlResult<PodPhase> {
        let output = run(
            &self.kubectl_bin,
            &self.phase_args(namespace, selector),
            "kubectl get pods",
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .map_err(|e| ControlError::probe(e.to_string()))?;

        Ok(PodPhase::aggregate(&output.stdout))
    }
}
