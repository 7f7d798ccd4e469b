//! Deployment invoker for store workloads.
//!
//! The control plane never talks to the cluster API directly. It drives the
//! package manager and cluster tool through the [`Deployer`] trait, which has
//! a child-process implementation and a scripted mock for tests and local
//! runs.

mod helm;

pub use helm::HelmDeployer;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{ClusterConfig, DeployerKind};
use crate::error::{ControlError, ControlResult};

/// Aggregated phase of a store's application pods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    /// At least one pod is running.
    Running,
    /// Pods are scheduled but not running yet.
    Pending,
    /// Pods failed.
    Failed,
    /// Pods ran to completion.
    Succeeded,
    /// No pods reported.
    Unknown,
    /// Any other phase string.
    Other(String),
}

impl PodPhase {
    /// Parse a single pod phase.
    #[must_use]
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Running" => Self::Running,
            "Pending" => Self::Pending,
            "Failed" => Self::Failed,
            "Succeeded" => Self::Succeeded,
            "Unknown" => Self::Unknown,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Aggregate the whitespace separated phases of all matching pods.
    ///
    /// No pods is `Unknown`. Any running pod makes the store `Running`,
    /// otherwise any pending pod makes it `Pending`, otherwise the first
    /// reported phase wins.
    #[must_use]
    pub fn aggregate(phases: &str) -> Self {
        let phases: Vec<_> = phases.split_whitespace().collect();

        if phases.contains(&"Running") {
            return Self::Running;
        }
        if phases.contains(&"Pending") {
            return Self::Pending;
        }
        phases.first().map_or(Self::Unknown, |first| Self::parse(first))
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("Running"),
            Self::Pending => f.write_str("Pending"),
            Self::Failed => f.write_str("Failed"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Unknown => f.write_str("Unknown"),
            Self::Other(phase) => f.write_str(phase),
        }
    }
}

/// A chart release to install or upgrade.
#[derive(Clone)]
pub struct ReleaseSpec {
    /// Release name.
    pub release: String,
    /// Target namespace, created if absent.
    pub namespace: String,
    /// Chart path.
    pub chart: PathBuf,
    /// Values file.
    pub values_file: PathBuf,
    /// `--set` overrides, in order.
    pub values: Vec<(String, String)>,
}

impl ReleaseSpec {
    /// Look up a `--set` override by key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Override values carry generated credentials.
impl fmt::Debug for ReleaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.values.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ReleaseSpec")
            .field("release", &self.release)
            .field("namespace", &self.namespace)
            .field("chart", &self.chart)
            .field("values_file", &self.values_file)
            .field("value_keys", &keys)
            .finish()
    }
}

/// Invokes the external deployment subsystem.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Install or upgrade a release, bounded by `timeout`.
    ///
    /// On timeout the underlying call is aborted and
    /// [`ControlError::Timeout`] returned.
    async fn deploy(&self, spec: &ReleaseSpec, timeout: Duration) -> ControlResult<()>;

    /// Uninstall a release.
    async fn teardown(&self, namespace: &str, release: &str) -> ControlResult<()>;

    /// Delete a namespace and everything in it.
    async fn delete_namespace(&self, namespace: &str) -> ControlResult<()>;

    /// Query the aggregated phase of the pods matching `selector`.
    async fn query_phase(&self, namespace: &str, selector: &str) -> ControlResult<PodPhase>;
}

/// Create a deployer from configuration.
pub fn create_deployer(config: &ClusterConfig) -> Arc<dyn Deployer> {
    match config.deployer {
        DeployerKind::Helm => Arc::new(HelmDeployer::new(config)),
        DeployerKind::Mock => Arc::new(MockDeployer::default()),
    }
}

/// Scripted outcome of a mock deployer call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MockOutcome {
    /// The call succeeds.
    #[default]
    Succeed,
    /// The call fails with the given message.
    Fail(String),
}

impl MockOutcome {
    fn into_result(self) -> ControlResult<()> {
        match self {
            Self::Succeed => Ok(()),
            Self::Fail(msg) => Err(ControlError::deployment(msg)),
        }
    }
}

#[derive(Debug, Default)]
struct MockScript {
    deploy: MockOutcome,
    teardown: MockOutcome,
    delete_namespace: MockOutcome,
    deploy_delay: Duration,
    phases: HashMap<String, PodPhase>,
    phase_errors: HashMap<String, String>,
    deployed: Vec<ReleaseSpec>,
}

/// Mock deployer for testing.
///
/// Every call succeeds unless scripted otherwise; phase queries report
/// `Unknown` for namespaces without a scripted phase.
#[derive(Debug, Default)]
pub struct MockDeployer {
    script: Mutex<MockScript>,
    deploy_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    delete_namespace_calls: AtomicUsize,
    phase_calls: AtomicUsize,
}

impl MockDeployer {
    /// Create a mock where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of `deploy`.
    pub fn set_deploy(&self, outcome: MockOutcome) {
        self.script.lock().deploy = outcome;
    }

    /// Script the outcome of `teardown`.
    pub fn set_teardown(&self, outcome: MockOutcome) {
        self.script.lock().teardown = outcome;
    }

    /// Script the outcome of `delete_namespace`.
    pub fn set_delete_namespace(&self, outcome: MockOutcome) {
        self.script.lock().delete_namespace = outcome;
    }

    /// Make `deploy` take `delay` before completing.
    pub fn set_deploy_delay(&self, delay: Duration) {
        self.script.lock().deploy_delay = delay;
    }

    /// Script the phase reported for a namespace.
    pub fn set_phase(&self, namespace: &str, phase: PodPhase) {
        let mut script = self.script.lock();
        script.phase_errors.remove(namespace);
        script.phases.insert(namespace.to_owned(), phase);
    }

    /// Make phase queries for a namespace fail.
    pub fn fail_phase_query(&self, namespace: &str, message: &str) {
        self.script
            .lock()
            .phase_errors
            .insert(namespace.to_owned(), message.to_owned());
    }

    /// Number of `deploy` calls.
    #[must_use]
    pub fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    /// Number of `teardown` calls.
    #[must_use]
    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_namespace` calls.
    #[must_use]
    pub fn delete_namespace_calls(&self) -> usize {
        self.delete_namespace_calls.load(Ordering::SeqCst)
    }

    /// Number of `query_phase` calls.
    #[must_use]
    pub fn phase_calls(&self) -> usize {
        self.phase_calls.load(Ordering::SeqCst)
    }

    /// Releases passed to `deploy`, in call order.
    #[must_use]
    pub fn deployed(&self) -> Vec<ReleaseSpec> {
        self.script.lock().deployed.clone()
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy(&self, spec: &ReleaseSpec, timeout: Duration) -> ControlResult<()> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);

        let (delay, outcome) = {
            let mut script = self.script.lock();
            script.deployed.push(spec.clone());
            (script.deploy_delay, script.deploy.clone())
        };

        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ControlError::Timeout {
                operation: "helm upgrade --install",
                limit: timeout,
            });
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        outcome.into_result()
    }

    async fn teardown(&self, _namespace: &str, _release: &str) -> ControlResult<()> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().teardown.clone();
        outcome.into_result()
    }

    async fn delete_namespace(&self, _namespace: &str) -> ControlResult<()> {
        self.delete_namespace_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().delete_namespace.clone();
        outcome.into_result()
    }

    async fn query_phase(&self, namespace: &str, _selector: &str) -> ControlResult<PodPhase> {
        self.phase_calls.fetch_add(1, Ordering::SeqCst);

        let script = self.script.lock();
        if let Some(message) = script.phase_errors.get(namespace) {
            return Err(ControlError::probe(message.clone()));
        }
        Ok(script
            .phases
            .get(namespace)
            .cloned()
            .unwrap_or(PodPhase::Unknown))
    }
}
