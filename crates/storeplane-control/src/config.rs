//! Configuration for storeplane-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};
use crate::types::StoreType;

/// Admin password shipped as the default.
///
/// Every store deployed with it shares a publicly known credential.
pub const DEFAULT_ADMIN_PASSWORD: &str = "password123";

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Store record storage configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cluster tooling configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Provisioning behaviour configuration.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Reconciliation loop configuration.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Admission control configuration.
    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `storeplane.toml` in the current directory (if present)
    /// 3. Environment variables with `STOREPLANE_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file("storeplane.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STOREPLANE_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the service cannot run with.
    ///
    /// Values that are usable but unwise are logged as warnings.
    pub fn validate(&self) -> ControlResult<()> {
        if self.admission.rate == 0 {
            return Err(ControlError::Config("admission.rate must be positive".into()));
        }
        if self.admission.burst == 0 {
            return Err(ControlError::Config("admission.burst must be positive".into()));
        }
        if self.provisioning.max_concurrent == 0 {
            return Err(ControlError::Config(
                "provisioning.max_concurrent must be positive".into(),
            ));
        }
        if self.reconcile.interval_secs == 0 {
            return Err(ControlError::Config(
                "reconcile.interval_secs must be positive".into(),
            ));
        }

        if !(300..=600).contains(&self.provisioning.timeout_secs) {
            tracing::warn!(
                timeout_secs = self.provisioning.timeout_secs,
                "provisioning timeout outside the advised 300-600s range"
            );
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Origins allowed by CORS. `*` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Clients reach the service over TLS terminated in front of it.
    ///
    /// Enables `Strict-Transport-Security` on every response.
    #[serde(default)]
    pub tls_terminated: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_owned(),
        "http://localhost:3000".to_owned(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            allowed_origins: default_allowed_origins(),
            tls_terminated: false,
        }
    }
}

/// Storage backend for store records.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database at `database.url`.
    #[default]
    Sqlite,
    /// Process memory; records are lost on exit.
    Memory,
}

/// Store record storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://stores.db".to_owned()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: default_database_url(),
        }
    }
}

/// Deployment invoker type.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeployerKind {
    /// `helm` and `kubectl` child processes.
    #[default]
    Helm,
    /// In-process mock that always succeeds.
    Mock,
}

/// Cluster tooling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Deployment invoker type.
    #[serde(default)]
    pub deployer: DeployerKind,

    /// Path to the kubeconfig passed to every tool invocation.
    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: PathBuf,

    /// Helm binary.
    #[serde(default = "default_helm_bin")]
    pub helm_bin: PathBuf,

    /// Kubectl binary.
    #[serde(default = "default_kubectl_bin")]
    pub kubectl_bin: PathBuf,
}

fn default_kubeconfig() -> PathBuf {
    std::env::var_os("KUBECONFIG")
        .filter(|v| !v.is_empty())
        .map_or_else(
            || PathBuf::from(shellexpand::tilde("~/.kube/config").as_ref()),
            PathBuf::from,
        )
}

fn default_helm_bin() -> PathBuf {
    PathBuf::from("helm")
}

fn default_kubectl_bin() -> PathBuf {
    PathBuf::from("kubectl")
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            deployer: DeployerKind::default(),
            kubeconfig: default_kubeconfig(),
            helm_bin: default_helm_bin(),
            kubectl_bin: default_kubectl_bin(),
        }
    }
}

/// Chart override for one store template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    /// Chart path.
    pub chart: Option<PathBuf>,
    /// Values file path.
    pub values_file: Option<PathBuf>,
}

/// Per-template chart overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    /// WooCommerce override.
    #[serde(default)]
    pub woocommerce: TemplateConfig,
    /// Medusa override.
    #[serde(default)]
    pub medusa: TemplateConfig,
}

impl TemplatesConfig {
    const fn get(&self, store_type: StoreType) -> &TemplateConfig {
        match store_type {
            StoreType::WooCommerce => &self.woocommerce,
            StoreType::Medusa => &self.medusa,
        }
    }
}

/// Provisioning behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Suffix of every store hostname.
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Directory holding the default charts.
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,

    /// Per-template chart overrides.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Wall-clock limit for one deployment, in seconds.
    #[serde(default = "default_provision_timeout_secs")]
    pub timeout_secs: u64,

    /// Admin password set on every store.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    /// Maximum provisioning and deletion jobs running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Wait between release uninstall and namespace deletion, in milliseconds.
    #[serde(default = "default_teardown_settle_ms")]
    pub teardown_settle_ms: u64,
}

fn default_domain_suffix() -> String {
    "localhost".to_owned()
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

const fn default_provision_timeout_secs() -> u64 {
    300
}

fn default_admin_password() -> String {
    DEFAULT_ADMIN_PASSWORD.to_owned()
}

const fn default_max_concurrent() -> usize {
    8
}

const fn default_teardown_settle_ms() -> u64 {
    2000
}

impl ProvisioningConfig {
    /// Chart path for a template.
    #[must_use]
    pub fn chart_path(&self, store_type: StoreType) -> PathBuf {
        self.templates
            .get(store_type)
            .chart
            .clone()
            .unwrap_or_else(|| self.charts_dir.join(store_type.as_str()))
    }

    /// Values file for a template.
    #[must_use]
    pub fn values_file(&self, store_type: StoreType) -> PathBuf {
        self.templates
            .get(store_type)
            .values_file
            .clone()
            .unwrap_or_else(|| {
                self.charts_dir
                    .join(store_type.as_str())
                    .join("values-local.yaml")
            })
    }

    /// Deployment timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Teardown settle delay as a duration.
    #[must_use]
    pub const fn teardown_settle(&self) -> Duration {
        Duration::from_millis(self.teardown_settle_ms)
    }

    /// Whether the publicly known default admin password is in use.
    #[must_use]
    pub fn uses_default_admin_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            charts_dir: default_charts_dir(),
            templates: TemplatesConfig::default(),
            timeout_secs: default_provision_timeout_secs(),
            admin_password: default_admin_password(),
            max_concurrent: default_max_concurrent(),
            teardown_settle_ms: default_teardown_settle_ms(),
        }
    }
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
}

const fn default_reconcile_interval_secs() -> u64 {
    30
}

impl ReconcileConfig {
    /// Cycle period as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval_secs(),
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Tokens regained per minute.
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Maximum tokens a client can hold.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Seconds between idle-client sweeps.
    #[serde(default = "default_evict_interval_secs")]
    pub evict_interval_secs: u64,

    /// Seconds without a request before a client is forgotten.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

const fn default_rate() -> u32 {
    20
}

const fn default_burst() -> u32 {
    40
}

const fn default_evict_interval_secs() -> u64 {
    300
}

const fn default_idle_ttl_secs() -> u64 {
    600
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
            evict_interval_secs: default_evict_interval_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ControlConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert!(!config.server.tls_terminated);
        assert_eq!(config.database.backend, StorageBackend::Sqlite);
        assert_eq!(config.cluster.deployer, DeployerKind::Helm);
        assert_eq!(config.provisioning.domain_suffix, "localhost");
        assert_eq!(config.provisioning.timeout(), Duration::from_secs(300));
        assert_eq!(config.provisioning.max_concurrent, 8);
        assert_eq!(config.provisioning.teardown_settle(), Duration::from_secs(2));
        assert_eq!(config.reconcile.interval(), Duration::from_secs(30));
        assert_eq!(config.admission.rate, 20);
        assert_eq!(config.admission.burst, 40);
        assert!(config.provisioning.uses_default_admin_password());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [server]
            listen_addr = "127.0.0.1:9000"
            allowed_origins = ["https://admin.example.com"]
            tls_terminated = true

            [database]
            backend = "memory"

            [cluster]
            deployer = "mock"
            kubeconfig = "/etc/kube/config"

            [provisioning]
            domain_suffix = "shops.example.com"
            timeout_secs = 600
            admin_password = "s3cret-admin"

            [provisioning.templates.medusa]
            chart = "/opt/charts/medusa-prod"

            [reconcile]
            interval_secs = 10

            [admission]
            rate = 60
            burst = 10
        "#;

        let config: ControlConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.server.allowed_origins.len(), 1);
        assert!(config.server.tls_terminated);
        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.cluster.deployer, DeployerKind::Mock);
        assert_eq!(config.cluster.kubeconfig, PathBuf::from("/etc/kube/config"));
        assert_eq!(config.provisioning.domain_suffix, "shops.example.com");
        assert!(!config.provisioning.uses_default_admin_password());
        assert_eq!(config.reconcile.interval_secs, 10);
        assert_eq!(config.admission.rate, 60);
        assert_eq!(config.admission.burst, 10);
        assert_eq!(config.admission.idle_ttl_secs, 600);
    }

    #[test]
    fn chart_paths_prefer_template_overrides() {
        let toml = r#"
            [provisioning]
            charts_dir = "/srv/charts"

            [provisioning.templates.medusa]
            chart = "/opt/medusa"
            values_file = "/opt/medusa/values-prod.yaml"
        "#;
        let config: ControlConfig = toml::from_str(toml).unwrap();
        let p = &config.provisioning;

        assert_eq!(p.chart_path(StoreType::Medusa), PathBuf::from("/opt/medusa"));
        assert_eq!(
            p.values_file(StoreType::Medusa),
            PathBuf::from("/opt/medusa/values-prod.yaml")
        );
        assert_eq!(
            p.chart_path(StoreType::WooCommerce),
            PathBuf::from("/srv/charts/woocommerce")
        );
        assert_eq!(
            p.values_file(StoreType::WooCommerce),
            PathBuf::from("/srv/charts/woocommerce/values-local.yaml")
        );
    }

    #[test]
    fn zero_rate_is_rejected() {
        let config: ControlConfig = toml::from_str("[admission]\nrate = 0").unwrap();
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config: ControlConfig =
            toml::from_str("[provisioning]\nmax_concurrent = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
