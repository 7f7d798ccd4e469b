//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admission::AdmissionController;
use crate::api;
use crate::config::{ControlConfig, ServerConfig, StorageBackend};
use crate::deployer::{Deployer, create_deployer};
use crate::error::{ControlError, ControlResult};
use crate::health::HealthChecker;
use crate::lifecycle::{DeletionExecutor, ProvisioningExecutor, Reconciler, StoreManager};
use crate::pool::TaskPool;
use crate::store::{MemoryStore, SqliteStore, StoreRepository};

/// The wired components of a control plane.
///
/// Owns the admission controller and the reconciler; their background tasks
/// are started explicitly with [`ControlPlane::start_background`].
pub struct ControlPlane {
    /// Lifecycle entry points.
    pub manager: Arc<StoreManager>,
    /// Store record storage.
    pub repository: Arc<dyn StoreRepository>,
    /// Admission controller.
    pub admission: Arc<AdmissionController>,
    /// Reconciliation loop.
    pub reconciler: Arc<Reconciler>,
    server: ServerConfig,
}

impl ControlPlane {
    /// Wire a control plane from configuration and its two collaborators.
    pub fn new(
        config: &ControlConfig,
        repository: Arc<dyn StoreRepository>,
        deployer: Arc<dyn Deployer>,
    ) -> ControlResult<Self> {
        let provisioner = Arc::new(ProvisioningExecutor::new(
            Arc::clone(&repository),
            Arc::clone(&deployer),
            config.provisioning.clone(),
        ));
        let deleter = Arc::new(DeletionExecutor::new(
            Arc::clone(&repository),
            Arc::clone(&deployer),
            config.provisioning.teardown_settle(),
        ));

        let manager = Arc::new(StoreManager::new(
            Arc::clone(&repository),
            TaskPool::new(config.provisioning.max_concurrent),
            provisioner,
            deleter,
            HealthChecker::new()?,
            config.provisioning.domain_suffix.clone(),
        ));

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&repository),
            deployer,
            config.reconcile.interval(),
        ));

        Ok(Self {
            manager,
            repository,
            admission: Arc::new(AdmissionController::new(&config.admission)),
            reconciler,
            server: config.server.clone(),
        })
    }

    /// Build the HTTP router.
    pub fn router(&self) -> axum::Router {
        let state = api::AppState {
            manager: Arc::clone(&self.manager),
            repository: Arc::clone(&self.repository),
        };
        api::router(state, Arc::clone(&self.admission), &self.server)
    }

    /// Start admission eviction and reconciliation.
    ///
    /// Both tasks stop when `cancel` is triggered.
    pub fn start_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            self.admission.start(cancel.child_token()),
            Arc::clone(&self.reconciler).start(cancel.child_token()),
        ]
    }

    /// Wait for in-flight lifecycle jobs and stop accepting new ones.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("manager", &self.manager)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// The control service.
///
/// Manages the lifecycle of the control plane, including:
/// - Store record storage
/// - Deployment invoker
/// - Background reconciliation and admission eviction
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service until a shutdown signal arrives.
    ///
    /// In-flight provisioning and deletion jobs are awaited before returning.
    pub async fn run(&self) -> ControlResult<()> {
        if self.config.provisioning.uses_default_admin_password() {
            warn!(
                "provisioning.admin_password is the built-in default; every store \
                 will share a publicly known admin credential"
            );
        }

        let repository = self.create_repository().await?;
        let deployer = create_deployer(&self.config.cluster);
        info!(
            deployer = ?self.config.cluster.deployer,
            kubeconfig = %self.config.cluster.kubeconfig.display(),
            "deployer configured"
        );

        let plane = ControlPlane::new(&self.config, repository, deployer)?;
        let background = plane.start_background(&self.cancel);
        let app = plane.router();

        let addr = self.config.server.listen_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind {addr}: {e}")))?;
        info!(listen_addr = %addr, "control service listening");

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
        .await;

        self.cancel.cancel();
        for handle in background {
            if let Err(e) = handle.await {
                error!(error = %e, "background task panicked");
            }
        }

        info!(in_flight = plane.manager.jobs_in_flight(), "waiting for lifecycle jobs");
        plane.shutdown().await;

        served.map_err(|e| ControlError::Config(format!("server error: {e}")))?;
        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_repository(&self) -> ControlResult<Arc<dyn StoreRepository>> {
        match self.config.database.backend {
            StorageBackend::Sqlite => {
                let store = SqliteStore::new(&self.config.database.url).await?;
                info!(url = %self.config.database.url, "connected to SQLite");
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => {
                warn!("using in-memory store; records are lost on exit");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
