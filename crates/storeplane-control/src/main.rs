//! Storeplane control service binary.
//!
//! Runs the control plane for store provisioning and teardown.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storeplane_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("storeplane_control=info".parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "storeplane control service starting");

    let config = match std::env::args().nth(1) {
        Some(path) => ControlConfig::from_file(path)?,
        None => ControlConfig::load()?,
    };

    if config.cluster.deployer == storeplane_control::config::DeployerKind::Mock {
        warn!("mock deployer selected; no cluster resources will be created");
    }

    info!(
        listen_addr = %config.server.listen_addr,
        database = %config.database.url,
        domain_suffix = %config.provisioning.domain_suffix,
        reconcile_interval_secs = config.reconcile.interval_secs,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;

    Ok(())
}
