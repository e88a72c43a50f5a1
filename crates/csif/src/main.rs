use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use csi_proto::Controller;
use csif::{
  backend::{DiskBackend, FileDiskBackend, MemoryDiskBackend},
  transport::{self, ServeError},
  BackendKind, Config, ControllerServer, VolumeRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let config = Config::parse();

  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(&config.log_level)?,
  };
  tracing_subscriber::fmt().with_env_filter(filter).init();

  info!(
    driver = %config.driver_name,
    endpoint = %config.endpoint,
    backend = ?config.backend,
    "starting csif controller"
  );

  match config.backend {
    BackendKind::File => {
      let backend = FileDiskBackend::open(&config.data_dir).await?;
      run(&config, backend).await?;
    }
    BackendKind::Memory => run(&config, MemoryDiskBackend::new()).await?,
  }

  Ok(())
}

async fn run<B: DiskBackend>(config: &Config, backend: B) -> Result<(), ServeError> {
  let server = ControllerServer::new(config.driver_name.clone(), VolumeRegistry::new(backend));
  let controller = Controller::new(Arc::new(server));

  transport::serve(&config.endpoint, controller, shutdown_signal()).await
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    error!(error = %err, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutting down");
}
