use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{server::DEFAULT_DRIVER_NAME, transport::Endpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
  /// Sparse image files under the data directory.
  File,
  /// Disks that only exist in memory.
  Memory,
}

/// CSI controller plugin provisioning csif volumes.
#[derive(Debug, Parser)]
#[command(name = "csif-controller", version)]
pub struct Config {
  /// Where to serve the CSI gRPC API: unix:///path/to/socket or tcp://host:port.
  #[arg(long, env = "CSI_ENDPOINT", default_value = "unix:///csi/csi.sock")]
  pub endpoint: Endpoint,

  /// Name reported through GetPluginInfo.
  #[arg(long, env = "CSIF_DRIVER_NAME", default_value = DEFAULT_DRIVER_NAME)]
  pub driver_name: String,

  #[arg(long, env = "CSIF_BACKEND", value_enum, default_value_t = BackendKind::File)]
  pub backend: BackendKind,

  /// Directory holding the disk images of the file backend.
  #[arg(long, env = "CSIF_DATA_DIR", default_value = "/var/lib/csif")]
  pub data_dir: PathBuf,

  /// Log filter used when RUST_LOG is not set.
  #[arg(long, env = "CSIF_LOG_LEVEL", default_value = "info")]
  pub log_level: String,
}
