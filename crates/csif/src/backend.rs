mod file;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::volume::AccessType;

pub use crate::error::DiskError;
pub use file::{FileDisk, FileDiskBackend};
pub use memory::{DiskAction, MemoryDisk, MemoryDiskBackend};

pub const CONTEXT_PATH: &str = "csif.csi/path";
pub const CONTEXT_SIZE: &str = "csif.csi/size";
pub const CONTEXT_ACCESS_TYPE: &str = "csif.csi/access-type";

/// Everything a backend gets to know about the volume it provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
  pub name: String,
  pub size_bytes: u64,
  pub access_type: AccessType,
  pub fs_type: Option<String>,
  pub parameters: HashMap<String, String>,
}

impl DiskSpec {
  pub fn new(name: impl Into<String>, size_bytes: u64, access_type: AccessType) -> Self {
    DiskSpec {
      name: name.into(),
      size_bytes,
      access_type,
      fs_type: None,
      parameters: HashMap::new(),
    }
  }
}

/// Provisions the storage behind a volume.
#[async_trait]
pub trait DiskBackend: Send + Sync + 'static {
  type Disk: Disk;

  /// Allocates a disk for `spec`. `volume_id` is unique for the lifetime
  /// of the process.
  async fn create(&self, spec: &DiskSpec, volume_id: &str) -> Result<Self::Disk, DiskError>;
}

#[async_trait]
pub trait Disk: Send + Sync + 'static {
  /// Releases the storage. Destroying a disk whose storage is already gone
  /// succeeds.
  async fn destroy(&self) -> Result<(), DiskError>;

  /// Attributes handed to the CO as the volume context.
  fn export_context(&self) -> HashMap<String, String>;
}
