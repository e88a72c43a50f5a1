use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tracing::info;

use super::{Disk, DiskBackend, DiskError, DiskSpec, CONTEXT_ACCESS_TYPE, CONTEXT_SIZE};
use crate::volume::AccessType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskAction {
  Create {
    name: String,
    volume_id: String,
    size_bytes: u64,
  },

  Destroy {
    volume_id: String,
  },
}

#[derive(Default)]
struct MemoryBackendInner {
  log: Vec<DiskAction>,
  disks: HashSet<String>,
  create_error: Option<String>,
  destroy_error: Option<String>,
}

/// Keeps disks in memory only. Every call is logged, and creation or
/// destruction can be made to fail on demand.
#[derive(Clone, Default)]
pub struct MemoryDiskBackend(Arc<Mutex<MemoryBackendInner>>);

impl MemoryDiskBackend {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, MemoryBackendInner> {
    lock(&self.0)
  }

  pub fn reset_log(&self) {
    self.lock().log.clear();
  }

  pub fn get_log(&self) -> Vec<DiskAction> {
    self.lock().log.clone()
  }

  /// Whether a disk for `volume_id` is currently allocated.
  pub fn contains(&self, volume_id: &str) -> bool {
    self.lock().disks.contains(volume_id)
  }

  pub fn disk_count(&self) -> usize {
    self.lock().disks.len()
  }

  /// Makes every following `create` fail with `message`, until cleared with `None`.
  pub fn fail_create(&self, message: Option<&str>) {
    self.lock().create_error = message.map(ToOwned::to_owned);
  }

  /// Makes every following `destroy` fail with `message`, until cleared with `None`.
  pub fn fail_destroy(&self, message: Option<&str>) {
    self.lock().destroy_error = message.map(ToOwned::to_owned);
  }
}

fn lock(inner: &Mutex<MemoryBackendInner>) -> MutexGuard<'_, MemoryBackendInner> {
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl DiskBackend for MemoryDiskBackend {
  type Disk = MemoryDisk;

  async fn create(&self, spec: &DiskSpec, volume_id: &str) -> Result<MemoryDisk, DiskError> {
    // Let concurrent callers interleave with an in-flight create.
    tokio::task::yield_now().await;

    let mut inner = self.lock();
    inner.log.push(DiskAction::Create {
      name: spec.name.clone(),
      volume_id: volume_id.to_owned(),
      size_bytes: spec.size_bytes,
    });

    if let Some(message) = &inner.create_error {
      return Err(DiskError::Backend(message.clone()));
    }

    inner.disks.insert(volume_id.to_owned());
    info!(
      "Memory backend: created disk {} ({} bytes) for {}",
      volume_id, spec.size_bytes, spec.name
    );

    Ok(MemoryDisk {
      volume_id: volume_id.to_owned(),
      size_bytes: spec.size_bytes,
      access_type: spec.access_type,
      backend: self.0.clone(),
    })
  }
}

pub struct MemoryDisk {
  volume_id: String,
  size_bytes: u64,
  access_type: AccessType,
  backend: Arc<Mutex<MemoryBackendInner>>,
}

#[async_trait]
impl Disk for MemoryDisk {
  async fn destroy(&self) -> Result<(), DiskError> {
    let mut inner = lock(&self.backend);
    inner.log.push(DiskAction::Destroy {
      volume_id: self.volume_id.clone(),
    });

    if let Some(message) = &inner.destroy_error {
      return Err(DiskError::Backend(message.clone()));
    }

    inner.disks.remove(&self.volume_id);
    info!("Memory backend: destroyed disk {}", self.volume_id);
    Ok(())
  }

  fn export_context(&self) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert(CONTEXT_SIZE.to_owned(), self.size_bytes.to_string());
    context.insert(
      CONTEXT_ACCESS_TYPE.to_owned(),
      self.access_type.as_str().to_owned(),
    );
    context
  }
}
