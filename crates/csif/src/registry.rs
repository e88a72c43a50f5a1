use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info, instrument};

use crate::{
  backend::{Disk, DiskBackend, DiskSpec},
  error::RegistryError,
  id::{IdSource, UuidSource},
  keyed::KeyedLock,
  volume::{VolumeInfo, VolumeRecord},
};

struct Volumes<D> {
  by_id: HashMap<String, VolumeRecord<D>>,
  by_name: HashMap<String, String>,
}

impl<D> Default for Volumes<D> {
  fn default() -> Self {
    Volumes {
      by_id: HashMap::new(),
      by_name: HashMap::new(),
    }
  }
}

/// Every volume this controller has created, indexed by ID and by name.
///
/// Calls for the same volume name are serialized, while calls for
/// different names run concurrently. Backend work never happens while the
/// index itself is locked.
pub struct VolumeRegistry<B: DiskBackend> {
  backend: B,
  ids: Box<dyn IdSource>,
  volumes: Mutex<Volumes<B::Disk>>,
  names: KeyedLock,
}

impl<B: DiskBackend> VolumeRegistry<B> {
  pub fn new(backend: B) -> Self {
    Self::with_id_source(backend, UuidSource)
  }

  pub fn with_id_source(backend: B, ids: impl IdSource) -> Self {
    VolumeRegistry {
      backend,
      ids: Box::new(ids),
      volumes: Mutex::new(Volumes::default()),
      names: KeyedLock::default(),
    }
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  fn volumes(&self) -> MutexGuard<'_, Volumes<B::Disk>> {
    self.volumes.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn find_by_id(&self, id: &str) -> Option<VolumeInfo> {
    self.volumes().by_id.get(id).map(VolumeRecord::info)
  }

  pub fn find_by_name(&self, name: &str) -> Option<VolumeInfo> {
    let volumes = self.volumes();
    volumes
      .by_name
      .get(name)
      .and_then(|id| volumes.by_id.get(id))
      .map(VolumeRecord::info)
  }

  pub fn len(&self) -> usize {
    self.volumes().by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the volume registered under `spec.name`, creating it first
  /// when there is none. An existing volume of a different size is an
  /// `AlreadyExists` error. Nothing is registered when creation fails.
  #[instrument(skip(self, spec), fields(name = %spec.name, size_bytes = spec.size_bytes))]
  pub async fn create_or_get(&self, spec: DiskSpec) -> Result<VolumeInfo, RegistryError> {
    let _name = self.names.lock(&spec.name).await;

    if let Some(existing) = self.find_by_name(&spec.name) {
      if existing.size_bytes != spec.size_bytes {
        return Err(RegistryError::AlreadyExists {
          name: spec.name,
          existing: existing.size_bytes,
          requested: spec.size_bytes,
        });
      }

      debug!(volume_id = %existing.id, "volume already exists");
      return Ok(existing);
    }

    let id = self.ids.generate().map_err(RegistryError::GenerateId)?;
    let disk = self
      .backend
      .create(&spec, &id)
      .await
      .map_err(|source| RegistryError::CreateDisk {
        name: spec.name.clone(),
        source,
      })?;

    let record = VolumeRecord {
      name: spec.name,
      id: id.clone(),
      size_bytes: spec.size_bytes,
      access_type: spec.access_type,
      disk: Arc::new(disk),
    };
    let info = record.info();

    {
      let mut volumes = self.volumes();
      volumes.by_name.insert(record.name.clone(), id.clone());
      volumes.by_id.insert(id, record);
    }

    info!(volume_id = %info.id, access_type = %info.access_type, "volume created");
    Ok(info)
  }

  /// Destroys and forgets the volume `id`. Unknown IDs succeed without
  /// touching the backend. When the backend fails the volume stays
  /// registered so that a retry can finish the job.
  #[instrument(skip(self))]
  pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
    let name = match self.volumes().by_id.get(id) {
      Some(record) => record.name.clone(),
      None => {
        debug!("volume not found, nothing to delete");
        return Ok(());
      }
    };

    let _name = self.names.lock(&name).await;

    // A concurrent delete may have won the race for the name lock.
    let disk = match self.volumes().by_id.get(id) {
      Some(record) => record.disk.clone(),
      None => {
        debug!("volume already deleted");
        return Ok(());
      }
    };

    disk
      .destroy()
      .await
      .map_err(|source| RegistryError::DestroyDisk {
        id: id.to_owned(),
        source,
      })?;

    let mut volumes = self.volumes();
    if let Some(record) = volumes.by_id.remove(id) {
      volumes.by_name.remove(&record.name);
    }
    info!(name = %name, "volume deleted");
    Ok(())
  }
}
