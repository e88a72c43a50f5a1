use std::{
  collections::HashMap,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{
  Disk, DiskBackend, DiskError, DiskSpec, CONTEXT_ACCESS_TYPE, CONTEXT_PATH, CONTEXT_SIZE,
};
use crate::volume::AccessType;

/// Backs every volume with a sparse image file under a data directory.
#[derive(Debug, Clone)]
pub struct FileDiskBackend {
  root: PathBuf,
}

impl FileDiskBackend {
  /// Opens `root`, creating it when it does not exist yet.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DiskError> {
    let root = root.into();
    fs::create_dir_all(&root)
      .await
      .map_err(DiskError::io("create data directory", &root))?;

    Ok(FileDiskBackend { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn image_path(&self, volume_id: &str) -> PathBuf {
    self.root.join(format!("{}.img", volume_id))
  }
}

#[async_trait]
impl DiskBackend for FileDiskBackend {
  type Disk = FileDisk;

  async fn create(&self, spec: &DiskSpec, volume_id: &str) -> Result<FileDisk, DiskError> {
    let path = self.image_path(volume_id);
    let file = fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
      .map_err(DiskError::io("create", &path))?;

    let pending = PendingImage::new(&path);
    file
      .set_len(spec.size_bytes)
      .await
      .map_err(DiskError::io("allocate", &path))?;
    pending.keep();

    info!(path = %path.display(), size_bytes = spec.size_bytes, "created disk image");
    Ok(FileDisk {
      path,
      size_bytes: spec.size_bytes,
      access_type: spec.access_type,
    })
  }
}

/// Removes a freshly created image unless `keep` is called, so a failed
/// or cancelled `create` leaves nothing behind.
struct PendingImage<'a> {
  path: &'a Path,
  keep: bool,
}

impl<'a> PendingImage<'a> {
  fn new(path: &'a Path) -> Self {
    PendingImage { path, keep: false }
  }

  fn keep(mut self) {
    self.keep = true;
  }
}

impl Drop for PendingImage<'_> {
  fn drop(&mut self) {
    if self.keep {
      return;
    }

    match std::fs::remove_file(self.path) {
      Ok(()) => debug!(path = %self.path.display(), "removed partial image"),
      Err(err) if err.kind() == ErrorKind::NotFound => (),
      Err(err) => {
        warn!(path = %self.path.display(), error = %err, "failed to clean up partial image")
      }
    }
  }
}

#[derive(Debug)]
pub struct FileDisk {
  path: PathBuf,
  size_bytes: u64,
  access_type: AccessType,
}

impl FileDisk {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl Disk for FileDisk {
  async fn destroy(&self) -> Result<(), DiskError> {
    match fs::remove_file(&self.path).await {
      Ok(()) => {
        info!(path = %self.path.display(), "removed disk image");
        Ok(())
      }
      Err(err) if err.kind() == ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "disk image already gone");
        Ok(())
      }
      Err(err) => Err(DiskError::io("remove", &self.path)(err)),
    }
  }

  fn export_context(&self) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert(
      CONTEXT_PATH.to_owned(),
      self.path.to_string_lossy().into_owned(),
    );
    context.insert(CONTEXT_SIZE.to_owned(), self.size_bytes.to_string());
    context.insert(
      CONTEXT_ACCESS_TYPE.to_owned(),
      self.access_type.as_str().to_owned(),
    );
    context
  }
}
