use std::{error::Error as StdError, io, path::PathBuf};
use thiserror::Error;

use csi_proto::controller::{CreateVolumeError, DeleteVolumeError};

/// Failure reported by a disk backend.
#[derive(Debug, Error)]
pub enum DiskError {
  #[error("failed to {op} {}", path.display())]
  Io {
    op: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{0}")]
  Backend(String),
}

impl DiskError {
  pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
    let path = path.into();
    move |source| DiskError::Io { op, path, source }
  }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct IdError(pub String);

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("volume {name} exists with {existing} bytes, requested {requested} bytes")]
  AlreadyExists {
    name: String,
    existing: u64,
    requested: u64,
  },

  #[error("failed to generate volume id")]
  GenerateId(#[source] IdError),

  #[error("failed to create volume {name}")]
  CreateDisk {
    name: String,
    #[source]
    source: DiskError,
  },

  #[error("failed to delete volume {id}")]
  DestroyDisk {
    id: String,
    #[source]
    source: DiskError,
  },
}

/// Renders an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
  let mut message = err.to_string();
  let mut source = err.source();
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}

impl From<RegistryError> for CreateVolumeError {
  fn from(err: RegistryError) -> Self {
    match err {
      RegistryError::AlreadyExists { .. } => CreateVolumeError::AlreadyExists(err.to_string()),
      err => CreateVolumeError::Internal(error_chain(&err)),
    }
  }
}

impl From<RegistryError> for DeleteVolumeError {
  fn from(err: RegistryError) -> Self {
    DeleteVolumeError::Internal(error_chain(&err))
  }
}
