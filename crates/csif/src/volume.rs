use std::{collections::HashMap, fmt, sync::Arc};

use crate::backend::Disk;

/// How a volume is consumed once it is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
  Mount,
  Block,
}

impl AccessType {
  pub fn as_str(&self) -> &'static str {
    match self {
      AccessType::Mount => "mount",
      AccessType::Block => "block",
    }
  }
}

impl fmt::Display for AccessType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Snapshot of a registered volume handed out by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
  pub name: String,
  pub id: String,
  pub size_bytes: u64,
  pub access_type: AccessType,
  pub volume_context: HashMap<String, String>,
}

/// A volume the registry owns together with its backing disk.
pub(crate) struct VolumeRecord<D> {
  pub(crate) name: String,
  pub(crate) id: String,
  pub(crate) size_bytes: u64,
  pub(crate) access_type: AccessType,
  pub(crate) disk: Arc<D>,
}

impl<D: Disk> VolumeRecord<D> {
  pub(crate) fn info(&self) -> VolumeInfo {
    VolumeInfo {
      name: self.name.clone(),
      id: self.id.clone(),
      size_bytes: self.size_bytes,
      access_type: self.access_type,
      volume_context: self.disk.export_context(),
    }
  }
}

impl<D> fmt::Debug for VolumeRecord<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VolumeRecord")
      .field("name", &self.name)
      .field("id", &self.id)
      .field("size_bytes", &self.size_bytes)
      .field("access_type", &self.access_type)
      .finish()
  }
}
