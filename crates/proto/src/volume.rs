use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
  fmt,
};

use crate::proto;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeContentSource {
  Snapshot(String),
  Volume(String),
  /// The field was sent without naming a snapshot or volume.
  Unspecified,
}

impl TryFrom<proto::VolumeContentSource> for VolumeContentSource {
  type Error = tonic::Status;

  fn try_from(value: proto::VolumeContentSource) -> Result<Self, Self::Error> {
    #[inline]
    fn fail_if_empty(v: String, error: &'static str) -> Result<String, tonic::Status> {
      if v.is_empty() {
        Err(tonic::Status::invalid_argument(error))
      } else {
        Ok(v)
      }
    }

    Ok(match value.r#type {
      None => VolumeContentSource::Unspecified,
      Some(proto::volume_content_source::Type::Volume(v)) => VolumeContentSource::Volume(
        fail_if_empty(v.volume_id, "VolumeContentSource volume_id cannot be empty")?,
      ),
      Some(proto::volume_content_source::Type::Snapshot(v)) => {
        VolumeContentSource::Snapshot(fail_if_empty(
          v.snapshot_id,
          "VolumeContentSource snapshot_id cannot be empty",
        )?)
      }
    })
  }
}

/// A provisioned volume as reported back to the CO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
  capacity_bytes: u64,
  volume_id: String,
  volume_context: HashMap<String, String>,
}

impl Volume {
  pub fn new(
    volume_id: impl Into<String>,
    capacity_bytes: u64,
    volume_context: HashMap<String, String>,
  ) -> Self {
    Volume {
      capacity_bytes,
      volume_id: volume_id.into(),
      volume_context,
    }
  }

  /// The capacity of the volume in bytes. 0 means unknown.
  #[inline]
  pub fn capacity_bytes(&self) -> u64 {
    self.capacity_bytes
  }

  /// The identifier for this volume, generated by the plugin.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Opaque attributes passed back to the CO in later calls for this volume.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl TryFrom<Volume> for proto::Volume {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    let capacity_bytes = i64::try_from(value.capacity_bytes)
      .map_err(|_| tonic::Status::out_of_range("Volume capacity_bytes overflows int64"))?;

    Ok(proto::Volume {
      capacity_bytes,
      volume_id: value.volume_id,
      volume_context: value.volume_context,
      content_source: None,
      accessible_topology: Vec::new(),
    })
  }
}

impl TryFrom<Volume> for proto::CreateVolumeResponse {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    let volume = Some(value.try_into()?);

    Ok(proto::CreateVolumeResponse { volume })
  }
}

/// A requested capability. Both halves are optional on the wire, and an
/// entry that carries neither is kept rather than rejected.
#[derive(Debug)]
pub struct VolumeCapability {
  access_mode: Option<AccessMode>,
  access_type: Option<AccessType>,
}

impl VolumeCapability {
  #[inline]
  pub fn access_mode(&self) -> Option<&AccessMode> {
    self.access_mode.as_ref()
  }

  #[inline]
  pub fn access_type(&self) -> Option<&AccessType> {
    self.access_type.as_ref()
  }

  #[inline]
  pub fn is_block(&self) -> bool {
    matches!(self.access_type, Some(AccessType::Block))
  }

  #[inline]
  pub fn is_mount(&self) -> bool {
    matches!(self.access_type, Some(AccessType::Mount(_)))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessMode {
  Unknown,
  /// Can only be published once as read/write on a single node, at
  /// any given time.
  SingleNodeWriter,
  /// Can only be published once as readonly on a single node, at
  /// any given time.
  SingleNodeReaderOnly,
  /// Can be published as readonly at multiple nodes simultaneously.
  MultiNodeReaderOnly,
  /// Can be published at multiple nodes simultaneously. Only one of
  /// the node can be used as read/write. The rest will be readonly.
  MultiNodeSingleWriter,
  /// Can be published as read/write at multiple nodes
  /// simultaneously.
  MultiNodeMultiWriter,
}

impl From<proto::volume_capability::AccessMode> for AccessMode {
  fn from(value: proto::volume_capability::AccessMode) -> Self {
    use proto::volume_capability::access_mode::Mode;

    match Mode::from_i32(value.mode) {
      Some(Mode::SingleNodeWriter) => AccessMode::SingleNodeWriter,
      Some(Mode::SingleNodeReaderOnly) => AccessMode::SingleNodeReaderOnly,
      Some(Mode::MultiNodeReaderOnly) => AccessMode::MultiNodeReaderOnly,
      Some(Mode::MultiNodeSingleWriter) => AccessMode::MultiNodeSingleWriter,
      Some(Mode::MultiNodeMultiWriter) => AccessMode::MultiNodeMultiWriter,
      _ => AccessMode::Unknown,
    }
  }
}

#[derive(Debug)]
pub enum AccessType {
  /// Indicate that the volume will be accessed via the block device API.
  Block,

  /// Indicate that the volume will be accessed via the filesystem API.
  Mount(MountVolume),
}

impl From<proto::volume_capability::AccessType> for AccessType {
  fn from(value: proto::volume_capability::AccessType) -> Self {
    match value {
      proto::volume_capability::AccessType::Block(_) => AccessType::Block,
      proto::volume_capability::AccessType::Mount(v) => AccessType::Mount(v.into()),
    }
  }
}

pub struct MountVolume {
  fs_type: Option<String>,
  mount_flags: Vec<String>,
}

impl MountVolume {
  /// The filesystem type.
  #[inline]
  pub fn fs_type(&self) -> Option<&str> {
    self.fs_type.as_deref()
  }

  /// The mount options that can be used for the volume. This field is
  /// OPTIONAL. `mount_flags` MAY contain sensitive information.
  /// Therefore, the CO and the Plugin MUST NOT leak this information
  /// to untrusted entities.
  pub fn mount_flags(&self) -> impl Iterator<Item = &str> + ExactSizeIterator {
    self.mount_flags.iter().map(|v| &**v)
  }
}

impl From<proto::volume_capability::MountVolume> for MountVolume {
  fn from(value: proto::volume_capability::MountVolume) -> Self {
    let fs_type = match value.fs_type {
      v if v.is_empty() => None,
      v => Some(v),
    };

    MountVolume {
      fs_type,
      mount_flags: value.mount_flags,
    }
  }
}

impl fmt::Debug for MountVolume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountVolume")
      .field("fs_type", &self.fs_type)
      .field(
        "mount_flags",
        &format!("REDACTED ({} items)", self.mount_flags.len()),
      )
      .finish()
  }
}

impl From<proto::VolumeCapability> for VolumeCapability {
  fn from(value: proto::VolumeCapability) -> Self {
    VolumeCapability {
      access_mode: value.access_mode.map(Into::into),
      access_type: value.access_type.map(Into::into),
    }
  }
}
