use csi_proto::controller::{ControllerCapabilities, CreateVolumeError, VolumeCapability};
use thiserror::Error;

use crate::volume::AccessType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapabilityError {
  #[error("block+mount access type")]
  MountAndBlock,
}

impl From<CapabilityError> for CreateVolumeError {
  fn from(err: CapabilityError) -> Self {
    CreateVolumeError::Unsupported(err.to_string())
  }
}

/// The controller RPC capabilities this plugin advertises. Requests for
/// anything else are refused through [`ControllerCapabilities::require`].
pub fn supported_capabilities() -> ControllerCapabilities {
  ControllerCapabilities::CREATE_DELETE_VOLUME
    | ControllerCapabilities::CREATE_DELETE_SNAPSHOT
    | ControllerCapabilities::EXPAND_VOLUME
}

/// Picks the access type a new volume is created with. A request asking
/// for both block and mount is rejected, block alone wins, and anything
/// else falls back to mount.
pub fn resolve_access_type(
  capabilities: &[VolumeCapability],
) -> Result<AccessType, CapabilityError> {
  let block = capabilities.iter().any(VolumeCapability::is_block);
  let mount = capabilities.iter().any(VolumeCapability::is_mount);

  match (block, mount) {
    (true, true) => Err(CapabilityError::MountAndBlock),
    (true, false) => Ok(AccessType::Block),
    (false, _) => Ok(AccessType::Mount),
  }
}

/// Filesystem of the first mount capability that names one.
pub(crate) fn requested_fs_type(capabilities: &[VolumeCapability]) -> Option<String> {
  use csi_proto::controller::AccessType as Requested;

  capabilities.iter().find_map(|c| match c.access_type() {
    Some(Requested::Mount(mount)) => mount.fs_type().map(ToOwned::to_owned),
    _ => None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use csi_proto::proto::{
    self, controller_service_capability::rpc::Type as Rpc, volume_capability as vc,
  };
  use test_case::test_case;

  fn block() -> VolumeCapability {
    proto::VolumeCapability {
      access_mode: None,
      access_type: Some(vc::AccessType::Block(vc::BlockVolume {})),
    }
    .into()
  }

  fn mount(fs_type: &str) -> VolumeCapability {
    proto::VolumeCapability {
      access_mode: None,
      access_type: Some(vc::AccessType::Mount(vc::MountVolume {
        fs_type: fs_type.into(),
        mount_flags: Vec::new(),
      })),
    }
    .into()
  }

  fn untyped() -> VolumeCapability {
    proto::VolumeCapability {
      access_mode: Some(vc::AccessMode {
        mode: vc::access_mode::Mode::SingleNodeWriter as i32,
      }),
      access_type: None,
    }
    .into()
  }

  #[test_case(vec![mount("")] => Ok(AccessType::Mount) ; "mount only")]
  #[test_case(vec![block()] => Ok(AccessType::Block) ; "block only")]
  #[test_case(vec![block(), block()] => Ok(AccessType::Block) ; "repeated block")]
  #[test_case(vec![block(), mount("")] => Err(CapabilityError::MountAndBlock) ; "block and mount")]
  #[test_case(vec![mount("ext4"), block()] => Err(CapabilityError::MountAndBlock) ; "mount and block")]
  #[test_case(vec![untyped()] => Ok(AccessType::Mount) ; "no access type")]
  #[test_case(vec![untyped(), block()] => Ok(AccessType::Block) ; "untyped and block")]
  #[test_case(vec![] => Ok(AccessType::Mount) ; "empty")]
  fn resolve(capabilities: Vec<VolumeCapability>) -> Result<AccessType, CapabilityError> {
    resolve_access_type(&capabilities)
  }

  #[test_case(Rpc::Unknown => true ; "unknown")]
  #[test_case(Rpc::CreateDeleteVolume => true ; "create delete volume")]
  #[test_case(Rpc::CreateDeleteSnapshot => true ; "create delete snapshot")]
  #[test_case(Rpc::ExpandVolume => true ; "expand volume")]
  #[test_case(Rpc::PublishUnpublishVolume => false ; "publish unpublish")]
  #[test_case(Rpc::ListVolumes => false ; "list volumes")]
  #[test_case(Rpc::GetCapacity => false ; "get capacity")]
  #[test_case(Rpc::CloneVolume => false ; "clone volume")]
  fn service_capability(rpc: Rpc) -> bool {
    supported_capabilities().require(rpc).is_ok()
  }

  #[test]
  fn unsupported_capability_is_invalid_argument() {
    let status = supported_capabilities()
      .require(Rpc::ListSnapshots)
      .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
  }

  #[test]
  fn conflict_maps_to_invalid_argument() {
    let status: tonic::Status = CreateVolumeError::from(CapabilityError::MountAndBlock).into();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert_eq!(status.message(), "block+mount access type");
  }

  #[test]
  fn fs_type_comes_from_first_mount() {
    assert_eq!(requested_fs_type(&[block(), mount("")]), None);
    assert_eq!(
      requested_fs_type(&[untyped(), mount("xfs"), mount("ext4")]),
      Some("xfs".to_owned())
    );
  }
}
