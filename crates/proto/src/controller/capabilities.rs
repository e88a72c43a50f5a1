use std::convert::TryFrom;

use bitflags::bitflags;

use crate::proto;
use proto::controller_service_capability::rpc::Type;

#[rustfmt::skip]
bitflags! {
  pub struct ControllerCapabilities: u32 {
    const CREATE_DELETE_VOLUME         = 0b_0000_0000_0000_0001;
    const PUBLISH_UNPUBLISH_VOLUME     = 0b_0000_0000_0000_0010;
    const LIST_VOLUMES                 = 0b_0000_0000_0000_0100;
    const GET_CAPACITY                 = 0b_0000_0000_0000_1000;

    /// Currently the only way to consume a snapshot is to create
    /// a volume from it. Therefore plugins supporting
    /// `CREATE_DELETE_SNAPSHOT` MUST support creating volume from
    /// snapshot.
    const CREATE_DELETE_SNAPSHOT       = 0b_0000_0000_0001_0000;
    const LIST_SNAPSHOTS               = 0b_0000_0000_0010_0000;

    /// Plugins supporting volume cloning at the storage level MAY
    /// report this capability.
    const CLONE_VOLUME                 = 0b_0000_0000_0100_0000;

    /// Indicates the SP supports ControllerPublishVolume.readonly
    /// field.
    const PUBLISH_READONLY             = 0b_0000_0000_1000_0000;

    /// See VolumeExpansion for details.
    const EXPAND_VOLUME                = 0b_0000_0001_0000_0000;

    /// Indicates the SP supports the
    /// ListVolumesResponse.entry.published_nodes field
    const LIST_VOLUMES_PUBLISHED_NODES = 0b_0000_0010_0000_0000;

    /// Indicates that the Controller service can report volume
    /// conditions.
    const VOLUME_CONDITION             = 0b_0000_0100_0000_0000;

    /// Indicates the SP supports the ControllerGetVolume RPC.
    const GET_VOLUME                   = 0b_0000_1000_0000_0000;
  }
}

/// Wire order of the capabilities in `ControllerGetCapabilitiesResponse`.
const RPC_TYPES: [(ControllerCapabilities, Type); 12] = [
  (ControllerCapabilities::CREATE_DELETE_VOLUME, Type::CreateDeleteVolume),
  (ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME, Type::PublishUnpublishVolume),
  (ControllerCapabilities::LIST_VOLUMES, Type::ListVolumes),
  (ControllerCapabilities::GET_CAPACITY, Type::GetCapacity),
  (ControllerCapabilities::CREATE_DELETE_SNAPSHOT, Type::CreateDeleteSnapshot),
  (ControllerCapabilities::LIST_SNAPSHOTS, Type::ListSnapshots),
  (ControllerCapabilities::CLONE_VOLUME, Type::CloneVolume),
  (ControllerCapabilities::PUBLISH_READONLY, Type::PublishReadonly),
  (ControllerCapabilities::EXPAND_VOLUME, Type::ExpandVolume),
  (ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES, Type::ListVolumesPublishedNodes),
  (ControllerCapabilities::VOLUME_CONDITION, Type::VolumeCondition),
  (ControllerCapabilities::GET_VOLUME, Type::GetVolume),
];

impl ControllerCapabilities {
  /// The flag matching an RPC capability type. `Unknown` has none.
  pub fn from_rpc(rpc: Type) -> Option<Self> {
    RPC_TYPES
      .iter()
      .find(|(_, ty)| *ty == rpc)
      .map(|(flag, _)| *flag)
  }

  /// Fails with `InvalidArgument` unless `rpc` is in this set. An
  /// unknown/unset capability is always satisfied.
  pub fn require(&self, rpc: Type) -> Result<(), tonic::Status> {
    match Self::from_rpc(rpc) {
      None => Ok(()),
      Some(flag) if self.contains(flag) => Ok(()),
      Some(_) => Err(tonic::Status::invalid_argument(format!(
        "capability unsupported: {:?}",
        rpc
      ))),
    }
  }
}

impl TryFrom<ControllerCapabilities> for proto::ControllerGetCapabilitiesResponse {
  type Error = tonic::Status;

  fn try_from(value: ControllerCapabilities) -> Result<Self, Self::Error> {
    let capabilities = RPC_TYPES
      .iter()
      .filter(|(flag, _)| value.contains(*flag))
      .map(|(_, ty)| proto::ControllerServiceCapability {
        r#type: Some(proto::controller_service_capability::Type::Rpc(
          proto::controller_service_capability::Rpc { r#type: *ty as i32 },
        )),
      })
      .collect();

    Ok(proto::ControllerGetCapabilitiesResponse { capabilities })
  }
}
