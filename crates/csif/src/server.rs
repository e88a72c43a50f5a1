use async_trait::async_trait;
use tracing::warn;

use csi_proto::{
  controller::{
    ControllerCapabilities, CreateVolumeError, CreateVolumeRequest, DeleteVolumeError,
    DeleteVolumeRequest, Volume,
  },
  ControllerService, IdentityService,
};

use crate::{
  backend::{DiskBackend, DiskSpec},
  capability::{requested_fs_type, resolve_access_type, supported_capabilities},
  error::error_chain,
  registry::VolumeRegistry,
};

pub const DEFAULT_DRIVER_NAME: &str = "csif.csi.storage";

/// The csif controller plugin. Provisioning goes through the registry, every
/// other controller RPC keeps the unimplemented default.
pub struct ControllerServer<B: DiskBackend> {
  driver_name: String,
  registry: VolumeRegistry<B>,
}

impl<B: DiskBackend> ControllerServer<B> {
  pub fn new(driver_name: impl Into<String>, registry: VolumeRegistry<B>) -> Self {
    ControllerServer {
      driver_name: driver_name.into(),
      registry,
    }
  }

  pub fn registry(&self) -> &VolumeRegistry<B> {
    &self.registry
  }
}

impl<B: DiskBackend> IdentityService for ControllerServer<B> {
  fn name(&self) -> &str {
    &self.driver_name
  }

  fn version(&self) -> &str {
    env!("CARGO_PKG_VERSION")
  }
}

#[async_trait]
impl<B: DiskBackend> ControllerService for ControllerServer<B> {
  fn capabilities(&self) -> ControllerCapabilities {
    supported_capabilities()
  }

  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError> {
    let access_type = resolve_access_type(request.volume_capabilities())?;

    if let Some(source) = request.volume_content_source() {
      return Err(CreateVolumeError::Unsupported(format!(
        "VolumeContentSource features unsupported: {:?}",
        source
      )));
    }

    let spec = DiskSpec {
      name: request.name().to_owned(),
      size_bytes: request.required_bytes(),
      access_type,
      fs_type: requested_fs_type(request.volume_capabilities()),
      parameters: request.parameters().clone(),
    };

    let volume = self.registry.create_or_get(spec).await.map_err(|err| {
      warn!(name = request.name(), error = %error_chain(&err), "create volume failed");
      err
    })?;

    Ok(Volume::new(volume.id, volume.size_bytes, volume.volume_context))
  }

  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError> {
    self
      .registry
      .delete(request.volume_id())
      .await
      .map_err(|err| {
        warn!(
          volume_id = request.volume_id(),
          error = %error_chain(&err),
          "delete volume failed"
        );
        err
      })?;

    Ok(())
  }
}
