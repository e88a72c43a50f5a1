mod capabilities;
mod create_volume;
mod delete_volume;

use crate::{
  plugin, proto,
  utils::{record_request, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::instrument;

pub use crate::volume::*;
pub use capabilities::*;
pub use create_volume::*;
pub use delete_volume::*;

use proto::controller_service_capability::rpc::Type as Rpc;

#[async_trait]
pub trait ControllerService: IdentityService {
  /// Get the set of services provided by this controller.
  #[inline]
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::empty()
  }

  /// A Controller Plugin MUST implement this RPC call if it has `CREATE_DELETE_VOLUME`
  /// controller capability.
  ///
  /// This RPC will be called by the CO to provision a new volume on behalf of a user
  /// (to be consumed as either a block device or a mounted filesystem).
  ///
  /// This operation MUST be idempotent.
  ///
  /// If a volume corresponding to the specified volume `name` already exists, is
  /// accessible from `accessibility_requirements`, and is compatible with the specified
  /// `capacity_range`, `volume_capabilities` and `parameters` in the `CreateVolumeRequest`,
  /// the Plugin MUST reply `0 OK` with the corresponding `CreateVolumeResponse`.
  #[allow(unused_variables)]
  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError> {
    unsupported!("CreateVolume")
  }

  /// A Controller Plugin MUST implement this RPC call if it has CREATE_DELETE_VOLUME capability.
  /// This RPC will be called by the CO to deprovision a volume.
  ///
  /// This operation MUST be idempotent. If a volume corresponding to the specified volume_id
  /// does not exist or the artifacts associated with the volume do not exist anymore, the
  /// Plugin MUST reply 0 OK.
  #[allow(unused_variables)]
  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError> {
    unsupported!("DeleteVolume")
  }

  /// Makes a volume available on a given node. Needs `PUBLISH_UNPUBLISH_VOLUME`.
  #[allow(unused_variables)]
  async fn controller_publish_volume(
    &self,
    request: proto::ControllerPublishVolumeRequest,
  ) -> Result<proto::ControllerPublishVolumeResponse, tonic::Status> {
    unsupported!("ControllerPublishVolume")
  }

  /// Reverse of `controller_publish_volume`. Needs `PUBLISH_UNPUBLISH_VOLUME`.
  #[allow(unused_variables)]
  async fn controller_unpublish_volume(
    &self,
    request: proto::ControllerUnpublishVolumeRequest,
  ) -> Result<proto::ControllerUnpublishVolumeResponse, tonic::Status> {
    unsupported!("ControllerUnpublishVolume")
  }

  /// Checks whether a pre-provisioned volume has all the capabilities the CO wants.
  #[allow(unused_variables)]
  async fn validate_volume_capabilities(
    &self,
    request: proto::ValidateVolumeCapabilitiesRequest,
  ) -> Result<proto::ValidateVolumeCapabilitiesResponse, tonic::Status> {
    unsupported!("ValidateVolumeCapabilities")
  }

  /// Lists all volumes the plugin knows about. Needs `LIST_VOLUMES`.
  #[allow(unused_variables)]
  async fn list_volumes(
    &self,
    request: proto::ListVolumesRequest,
  ) -> Result<proto::ListVolumesResponse, tonic::Status> {
    unsupported!("ListVolumes")
  }

  /// Reports the capacity of the storage pool. Needs `GET_CAPACITY`.
  #[allow(unused_variables)]
  async fn get_capacity(
    &self,
    request: proto::GetCapacityRequest,
  ) -> Result<proto::GetCapacityResponse, tonic::Status> {
    unsupported!("GetCapacity")
  }

  /// Cuts a snapshot of a source volume. Needs `CREATE_DELETE_SNAPSHOT`.
  #[allow(unused_variables)]
  async fn create_snapshot(
    &self,
    request: proto::CreateSnapshotRequest,
  ) -> Result<proto::CreateSnapshotResponse, tonic::Status> {
    unsupported!("CreateSnapshot")
  }

  /// Needs `CREATE_DELETE_SNAPSHOT`.
  #[allow(unused_variables)]
  async fn delete_snapshot(
    &self,
    request: proto::DeleteSnapshotRequest,
  ) -> Result<proto::DeleteSnapshotResponse, tonic::Status> {
    unsupported!("DeleteSnapshot")
  }

  /// Needs `LIST_SNAPSHOTS`.
  #[allow(unused_variables)]
  async fn list_snapshots(
    &self,
    request: proto::ListSnapshotsRequest,
  ) -> Result<proto::ListSnapshotsResponse, tonic::Status> {
    unsupported!("ListSnapshots")
  }

  /// Grows a volume. Needs `EXPAND_VOLUME`.
  #[allow(unused_variables)]
  async fn controller_expand_volume(
    &self,
    request: proto::ControllerExpandVolumeRequest,
  ) -> Result<proto::ControllerExpandVolumeResponse, tonic::Status> {
    unsupported!("ControllerExpandVolume")
  }

  /// Fetches current information about a volume. Needs `GET_VOLUME`.
  #[allow(unused_variables)]
  async fn controller_get_volume(
    &self,
    request: proto::ControllerGetVolumeRequest,
  ) -> Result<proto::ControllerGetVolumeResponse, tonic::Status> {
    unsupported!("ControllerGetVolume")
  }
}

/// Serves a [`ControllerService`] over the generated tonic Identity and
/// Controller servers.
pub struct Controller<T: ControllerService>(Arc<T>);

impl<T: ControllerService> Controller<T> {
  pub fn new(service: Arc<T>) -> Self {
    Controller(service)
  }

  pub fn identity_server(&self) -> proto::identity_server::IdentityServer<Self> {
    proto::identity_server::IdentityServer::new(self.clone())
  }

  pub fn controller_server(&self) -> proto::controller_server::ControllerServer<Self> {
    proto::controller_server::ControllerServer::new(self.clone())
  }
}

impl<T: ControllerService> Clone for Controller<T> {
  fn clone(&self) -> Self {
    Controller(self.0.clone())
  }
}

#[async_trait]
impl<T: ControllerService> proto::identity_server::Identity for Controller<T> {
  #[instrument(
    name = "identity.get_plugin_info",
    skip(self, _request),
    fields(name, vendor_version, manifest)
  )]
  async fn get_plugin_info(
    &self,
    _request: tonic::Request<proto::GetPluginInfoRequest>,
  ) -> Result<tonic::Response<proto::GetPluginInfoResponse>, tonic::Status> {
    let response = proto::GetPluginInfoResponse {
      name: self.0.name().record_field("name").into(),
      vendor_version: self.0.version().record_field("vendor_version").into(),
      manifest: self.0.manifest().record_field("manifest").clone(),
    };

    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "identity.get_plugin_capabilities",
    skip(self, _request),
    fields(response)
  )]
  async fn get_plugin_capabilities(
    &self,
    _request: tonic::Request<proto::GetPluginCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::GetPluginCapabilitiesResponse>, tonic::Status> {
    let response = plugin::get_capabilities(&*self.0).record_response();

    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "identity.probe", skip(self, _request), fields(ready))]
  async fn probe(
    &self,
    _request: tonic::Request<proto::ProbeRequest>,
  ) -> Result<tonic::Response<proto::ProbeResponse>, tonic::Status> {
    let response = proto::ProbeResponse {
      ready: Some(self.0.ready().record_field("ready")),
    };

    Ok(tonic::Response::new(response))
  }
}

#[async_trait]
impl<T: ControllerService> proto::controller_server::Controller for Controller<T> {
  #[instrument(
    name = "controller.create_volume",
    skip(self, request),
    fields(request, response)
  )]
  async fn create_volume(
    &self,
    request: tonic::Request<proto::CreateVolumeRequest>,
  ) -> Result<tonic::Response<proto::CreateVolumeResponse>, tonic::Status> {
    self.0.capabilities().require(Rpc::CreateDeleteVolume)?;
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .create_volume(request)
      .await?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.delete_volume",
    skip(self, request),
    fields(request)
  )]
  async fn delete_volume(
    &self,
    request: tonic::Request<proto::DeleteVolumeRequest>,
  ) -> Result<tonic::Response<proto::DeleteVolumeResponse>, tonic::Status> {
    self.0.capabilities().require(Rpc::CreateDeleteVolume)?;
    let request = record_request(request.into_inner().try_into()?);
    self.0.delete_volume(request).await?;
    let response = proto::DeleteVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_publish_volume",
    skip(self, request),
    fields(volume_id = %request.get_ref().volume_id, node_id = %request.get_ref().node_id, response)
  )]
  async fn controller_publish_volume(
    &self,
    request: tonic::Request<proto::ControllerPublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerPublishVolumeResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self
      .0
      .controller_publish_volume(request)
      .await?
      .record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_unpublish_volume",
    skip(self, request),
    fields(volume_id = %request.get_ref().volume_id, node_id = %request.get_ref().node_id)
  )]
  async fn controller_unpublish_volume(
    &self,
    request: tonic::Request<proto::ControllerUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerUnpublishVolumeResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.controller_unpublish_volume(request).await?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.validate_volume_capabilities",
    skip(self, request),
    fields(volume_id = %request.get_ref().volume_id, response)
  )]
  async fn validate_volume_capabilities(
    &self,
    request: tonic::Request<proto::ValidateVolumeCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ValidateVolumeCapabilitiesResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self
      .0
      .validate_volume_capabilities(request)
      .await?
      .record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.list_volumes",
    skip(self, request),
    fields(response)
  )]
  async fn list_volumes(
    &self,
    request: tonic::Request<proto::ListVolumesRequest>,
  ) -> Result<tonic::Response<proto::ListVolumesResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.list_volumes(request).await?.record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.get_capacity",
    skip(self, request),
    fields(response)
  )]
  async fn get_capacity(
    &self,
    request: tonic::Request<proto::GetCapacityRequest>,
  ) -> Result<tonic::Response<proto::GetCapacityResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.get_capacity(request).await?.record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_get_capabilities",
    skip(self),
    fields(response)
  )]
  async fn controller_get_capabilities(
    &self,
    _: tonic::Request<proto::ControllerGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetCapabilitiesResponse>, tonic::Status> {
    let response = self.0.capabilities().record_response().try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.create_snapshot",
    skip(self, request),
    fields(
      name = %request.get_ref().name,
      source_volume_id = %request.get_ref().source_volume_id,
      response,
    )
  )]
  async fn create_snapshot(
    &self,
    request: tonic::Request<proto::CreateSnapshotRequest>,
  ) -> Result<tonic::Response<proto::CreateSnapshotResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.create_snapshot(request).await?.record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.delete_snapshot",
    skip(self, request),
    fields(snapshot_id = %request.get_ref().snapshot_id)
  )]
  async fn delete_snapshot(
    &self,
    request: tonic::Request<proto::DeleteSnapshotRequest>,
  ) -> Result<tonic::Response<proto::DeleteSnapshotResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.delete_snapshot(request).await?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.list_snapshots",
    skip(self, request),
    fields(
      snapshot_id = %request.get_ref().snapshot_id,
      source_volume_id = %request.get_ref().source_volume_id,
      response,
    )
  )]
  async fn list_snapshots(
    &self,
    request: tonic::Request<proto::ListSnapshotsRequest>,
  ) -> Result<tonic::Response<proto::ListSnapshotsResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self.0.list_snapshots(request).await?.record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_expand_volume",
    skip(self, request),
    fields(volume_id = %request.get_ref().volume_id, response)
  )]
  async fn controller_expand_volume(
    &self,
    request: tonic::Request<proto::ControllerExpandVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerExpandVolumeResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self
      .0
      .controller_expand_volume(request)
      .await?
      .record_response();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_get_volume",
    skip(self, request),
    fields(volume_id = %request.get_ref().volume_id, response)
  )]
  async fn controller_get_volume(
    &self,
    request: tonic::Request<proto::ControllerGetVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetVolumeResponse>, tonic::Status> {
    let request = request.into_inner();
    let response = self
      .0
      .controller_get_volume(request)
      .await?
      .record_response();
    Ok(tonic::Response::new(response))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proto::controller_server::Controller as _;
  use proto::identity_server::Identity as _;
  use tonic::{Code, Request};

  /// A plugin that only advertises capabilities and implements nothing.
  struct Bare(ControllerCapabilities);

  impl IdentityService for Bare {
    fn name(&self) -> &str {
      "bare.csi"
    }

    fn version(&self) -> &str {
      "1.2.3"
    }
  }

  impl ControllerService for Bare {
    fn capabilities(&self) -> ControllerCapabilities {
      self.0
    }
  }

  fn controller(capabilities: ControllerCapabilities) -> Controller<Bare> {
    Controller::new(Arc::new(Bare(capabilities)))
  }

  fn create_request(name: &str) -> proto::CreateVolumeRequest {
    proto::CreateVolumeRequest {
      name: name.into(),
      volume_capabilities: vec![proto::VolumeCapability {
        access_mode: None,
        access_type: Some(proto::volume_capability::AccessType::Mount(
          Default::default(),
        )),
      }],
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn stubs_report_unimplemented() {
    let c = controller(ControllerCapabilities::all());

    let err = c
      .controller_publish_volume(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .controller_unpublish_volume(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .validate_volume_capabilities(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .list_volumes(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .get_capacity(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .create_snapshot(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .delete_snapshot(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .list_snapshots(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .controller_expand_volume(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .controller_get_volume(Request::new(Default::default()))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
  }

  #[derive(Clone, Default)]
  struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn stub_spans_never_carry_secrets() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_ansi(false)
      .with_writer(move || writer.clone())
      .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let mut secrets = std::collections::HashMap::new();
    secrets.insert("token".to_owned(), "s3cr3t".to_owned());

    let c = controller(ControllerCapabilities::all());
    c.controller_publish_volume(Request::new(proto::ControllerPublishVolumeRequest {
      volume_id: "vol-1".into(),
      node_id: "node-1".into(),
      secrets: secrets.clone(),
      ..Default::default()
    }))
    .await
    .unwrap_err();
    c.create_snapshot(Request::new(proto::CreateSnapshotRequest {
      source_volume_id: "vol-1".into(),
      name: "snap".into(),
      secrets: secrets.clone(),
      ..Default::default()
    }))
    .await
    .unwrap_err();
    c.controller_expand_volume(Request::new(proto::ControllerExpandVolumeRequest {
      volume_id: "vol-1".into(),
      secrets,
      ..Default::default()
    }))
    .await
    .unwrap_err();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("controller.controller_publish_volume"));
    assert!(output.contains("vol-1"));
    assert!(!output.contains("s3cr3t"));
  }

  #[tokio::test]
  async fn create_volume_is_gated_by_capability() {
    let c = controller(ControllerCapabilities::EXPAND_VOLUME);
    let err = c
      .create_volume(Request::new(create_request("a")))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);

    let err = c
      .delete_volume(Request::new(proto::DeleteVolumeRequest {
        volume_id: "a".into(),
        ..Default::default()
      }))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[tokio::test]
  async fn capability_gate_runs_before_request_validation() {
    let c = controller(ControllerCapabilities::empty());
    let err = c
      .create_volume(Request::new(create_request("")))
      .await
      .unwrap_err();
    assert!(err.message().contains("capability unsupported"));
  }

  #[tokio::test]
  async fn create_volume_falls_through_to_service() {
    let c = controller(ControllerCapabilities::CREATE_DELETE_VOLUME);
    let err = c
      .create_volume(Request::new(create_request("a")))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = c
      .create_volume(Request::new(create_request("")))
      .await
      .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[tokio::test]
  async fn identity() {
    let c = controller(ControllerCapabilities::empty());

    let info = c
      .get_plugin_info(Request::new(proto::GetPluginInfoRequest {}))
      .await
      .unwrap()
      .into_inner();
    assert_eq!(info.name, "bare.csi");
    assert_eq!(info.vendor_version, "1.2.3");
    assert!(info.manifest.is_empty());

    let probe = c
      .probe(Request::new(proto::ProbeRequest {}))
      .await
      .unwrap()
      .into_inner();
    assert_eq!(probe.ready, Some(true));
  }

  #[tokio::test]
  async fn get_capabilities_lists_advertised_set() {
    let c = controller(ControllerCapabilities::CREATE_DELETE_VOLUME);
    let response = c
      .controller_get_capabilities(Request::new(proto::ControllerGetCapabilitiesRequest {}))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(response.capabilities.len(), 1);
  }
}
