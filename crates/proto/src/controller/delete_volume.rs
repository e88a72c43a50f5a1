use crate::proto;
use std::convert::TryFrom;
use thiserror::Error;

#[derive(Debug)]
pub struct DeleteVolumeRequest {
  volume_id: String,
}

impl DeleteVolumeRequest {
  /// The ID of the volume to be deprovisioned.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }
}

impl TryFrom<proto::DeleteVolumeRequest> for DeleteVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::DeleteVolumeRequest) -> Result<Self, Self::Error> {
    if value.volume_id.is_empty() {
      return Err(tonic::Status::invalid_argument(
        "DeleteVolumeRequest.volume_id is empty",
      ));
    }

    Ok(DeleteVolumeRequest {
      volume_id: value.volume_id,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DeleteVolumeError {
  /// Deprovisioning failed inside the plugin. The message carries the cause chain.
  #[error("{0}")]
  Internal(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<DeleteVolumeError> for tonic::Status {
  fn from(value: DeleteVolumeError) -> tonic::Status {
    use tonic::{Code, Status};

    match value {
      DeleteVolumeError::Internal(v) => Status::new(Code::Internal, v),
      DeleteVolumeError::Other(v) => v,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tonic::Code;

  #[test]
  fn empty_volume_id_is_rejected() {
    let err = DeleteVolumeRequest::try_from(proto::DeleteVolumeRequest::default()).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn volume_id_is_kept() {
    let request = DeleteVolumeRequest::try_from(proto::DeleteVolumeRequest {
      volume_id: "vol-1".into(),
      ..Default::default()
    })
    .unwrap();
    assert_eq!(request.volume_id(), "vol-1");
  }

  #[test]
  fn internal_error_keeps_message() {
    let status: tonic::Status = DeleteVolumeError::Internal("destroy: busy".into()).into();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "destroy: busy");
  }
}
