use super::{VolumeCapability, VolumeContentSource};
use crate::proto;
use std::{collections::HashMap, convert::TryFrom};
use thiserror::Error;

#[derive(Debug)]
pub struct CreateVolumeRequest {
  name: String,
  required_bytes: u64,
  limit_bytes: Option<u64>,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
  volume_content_source: Option<VolumeContentSource>,
}

impl CreateVolumeRequest {
  /// The suggested name for the storage space. This field is REQUIRED.
  /// It serves two purposes:
  /// 1) Idempotency - This name is generated by the CO to achieve
  ///    idempotency. The Plugin SHOULD ensure that multiple
  ///    `CreateVolume` calls for the same name do not result in more
  ///    than one piece of storage provisioned corresponding to that
  ///    name.
  /// 2) Suggested name - Some storage systems allow callers to specify
  ///    an identifier by which to refer to the newly provisioned
  ///    storage.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The minimum size the volume must have, 0 when the CO did not ask
  /// for a capacity range.
  #[inline]
  pub fn required_bytes(&self) -> u64 {
    self.required_bytes
  }

  #[inline]
  pub fn limit_bytes(&self) -> Option<u64> {
    self.limit_bytes
  }

  /// The capabilities that the provisioned volume MUST have. Never empty.
  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }

  /// Plugin specific parameters passed in as opaque key-value pairs.
  #[inline]
  pub fn parameters(&self) -> &HashMap<String, String> {
    &self.parameters
  }

  /// Set when the CO wants the volume pre-populated from a snapshot or
  /// another volume.
  #[inline]
  pub fn volume_content_source(&self) -> Option<&VolumeContentSource> {
    self.volume_content_source.as_ref()
  }
}

impl TryFrom<proto::CreateVolumeRequest> for CreateVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::CreateVolumeRequest) -> Result<Self, Self::Error> {
    let name = match value.name {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "CreateVolumeRequest.name is empty",
        ))
      }
      v => v,
    };

    let volume_capabilities = match value.volume_capabilities {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "Missing CreateVolumeRequest.volume_capabilities",
        ))
      }
      v => v.into_iter().map(Into::into).collect(),
    };

    let (required_bytes, limit_bytes) = match value.capacity_range {
      None => (0, None),
      Some(range) => {
        let required = u64::try_from(range.required_bytes).map_err(|_| {
          tonic::Status::invalid_argument("CapacityRange.required_bytes cannot be negative")
        })?;
        let limit = u64::try_from(range.limit_bytes).map_err(|_| {
          tonic::Status::invalid_argument("CapacityRange.limit_bytes cannot be negative")
        })?;
        (required, Some(limit).filter(|l| *l != 0))
      }
    };

    let volume_content_source = value
      .volume_content_source
      .map(VolumeContentSource::try_from)
      .transpose()?;

    Ok(CreateVolumeRequest {
      name,
      required_bytes,
      limit_bytes,
      volume_capabilities,
      parameters: value.parameters,
      volume_content_source,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CreateVolumeError {
  /// A volume with the requested name exists but is incompatible with the
  /// specified capacity, capabilities or parameters.
  #[error("Volume already exists but is incompatible: {0}")]
  AlreadyExists(String),

  /// The request asks for something this plugin cannot provide, such as
  /// contradictory access types or a content source.
  #[error("{0}")]
  Unsupported(String),

  /// Provisioning failed inside the plugin. The message carries the cause chain.
  #[error("{0}")]
  Internal(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<CreateVolumeError> for tonic::Status {
  fn from(value: CreateVolumeError) -> Self {
    use tonic::{Code, Status};

    match value {
      CreateVolumeError::Other(v) => v,
      value => {
        let code = match &value {
          CreateVolumeError::AlreadyExists(_) => Code::AlreadyExists,
          CreateVolumeError::Unsupported(_) => Code::InvalidArgument,
          _ => Code::Internal,
        };

        Status::new(code, value.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;
  use tonic::Code;

  fn mount() -> proto::VolumeCapability {
    proto::VolumeCapability {
      access_mode: None,
      access_type: Some(proto::volume_capability::AccessType::Mount(
        Default::default(),
      )),
    }
  }

  fn request(name: &str, range: Option<(i64, i64)>) -> proto::CreateVolumeRequest {
    proto::CreateVolumeRequest {
      name: name.into(),
      capacity_range: range.map(|(required_bytes, limit_bytes)| proto::CapacityRange {
        required_bytes,
        limit_bytes,
      }),
      volume_capabilities: vec![mount()],
      ..Default::default()
    }
  }

  #[test]
  fn empty_name_is_rejected() {
    let err = CreateVolumeRequest::try_from(request("", None)).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn missing_capabilities_are_rejected() {
    let mut raw = request("a", None);
    raw.volume_capabilities.clear();

    let err = CreateVolumeRequest::try_from(raw).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test_case(None => Ok((0, None)) ; "no capacity range")]
  #[test_case(Some((1024, 0)) => Ok((1024, None)) ; "required only")]
  #[test_case(Some((1024, 4096)) => Ok((1024, Some(4096))) ; "required and limit")]
  #[test_case(Some((-1, 0)) => Err(Code::InvalidArgument) ; "negative required")]
  #[test_case(Some((0, -1)) => Err(Code::InvalidArgument) ; "negative limit")]
  fn capacity(range: Option<(i64, i64)>) -> Result<(u64, Option<u64>), Code> {
    CreateVolumeRequest::try_from(request("a", range))
      .map(|r| (r.required_bytes(), r.limit_bytes()))
      .map_err(|s| s.code())
  }

  #[test]
  fn content_source_is_decoded() {
    let mut raw = request("a", None);
    raw.volume_content_source = Some(proto::VolumeContentSource {
      r#type: Some(proto::volume_content_source::Type::Volume(
        proto::volume_content_source::VolumeSource {
          volume_id: "src".into(),
        },
      )),
    });

    let request = CreateVolumeRequest::try_from(raw).unwrap();
    assert_eq!(
      request.volume_content_source(),
      Some(&VolumeContentSource::Volume("src".into()))
    );
  }

  #[test]
  fn secrets_are_dropped() {
    let mut raw = request("a", None);
    raw
      .secrets
      .insert("token".to_owned(), "s3cr3t".to_owned());

    let request = CreateVolumeRequest::try_from(raw).unwrap();
    let debug = format!("{:?}", request);
    assert!(!debug.contains("s3cr3t"));
  }

  #[test]
  fn error_codes() {
    let status: tonic::Status = CreateVolumeError::AlreadyExists("a".into()).into();
    assert_eq!(status.code(), Code::AlreadyExists);

    let status: tonic::Status = CreateVolumeError::Unsupported("block+mount".into()).into();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "block+mount");

    let status: tonic::Status = CreateVolumeError::Internal("disk: boom".into()).into();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "disk: boom");
  }
}
