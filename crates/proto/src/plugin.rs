use crate::{proto, IdentityService, VolumeExpansionSupport};
use proto::plugin_capability::{service, volume_expansion, Service, Type, VolumeExpansion};
use tracing::debug;

#[inline]
fn service_capability(ty: service::Type) -> proto::PluginCapability {
  proto::PluginCapability {
    r#type: Some(Type::Service(Service { r#type: ty.into() })),
  }
}

#[inline]
fn expansion_capability(ty: volume_expansion::Type) -> proto::PluginCapability {
  proto::PluginCapability {
    r#type: Some(Type::VolumeExpansion(VolumeExpansion { r#type: ty.into() })),
  }
}

/// Plugin capabilities of a plugin that serves the controller service.
pub(crate) fn get_capabilities(s: &impl IdentityService) -> proto::GetPluginCapabilitiesResponse {
  let mut response = proto::GetPluginCapabilitiesResponse::default();
  response
    .capabilities
    .push(service_capability(service::Type::ControllerService));

  let volume_accessibility_constraints_support = s.volume_accessibility_constraints_support();
  if volume_accessibility_constraints_support {
    response
      .capabilities
      .push(service_capability(service::Type::VolumeAccessibilityConstraints));
  }

  let volume_expansion_support = s.volume_expansion_support();
  match volume_expansion_support {
    VolumeExpansionSupport::None => (),
    VolumeExpansionSupport::Offline => response
      .capabilities
      .push(expansion_capability(volume_expansion::Type::Offline)),
    VolumeExpansionSupport::Online => response
      .capabilities
      .push(expansion_capability(volume_expansion::Type::Online)),
  }

  debug!(
    ?volume_accessibility_constraints_support,
    ?volume_expansion_support
  );
  response
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Plugin(VolumeExpansionSupport);

  impl IdentityService for Plugin {
    fn name(&self) -> &str {
      "test.csi"
    }

    fn version(&self) -> &str {
      "0.0.0"
    }

    fn volume_expansion_support(&self) -> VolumeExpansionSupport {
      self.0
    }
  }

  #[test]
  fn always_advertises_controller_service() {
    let response = get_capabilities(&Plugin(VolumeExpansionSupport::None));
    assert_eq!(
      response.capabilities,
      vec![service_capability(service::Type::ControllerService)]
    );
  }

  #[test]
  fn advertises_expansion_mode() {
    let response = get_capabilities(&Plugin(VolumeExpansionSupport::Online));
    assert_eq!(response.capabilities.len(), 2);
    assert_eq!(
      response.capabilities[1],
      expansion_capability(volume_expansion::Type::Online)
    );
  }
}
