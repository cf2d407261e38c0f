//! Method descriptor the packer reads service naming from.

/// Describes the remote method being invoked: the protobuf service full
/// name, the short method name and, optionally, a service-level
/// `custom_service_id` override.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    service_full_name: String,
    name: String,
    custom_service_id: Option<String>,
}

impl MethodDescriptor {
    pub fn new(service_full_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service_full_name: service_full_name.into(),
            name: name.into(),
            custom_service_id: None,
        }
    }

    pub fn with_custom_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.custom_service_id = Some(service_id.into());
        self
    }

    pub fn service_full_name(&self) -> &str {
        &self.service_full_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn custom_service_id(&self) -> Option<&str> {
        self.custom_service_id.as_deref()
    }
}
