//! [`JailerBuilder`] for constructing a [`Jailer`].

use std::path::PathBuf;

use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{NetworkPolicy, ResourceLimits};

use super::Jailer;
use super::sandbox::{PlatformSandbox, Sandbox};

/// Builder for constructing a [`Jailer`]. Uses a consuming builder
/// pattern — each method takes ownership and returns the modified
/// builder, enabling fluent chains.
///
/// ```ignore
/// let jail = JailerBuilder::new()
///     .with_id("sandbox-1")
///     .with_mount_point("/workspace")
///     .with_resource_limits(limits)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct JailerBuilder {
    id: Option<String>,
    mount_point: Option<PathBuf>,
    resource_limits: ResourceLimits,
    network: NetworkPolicy,
    container_image: Option<String>,
    enabled: bool,
}

impl JailerBuilder {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = Some(mount_point.into());
        self
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    pub fn with_container_image(mut self, image: impl Into<String>) -> Self {
        self.container_image = Some(image.into());
        self
    }

    /// Enable or disable jailer isolation. Disabled jailers always return
    /// a direct (unwrapped) command — used for the `Mock` runtime variant
    /// and for tests.
    pub fn with_jailer_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build with the platform-default sandbox (`BwrapSandbox` on Linux,
    /// `NoopSandbox` elsewhere).
    pub fn build(self) -> WardenResult<Jailer<PlatformSandbox>> {
        self.build_with(PlatformSandbox::new())
    }

    /// Build with an explicit sandbox implementation — used to select the
    /// `Container`/`Mock` runtime variants, or to inject a test double.
    pub fn build_with<S: Sandbox>(self, sandbox: S) -> WardenResult<Jailer<S>> {
        let id = self
            .id
            .ok_or_else(|| WardenError::Validation("jailer id is required".to_string()))?;
        let mount_point = self
            .mount_point
            .ok_or_else(|| WardenError::Validation("jailer mount_point is required".to_string()))?;

        Ok(Jailer {
            sandbox,
            id,
            mount_point,
            resource_limits: self.resource_limits,
            network: self.network,
            container_image: self.container_image,
            enabled: self.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jailer::{Jail, NoopSandbox};
    use std::path::Path;

    #[test]
    fn builder_requires_id() {
        let result = JailerBuilder::new().with_mount_point("/workspace").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_requires_mount_point() {
        let result = JailerBuilder::new().with_id("sandbox-1").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_basic() {
        let jail = JailerBuilder::new()
            .with_id("sandbox-1")
            .with_mount_point("/workspace")
            .build_with(NoopSandbox::new())
            .unwrap();

        assert_eq!(jail.id(), "sandbox-1");
        assert_eq!(jail.mount_point(), Path::new("/workspace"));
    }

    #[test]
    fn builder_with_resource_limits() {
        let limits = ResourceLimits {
            memory_bytes: Some(256 * 1024 * 1024),
            cpu_quota: None,
            process_limit: Some(32),
        };
        let jail = JailerBuilder::new()
            .with_id("sandbox-1")
            .with_mount_point("/workspace")
            .with_resource_limits(limits)
            .build_with(NoopSandbox::new())
            .unwrap();

        assert_eq!(jail.resource_limits().process_limit, Some(32));
    }

    #[test]
    fn disabled_jailer_bypasses_sandbox_wrap() {
        let jail = JailerBuilder::new()
            .with_id("sandbox-1")
            .with_mount_point("/workspace")
            .with_jailer_enabled(false)
            .build_with(NoopSandbox::new())
            .unwrap();

        let cmd = jail.command(Path::new("/bin/true"), &[]);
        assert_eq!(cmd.get_program(), "/bin/true");
    }
}
