//! The jailer: translates a sandbox's isolation configuration into a
//! wrapped [`Command`] ready to spawn (spec §4.5 "Isolation Runtime").
//!
//! [`Jailer<S>`] is generic over [`Sandbox`] so the same call site works
//! whether the chosen mechanism is Linux namespaces (`BwrapSandbox`), a
//! container runtime (`ContainerSandbox`), or no isolation at all
//! (`MockSandbox`/`NoopSandbox`). Callers go through the [`Jail`] trait;
//! only [`JailerBuilder`] constructs the concrete sandbox.

pub mod builder;
pub mod bwrap;
pub mod cgroup;
pub mod common;
pub mod credentials;
pub mod pre_exec;
pub mod sandbox;

pub use builder::JailerBuilder;
pub use sandbox::{NoopSandbox, PlatformSandbox, Sandbox};

use std::path::{Path, PathBuf};
use std::process::Command;

use boxwarden_shared::errors::WardenResult;
use boxwarden_shared::types::{NetworkPolicy, ResourceLimits};

use sandbox::{PathAccess, SandboxContext};

/// The subset of jailer behavior callers depend on, decoupled from the
/// concrete `Sandbox` type parameter so trait objects aren't needed at
/// call sites that only ever see one jailer instance.
pub trait Jail {
    /// Preflight checks (userns capability, cgroup setup). Called once,
    /// before the sandbox's first `command()`.
    fn prepare(&self) -> WardenResult<()>;

    /// Build a ready-to-spawn `Command` wrapping `binary`/`args` with
    /// this jailer's isolation mechanism. When the jailer is disabled or
    /// the mechanism isn't available, falls back to a direct command.
    fn command(&self, binary: &Path, args: &[String]) -> Command;

    fn id(&self) -> &str;
}

/// Ties a sandbox mechanism to one sandbox's configuration: its id, the
/// enforcing filesystem mount point to bind in, resource limits, and
/// network policy.
#[derive(Debug)]
pub struct Jailer<S: Sandbox> {
    sandbox: S,
    id: String,
    mount_point: PathBuf,
    resource_limits: ResourceLimits,
    network: NetworkPolicy,
    container_image: Option<String>,
    enabled: bool,
}

impl<S: Sandbox> Jailer<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    fn context(&self) -> SandboxContext<'_> {
        SandboxContext {
            id: &self.id,
            paths: vec![PathAccess {
                path: self.mount_point.clone(),
                writable: true,
            }],
            resource_limits: &self.resource_limits,
            network: self.network,
            container_image: self.container_image.as_deref(),
        }
    }
}

impl<S: Sandbox> Jail for Jailer<S> {
    fn prepare(&self) -> WardenResult<()> {
        if !self.enabled || !self.sandbox.is_available() {
            return Ok(());
        }
        self.sandbox.setup(&self.context())
    }

    fn command(&self, binary: &Path, args: &[String]) -> Command {
        if !self.enabled || !self.sandbox.is_available() {
            let mut cmd = Command::new(binary);
            cmd.args(args);
            return cmd;
        }
        self.sandbox.wrap(&self.context(), binary, args)
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox::{MockSandbox, NoopSandbox};

    fn jailer_with<S: Sandbox>(sandbox: S, enabled: bool) -> Jailer<S> {
        JailerBuilder::new()
            .with_id("test-sandbox")
            .with_mount_point("/workspace")
            .with_jailer_enabled(enabled)
            .build_with(sandbox)
            .unwrap()
    }

    #[test]
    fn disabled_jailer_returns_direct_command() {
        let jail = jailer_with(MockSandbox::new(), false);
        let cmd = jail.command(Path::new("/usr/bin/env"), &["true".to_string()]);
        assert_eq!(cmd.get_program(), "/usr/bin/env");
    }

    #[test]
    fn noop_sandbox_produces_direct_command_even_when_enabled() {
        let jail = jailer_with(NoopSandbox::new(), true);
        let cmd = jail.command(Path::new("/usr/bin/env"), &["true".to_string()]);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, &["true"]);
    }

    #[test]
    fn prepare_is_a_noop_when_jailer_disabled() {
        let jail = jailer_with(MockSandbox::new(), false);
        assert!(jail.prepare().is_ok());
    }
}
