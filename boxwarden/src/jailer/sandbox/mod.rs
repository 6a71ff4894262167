//! Sandbox abstraction for isolation-mechanism-specific process wrapping
//! (spec §4.5 "Isolation Runtime").
//!
//! This module provides the [`Sandbox`] trait — the internal mechanism that
//! wraps a command with isolation at spawn time. Callers don't use
//! `Sandbox` directly; they go through [`Jailer`](super::Jailer), which
//! translates a [`SandboxCreateRequest`](boxwarden_shared::types::SandboxCreateRequest)
//! into a [`SandboxContext`] and picks the variant named by
//! `runtime_variant`.
//!
//! # Implementations
//!
//! | Sandbox | Variant | Mechanism |
//! |---------|---------|-----------|
//! | [`BwrapSandbox`] | `Namespace` | bubblewrap / Linux namespaces |
//! | [`ContainerSandbox`] | `Container` | docker/podman subprocess |
//! | [`MockSandbox`] | `Mock` | no isolation, synthetic success |
//! | [`NoopSandbox`] | n/a | passthrough, used when jailing is disabled |

#[cfg(target_os = "linux")]
mod bwrap;
mod container;
mod mock;

#[cfg(target_os = "linux")]
pub use bwrap::BwrapSandbox;
pub use container::ContainerSandbox;
pub use mock::MockSandbox;

use std::path::{Path, PathBuf};
use std::process::Command;

use boxwarden_shared::errors::WardenResult;
use boxwarden_shared::types::{NetworkPolicy, ResourceLimits};

/// Platform-specific or mechanism-specific sandbox wrapping.
///
/// Each implementation is a zero-sized unit struct — no runtime cost,
/// monomorphized at compile time via [`Jailer<S>`](super::Jailer).
pub trait Sandbox: Send + Sync {
    /// Whether the sandbox mechanism is installed and usable on this host.
    fn is_available(&self) -> bool;

    /// Pre-spawn setup (cgroups, user-namespace preflight). Called from
    /// the parent process before spawning.
    fn setup(&self, ctx: &SandboxContext) -> WardenResult<()>;

    /// Wrap `binary`/`args` with isolation. Assumes `is_available()` is
    /// true; the caller checks first.
    fn wrap(&self, ctx: &SandboxContext, binary: &Path, args: &[String]) -> Command;

    /// Cgroup procs path for the `pre_exec` hook to join, if this
    /// mechanism uses cgroups.
    fn cgroup_procs_path(&self, ctx: &SandboxContext) -> Option<std::ffi::CString>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// A filesystem path with access permissions for the sandbox.
///
/// Pre-computed by [`Jailer`](super::Jailer) from the sandbox's mount
/// point; sandbox implementations translate these into mechanism-specific
/// binds (bwrap: `--bind`/`--ro-bind`; container: `-v host:guest[:ro]`).
#[derive(Debug, Clone)]
pub struct PathAccess {
    pub path: PathBuf,
    pub writable: bool,
}

/// What the sandbox needs to do its job, translated from
/// [`SandboxCreateRequest`](boxwarden_shared::types::SandboxCreateRequest)
/// by [`Jailer`](super::Jailer). The sandbox never sees the full request —
/// only the fields relevant to spawning.
pub struct SandboxContext<'a> {
    /// Identifier for resource naming (cgroups, logging).
    pub id: &'a str,
    /// Pre-computed filesystem path access rules; in practice a single
    /// entry binding the enforcing filesystem's mount point.
    pub paths: Vec<PathAccess>,
    pub resource_limits: &'a ResourceLimits,
    pub network: NetworkPolicy,
    /// Container image reference, used only by [`ContainerSandbox`].
    pub container_image: Option<&'a str>,
}

impl SandboxContext<'_> {
    pub fn writable_paths(&self) -> impl Iterator<Item = &PathAccess> {
        self.paths.iter().filter(|p| p.writable)
    }

    pub fn readonly_paths(&self) -> impl Iterator<Item = &PathAccess> {
        self.paths.iter().filter(|p| !p.writable)
    }
}

/// The sandbox used when no isolation mechanism is requested or available.
///
/// All other sandboxes are selected explicitly via
/// [`RuntimeVariant`](boxwarden_shared::types::RuntimeVariant); this is the
/// single point where platform dispatch for the namespace-based mechanism
/// happens.
#[cfg(target_os = "linux")]
pub type PlatformSandbox = BwrapSandbox;

#[cfg(not(target_os = "linux"))]
pub type PlatformSandbox = NoopSandbox;

/// Passthrough sandbox that applies no isolation. Used on unsupported
/// platforms or when the caller explicitly disables jailing.
#[derive(Debug, Default)]
pub struct NoopSandbox;

impl NoopSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Sandbox for NoopSandbox {
    fn is_available(&self) -> bool {
        true
    }

    fn setup(&self, _ctx: &SandboxContext) -> WardenResult<()> {
        Ok(())
    }

    fn wrap(&self, _ctx: &SandboxContext, binary: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(args);
        cmd
    }

    fn cgroup_procs_path(&self, _ctx: &SandboxContext) -> Option<std::ffi::CString> {
        None
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
