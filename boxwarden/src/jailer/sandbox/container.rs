//! ContainerSandbox — `RuntimeVariant::Container` (spec §4.5): isolation
//! via a `docker`/`podman` subprocess instead of direct namespace
//! manipulation.

use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use boxwarden_shared::errors::{WardenError, WardenResult};

use super::{Sandbox, SandboxContext};

static CONTAINER_RUNTIME: OnceLock<Option<&'static str>> = OnceLock::new();

/// Locate a usable container runtime binary, preferring `docker` then
/// falling back to `podman`.
fn container_runtime() -> Option<&'static str> {
    *CONTAINER_RUNTIME.get_or_init(|| {
        for candidate in ["docker", "podman"] {
            if Command::new(candidate)
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
        }
        None
    })
}

#[derive(Debug, Default)]
pub struct ContainerSandbox;

impl ContainerSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Sandbox for ContainerSandbox {
    fn is_available(&self) -> bool {
        container_runtime().is_some()
    }

    fn setup(&self, ctx: &SandboxContext) -> WardenResult<()> {
        if ctx.container_image.is_none() {
            return Err(WardenError::Validation(
                "container runtime variant requires a container_image".to_string(),
            ));
        }
        Ok(())
    }

    fn wrap(&self, ctx: &SandboxContext, binary: &Path, args: &[String]) -> Command {
        let runtime = container_runtime().unwrap_or("docker");
        let mut cmd = Command::new(runtime);
        cmd.arg("run").arg("--rm").arg("-i");

        for pa in ctx.readonly_paths() {
            cmd.arg("-v").arg(format!(
                "{}:{}:ro",
                pa.path.display(),
                pa.path.display()
            ));
        }
        for pa in ctx.writable_paths() {
            cmd.arg("-v")
                .arg(format!("{}:{}", pa.path.display(), pa.path.display()));
        }

        if ctx.network == boxwarden_shared::types::NetworkPolicy::None {
            cmd.arg("--network").arg("none");
        }

        if let Some(memory_bytes) = ctx.resource_limits.memory_bytes {
            cmd.arg("--memory").arg(memory_bytes.to_string());
        }
        if let Some(process_limit) = ctx.resource_limits.process_limit {
            cmd.arg("--pids-limit").arg(process_limit.to_string());
        }

        let image = ctx.container_image.unwrap_or("alpine:latest");
        cmd.arg(image);
        cmd.arg(binary);
        cmd.args(args);
        cmd
    }

    fn cgroup_procs_path(&self, _ctx: &SandboxContext) -> Option<std::ffi::CString> {
        // The container runtime manages its own cgroup; we don't join it
        // from a pre_exec hook.
        None
    }

    fn name(&self) -> &'static str {
        "container"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxwarden_shared::types::{NetworkPolicy, ResourceLimits};

    #[test]
    fn setup_requires_container_image() {
        let limits = ResourceLimits::default();
        let ctx = SandboxContext {
            id: "test",
            paths: vec![],
            resource_limits: &limits,
            network: NetworkPolicy::None,
            container_image: None,
        };
        let sandbox = ContainerSandbox::new();
        assert!(sandbox.setup(&ctx).is_err());
    }

    #[test]
    fn wrap_includes_image_and_binary() {
        let limits = ResourceLimits::default();
        let ctx = SandboxContext {
            id: "test",
            paths: vec![],
            resource_limits: &limits,
            network: NetworkPolicy::None,
            container_image: Some("alpine:3.19"),
        };
        let sandbox = ContainerSandbox::new();
        let cmd = sandbox.wrap(&ctx, Path::new("/bin/sh"), &["-c".to_string(), "true".to_string()]);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"alpine:3.19".to_string()));
        assert!(args.contains(&"--network".to_string()));
    }
}
