//! BwrapSandbox — Linux isolation via bubblewrap namespaces
//! (`RuntimeVariant::Namespace`).

use std::path::Path;
use std::process::Command;

use boxwarden_shared::errors::{WardenError, WardenResult};

use super::{Sandbox, SandboxContext};
use crate::jailer::{bwrap, cgroup, pre_exec};

#[derive(Debug, Default)]
pub struct BwrapSandbox;

impl BwrapSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Sandbox for BwrapSandbox {
    fn is_available(&self) -> bool {
        bwrap::is_available()
    }

    fn setup(&self, ctx: &SandboxContext) -> WardenResult<()> {
        // Preflight: verify bwrap can create user namespaces before
        // proceeding. Uses a Chrome-style clone(CLONE_NEWUSER) probe for
        // diagnosis plus a bwrap probe for the actual capability (handles
        // AppArmor per-binary profiles that block unprivileged userns).
        if bwrap::is_available()
            && let Err(diagnostic) = bwrap::can_create_user_namespace()
        {
            return Err(WardenError::Runtime(format!(
                "sandbox preflight failed: bwrap cannot create user namespaces\n\n{diagnostic}"
            )));
        }

        let cgroup_config = cgroup::CgroupConfig::from(ctx.resource_limits);
        match cgroup::setup_cgroup(ctx.id, &cgroup_config) {
            Ok(path) => {
                tracing::info!(id = %ctx.id, path = %path.display(), "cgroup created");
            }
            Err(e) => {
                tracing::warn!(id = %ctx.id, error = %e, "cgroup setup failed, continuing without resource limits");
            }
        }

        Ok(())
    }

    fn wrap(&self, ctx: &SandboxContext, binary: &Path, args: &[String]) -> Command {
        let mut bwrap_cmd = bwrap::BwrapCommand::new();

        bwrap_cmd
            .with_default_namespaces()
            .with_die_with_parent()
            .with_new_session();

        bwrap_cmd
            .ro_bind_if_exists("/usr", "/usr")
            .ro_bind_if_exists("/lib", "/lib")
            .ro_bind_if_exists("/lib64", "/lib64")
            .ro_bind_if_exists("/bin", "/bin")
            .ro_bind_if_exists("/sbin", "/sbin");

        bwrap_cmd.with_dev().with_proc().tmpfs("/tmp");

        if ctx.network == boxwarden_shared::types::NetworkPolicy::Host {
            bwrap_cmd.share_net();
        }

        // Bind the enforcing filesystem's mount point and any extra
        // paths the caller supplied.
        for pa in ctx.writable_paths() {
            bwrap_cmd.bind(&pa.path, &pa.path);
            tracing::debug!(path = %pa.path.display(), "bwrap: bind (rw)");
        }
        for pa in ctx.readonly_paths() {
            bwrap_cmd.ro_bind(&pa.path, &pa.path);
            tracing::debug!(path = %pa.path.display(), "bwrap: ro-bind");
        }

        bwrap_cmd
            .with_clearenv()
            .setenv("PATH", "/usr/bin:/bin:/usr/sbin:/sbin")
            .setenv("HOME", "/root");

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            bwrap_cmd.setenv("RUST_LOG", rust_log);
        }
        if let Ok(rust_backtrace) = std::env::var("RUST_BACKTRACE") {
            bwrap_cmd.setenv("RUST_BACKTRACE", rust_backtrace);
        }

        bwrap_cmd.chdir("/");

        let mut cmd = bwrap_cmd.build(binary, args);
        pre_exec::add_pre_exec_hook(
            &mut cmd,
            ctx.resource_limits.clone(),
            self.cgroup_procs_path(ctx),
            None,
            vec![],
        );
        cmd
    }

    fn cgroup_procs_path(&self, ctx: &SandboxContext) -> Option<std::ffi::CString> {
        cgroup::build_cgroup_procs_path(ctx.id)
    }

    fn name(&self) -> &'static str {
        "bwrap"
    }
}
