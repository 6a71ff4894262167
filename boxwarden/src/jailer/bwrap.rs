//! Bubblewrap (bwrap) command builder for Linux isolation.
//!
//! ## What Bubblewrap Provides
//!
//! - Namespace isolation (mount, pid, user, ipc, uts)
//! - pivot_root / chroot filesystem isolation
//! - Environment sanitization (--clearenv)
//! - PR_SET_NO_NEW_PRIVS, die-with-parent behavior
//!
//! ## What We Add Outside Bubblewrap
//!
//! - Cgroups v2 setup (before spawn, [`super::cgroup`])
//! - FD cleanup and rlimits inside the sandboxed process
//!   ([`super::common`], [`super::pre_exec`])

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static BWRAP_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Locate the `bwrap` binary in `PATH`. Cached for the process lifetime.
fn get_bwrap_path() -> Option<&'static PathBuf> {
    BWRAP_PATH
        .get_or_init(|| {
            if let Ok(output) = Command::new("bwrap").arg("--version").output()
                && output.status.success()
            {
                tracing::debug!("using system bwrap from PATH");
                return Some(PathBuf::from("bwrap"));
            }
            None
        })
        .as_ref()
}

/// Check if bubblewrap (bwrap) is installed and runnable.
pub fn is_available() -> bool {
    get_bwrap_path().is_some()
}

/// Probe whether bwrap can create user namespaces.
///
/// Performs two checks:
/// 1. **Chrome-style raw probe** — `clone(CLONE_NEWUSER)` for kernel-level
///    diagnosis (captures errno: EPERM, EUSERS, EINVAL, ENOSPC).
/// 2. **bwrap probe** — `bwrap --unshare-user` to test actual bwrap
///    capability (handles AppArmor per-binary profiles where bwrap may
///    work even if our process's clone fails).
///
/// Returns `Ok(())` if working, `Err` with diagnostic guidance otherwise.
pub fn can_create_user_namespace() -> Result<(), String> {
    let bwrap_path = match get_bwrap_path() {
        Some(p) => p,
        None => return Err("bwrap binary not found in PATH".to_string()),
    };

    let clone_errno = match super::credentials::can_create_process_in_new_user_ns() {
        Ok(()) => None,
        Err(errno) => {
            tracing::debug!(
                errno = errno,
                "clone(CLONE_NEWUSER) failed, will still try bwrap (may have an AppArmor profile)"
            );
            Some(errno)
        }
    };

    let output = Command::new(bwrap_path)
        .args(["--unshare-user", "--ro-bind", "/", "/", "--", "true"])
        .output();

    match output {
        Ok(o) if o.status.success() => Ok(()),
        Ok(o) => {
            let stderr = String::from_utf8_lossy(&o.stderr).trim().to_string();
            Err(build_diagnostic(clone_errno, bwrap_path, &stderr))
        }
        Err(e) => Err(format!("failed to run bwrap: {e}")),
    }
}

fn build_diagnostic(clone_errno: Option<i32>, bwrap_path: &Path, bwrap_stderr: &str) -> String {
    let mut msg = format!("bwrap --unshare-user failed (bwrap at {})", bwrap_path.display());

    if !bwrap_stderr.is_empty() {
        msg.push_str(&format!("\nbwrap stderr: {bwrap_stderr}"));
    }

    if let Some(errno) = clone_errno {
        msg.push_str(&format!(
            "\nclone(CLONE_NEWUSER) errno: {} ({})",
            errno,
            std::io::Error::from_raw_os_error(errno)
        ));
    }

    if read_sysctl("kernel/apparmor_restrict_unprivileged_userns").as_deref() == Some("1") {
        msg.push_str(
            "\n\nCause: AppArmor restricts user namespaces \
             (kernel.apparmor_restrict_unprivileged_userns=1).\n\
             Fix: sudo sysctl -w kernel.apparmor_restrict_unprivileged_userns=0",
        );
    } else if read_sysctl("kernel/unprivileged_userns_clone").as_deref() == Some("0") {
        msg.push_str(
            "\n\nCause: Unprivileged user namespaces disabled \
             (kernel.unprivileged_userns_clone=0).\n\
             Fix: sudo sysctl -w kernel.unprivileged_userns_clone=1",
        );
    } else if read_sysctl("user/max_user_namespaces").as_deref() == Some("0") {
        msg.push_str(
            "\n\nCause: Max user namespaces set to zero (user.max_user_namespaces=0).\n\
             Fix: sudo sysctl -w user.max_user_namespaces=15000",
        );
    } else {
        msg.push_str("\n\nCause: unknown restriction. Check: dmesg | grep -i 'apparmor\\|selinux\\|userns'");
    }

    msg
}

fn read_sysctl(name: &str) -> Option<String> {
    std::fs::read_to_string(format!("/proc/sys/{name}"))
        .ok()
        .map(|s| s.trim().to_string())
}

pub fn version() -> Option<String> {
    let bwrap_path = get_bwrap_path()?;
    Command::new(bwrap_path)
        .arg("--version")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
}

/// Builder for constructing bwrap command arguments. Non-consuming: every
/// setter takes `&mut self` so the same builder can be threaded through
/// conditional branches.
#[derive(Debug, Clone, Default)]
pub struct BwrapCommand {
    args: Vec<String>,
}

impl BwrapCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_namespaces(&mut self) -> &mut Self {
        self.args.push("--unshare-user".to_string());
        self.args.push("--unshare-pid".to_string());
        self.args.push("--unshare-ipc".to_string());
        self.args.push("--unshare-uts".to_string());
        self.args.push("--unshare-net".to_string());
        self
    }

    /// Keep the host's network namespace, used for `NetworkPolicy::Host`.
    pub fn share_net(&mut self) -> &mut Self {
        self.args.retain(|a| a != "--unshare-net");
        self
    }

    pub fn with_die_with_parent(&mut self) -> &mut Self {
        self.args.push("--die-with-parent".to_string());
        self
    }

    pub fn with_new_session(&mut self) -> &mut Self {
        self.args.push("--new-session".to_string());
        self
    }

    pub fn ro_bind(&mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> &mut Self {
        self.args.push("--ro-bind".to_string());
        self.args.push(src.as_ref().to_string_lossy().to_string());
        self.args.push(dest.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn ro_bind_if_exists(
        &mut self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> &mut Self {
        if src.as_ref().exists() {
            self.ro_bind(src, dest);
        }
        self
    }

    pub fn bind(&mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> &mut Self {
        self.args.push("--bind".to_string());
        self.args.push(src.as_ref().to_string_lossy().to_string());
        self.args.push(dest.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn dev_bind_if_exists(
        &mut self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> &mut Self {
        if src.as_ref().exists() {
            self.args.push("--dev-bind".to_string());
            self.args.push(src.as_ref().to_string_lossy().to_string());
            self.args.push(dest.as_ref().to_string_lossy().to_string());
        }
        self
    }

    pub fn with_dev(&mut self) -> &mut Self {
        self.args.push("--dev".to_string());
        self.args.push("/dev".to_string());
        self
    }

    pub fn with_proc(&mut self) -> &mut Self {
        self.args.push("--proc".to_string());
        self.args.push("/proc".to_string());
        self
    }

    pub fn tmpfs(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.args.push("--tmpfs".to_string());
        self.args.push(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn with_clearenv(&mut self) -> &mut Self {
        self.args.push("--clearenv".to_string());
        self
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.args.push("--setenv".to_string());
        self.args.push(key.into());
        self.args.push(value.into());
        self
    }

    pub fn with_seccomp_fd(&mut self, fd: i32) -> &mut Self {
        self.args.push("--seccomp".to_string());
        self.args.push(fd.to_string());
        self
    }

    pub fn chdir(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.args.push("--chdir".to_string());
        self.args.push(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Build the command with the specified executable and arguments.
    ///
    /// # Panics
    ///
    /// Panics if bwrap is not available. Always check `is_available()`
    /// before calling.
    pub fn build(&self, executable: impl AsRef<Path>, args: &[String]) -> Command {
        let bwrap_path = get_bwrap_path()
            .expect("BwrapCommand::build() called but bwrap is not available");

        let mut cmd = Command::new(bwrap_path);
        cmd.args(&self.args);
        cmd.arg("--");
        cmd.arg(executable.as_ref());
        cmd.args(args);
        cmd
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bwrap_available() {
        let available = is_available();
        println!("bwrap available: {available}");
        if available {
            println!("bwrap version: {:?}", version());
        }
    }

    #[test]
    fn test_bwrap_command_builder() {
        let mut bwrap = BwrapCommand::new();
        bwrap
            .with_default_namespaces()
            .with_die_with_parent()
            .ro_bind("/usr", "/usr")
            .with_dev()
            .with_proc()
            .tmpfs("/tmp")
            .with_clearenv()
            .setenv("PATH", "/usr/bin:/bin");

        let args = bwrap.get_args();
        assert!(args.contains(&"--unshare-user".to_string()));
        assert!(args.contains(&"--unshare-pid".to_string()));
        assert!(args.contains(&"--die-with-parent".to_string()));
        assert!(args.contains(&"--clearenv".to_string()));
        assert!(args.contains(&"--unshare-net".to_string()));
    }

    #[test]
    fn test_share_net_removes_unshare_net() {
        let mut bwrap = BwrapCommand::new();
        bwrap.with_default_namespaces().share_net();
        assert!(!bwrap.get_args().contains(&"--unshare-net".to_string()));
    }

    #[test]
    fn test_build_command() {
        if !is_available() {
            println!("skipping: bwrap not available");
            return;
        }
        let mut bwrap = BwrapCommand::new();
        bwrap.with_default_namespaces().with_clearenv().setenv("FOO", "bar");

        let cmd = bwrap.build(
            Path::new("/usr/bin/echo"),
            &["hello".to_string(), "world".to_string()],
        );
        let program = cmd.get_program().to_string_lossy();
        assert!(program.ends_with("bwrap") || program == "bwrap");
    }

    #[test]
    fn test_bwrap_non_consuming_pattern() {
        let mut bwrap = BwrapCommand::new();
        bwrap.with_default_namespaces();
        bwrap.ro_bind("/usr", "/usr");
        bwrap.with_clearenv();

        let args = bwrap.get_args();
        assert!(args.contains(&"--unshare-user".to_string()));
        assert!(args.contains(&"--ro-bind".to_string()));
        assert!(args.contains(&"--clearenv".to_string()));
    }

    #[test]
    fn test_bwrap_conditional_mount() {
        let mut bwrap = BwrapCommand::new();
        bwrap.ro_bind_if_exists("/nonexistent", "/nonexistent");
        bwrap.dev_bind_if_exists("/nonexistent_dev", "/nonexistent_dev");

        let args = bwrap.get_args();
        assert!(!args.contains(&"/nonexistent".to_string()));
        assert!(!args.contains(&"/nonexistent_dev".to_string()));
    }

    #[test]
    fn test_can_create_user_namespace() {
        match can_create_user_namespace() {
            Ok(()) => {}
            Err(e) => {
                assert!(!e.is_empty());
                assert!(e.contains("bwrap"));
            }
        }
    }
}
