//! Cgroups v2 resource-limit enforcement (spec §4.5 "Resource limits").
//!
//! Limits expressed in [`ResourceLimits`] are applied through a per-sandbox
//! cgroup under `/sys/fs/cgroup/boxwarden/<id>/`. Cgroup setup happens from
//! the parent process before spawn; joining the cgroup happens from the
//! `pre_exec` hook via [`add_self_to_cgroup_raw`], which must stay
//! async-signal-safe.

use std::ffi::CString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use boxwarden_shared::types::ResourceLimits;

const CGROUP_ROOT: &str = "/sys/fs/cgroup/boxwarden";

/// Cgroup controller settings derived from [`ResourceLimits`].
#[derive(Debug, Clone, Default)]
pub struct CgroupConfig {
    pub memory_max: Option<u64>,
    pub cpu_max: Option<f64>,
    pub pids_max: Option<u32>,
}

impl From<&ResourceLimits> for CgroupConfig {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            memory_max: limits.memory_bytes,
            cpu_max: limits.cpu_quota,
            pids_max: limits.process_limit,
        }
    }
}

/// Create (or reuse) the per-sandbox cgroup directory and write its
/// controller files. Returns the cgroup's directory path.
pub fn setup_cgroup(id: &str, config: &CgroupConfig) -> io::Result<PathBuf> {
    let dir = cgroup_dir(id);
    fs::create_dir_all(&dir)?;

    if let Some(memory_max) = config.memory_max {
        fs::write(dir.join("memory.max"), memory_max.to_string())?;
    }
    if let Some(cpu_quota) = config.cpu_max {
        // cpu.max format: "<quota> <period>"; period is conventionally
        // 100000us, so quota in that scale is `cpu_quota * 100000`.
        let quota_us = (cpu_quota * 100_000.0).round() as u64;
        fs::write(dir.join("cpu.max"), format!("{quota_us} 100000"))?;
    }
    if let Some(pids_max) = config.pids_max {
        fs::write(dir.join("pids.max"), pids_max.to_string())?;
    }

    Ok(dir)
}

/// Remove a sandbox's cgroup directory once the process has exited.
pub fn teardown_cgroup(id: &str) -> io::Result<()> {
    let dir = cgroup_dir(id);
    match fs::remove_dir(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn cgroup_dir(id: &str) -> PathBuf {
    Path::new(CGROUP_ROOT).join(id)
}

/// Precompute the `cgroup.procs` path for `id` as a `CString`, ready for
/// the async-signal-safe [`add_self_to_cgroup_raw`] call from `pre_exec`.
pub fn build_cgroup_procs_path(id: &str) -> Option<std::ffi::CString> {
    let path = cgroup_dir(id).join("cgroup.procs");
    CString::new(path.to_str()?).ok()
}

/// Join the calling process to the cgroup at `path`. Async-signal-safe.
///
/// # Safety
///
/// Only uses `open`/`write`/`close`; no allocation, no logging. Must only
/// be called from the `pre_exec` hook between `fork()` and `exec()`.
pub fn add_self_to_cgroup_raw(path: &std::ffi::CStr) -> Result<(), i32> {
    // SAFETY: path is a valid null-terminated string; the syscalls used
    // are all async-signal-safe.
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(*libc::__errno_location());
        }

        let pid = libc::getpid();
        let mut buf = [0u8; 16];
        let mut len = 0;
        let mut n = pid;
        if n == 0 {
            buf[0] = b'0';
            len = 1;
        } else {
            let mut temp = [0u8; 10];
            let mut tlen = 0;
            while n > 0 {
                temp[tlen] = b'0' + (n % 10) as u8;
                n /= 10;
                tlen += 1;
            }
            for i in 0..tlen {
                buf[i] = temp[tlen - 1 - i];
            }
            len = tlen;
        }

        let written = libc::write(fd, buf.as_ptr() as *const libc::c_void, len);
        libc::close(fd);

        if written < 0 {
            return Err(*libc::__errno_location());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_resource_limits_maps_fields() {
        let limits = ResourceLimits {
            memory_bytes: Some(1024),
            cpu_quota: Some(0.5),
            process_limit: Some(16),
        };
        let config = CgroupConfig::from(&limits);
        assert_eq!(config.memory_max, Some(1024));
        assert_eq!(config.cpu_max, Some(0.5));
        assert_eq!(config.pids_max, Some(16));
    }

    #[test]
    fn cgroup_dir_is_scoped_under_root() {
        let dir = cgroup_dir("abc123");
        assert!(dir.starts_with(CGROUP_ROOT));
        assert!(dir.ends_with("abc123"));
    }

    #[test]
    fn build_cgroup_procs_path_points_at_cgroup_procs_file() {
        let path = build_cgroup_procs_path("abc123").unwrap();
        let s = path.to_str().unwrap();
        assert!(s.ends_with("abc123/cgroup.procs"));
    }
}
