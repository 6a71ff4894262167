//! Resource-limit application for the `pre_exec` hook.
//!
//! Async-signal-safe: translates [`ResourceLimits`] into raw `setrlimit(2)`
//! calls, no heap allocation.

use boxwarden_shared::types::ResourceLimits;

/// Maximum open files for the sandboxed process. Not part of
/// [`ResourceLimits`] (spec's resource limits are memory/cpu/process-count
/// only), but still worth bounding so a runaway process can't exhaust the
/// host's FD table.
const MAX_OPEN_FILES: libc::rlim_t = 1024;

/// Apply `limits` via raw `setrlimit()` calls. Async-signal-safe.
///
/// # Safety
///
/// Only uses the `setrlimit` syscall; no allocation, no logging. Must only
/// be called from a `pre_exec` hook between `fork()` and `exec()`.
pub fn apply_limits_raw(limits: &ResourceLimits) -> Result<(), i32> {
    // SAFETY: setrlimit is async-signal-safe; rlimit structs are plain data.
    unsafe {
        let nofile = libc::rlimit {
            rlim_cur: MAX_OPEN_FILES,
            rlim_max: MAX_OPEN_FILES,
        };
        if libc::setrlimit(libc::RLIMIT_NOFILE, &nofile) != 0 {
            return Err(*libc::__errno_location());
        }

        if let Some(process_limit) = limits.process_limit {
            let nproc = libc::rlimit {
                rlim_cur: process_limit as libc::rlim_t,
                rlim_max: process_limit as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_NPROC, &nproc) != 0 {
                return Err(*libc::__errno_location());
            }
        }

        if let Some(memory_bytes) = limits.memory_bytes {
            let as_limit = libc::rlimit {
                rlim_cur: memory_bytes as libc::rlim_t,
                rlim_max: memory_bytes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &as_limit) != 0 {
                return Err(*libc::__errno_location());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_default_limits_without_error() {
        let limits = ResourceLimits::default();
        apply_limits_raw(&limits).expect("default limits should apply cleanly");
    }

    #[test]
    fn applies_explicit_process_and_memory_limits() {
        let limits = ResourceLimits {
            memory_bytes: Some(512 * 1024 * 1024),
            cpu_quota: None,
            process_limit: Some(64),
        };
        apply_limits_raw(&limits).expect("explicit limits should apply cleanly");
    }
}
