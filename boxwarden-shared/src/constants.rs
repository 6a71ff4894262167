//! Centralized constants: the on-disk delta format, default mount point,
//! and default shell configuration. Host controls all paths.

/// The whiteout on-disk format (spec §3, §6, §9).
pub mod whiteout {
    /// Reserved prefix for whiteout sentinel files. A user creation whose
    /// basename starts with this prefix must be rejected before the delta
    /// layer ever sees it (spec §9 "Whiteout prefix collisions").
    pub const PREFIX: &str = ".wh.";

    /// Build the whiteout sentinel filename for a logical entry name.
    pub fn sentinel_name(logical_name: &str) -> String {
        format!("{PREFIX}{logical_name}")
    }

    /// Recover the logical name from a whiteout sentinel filename, if it is one.
    pub fn logical_name(sentinel: &str) -> Option<&str> {
        sentinel.strip_prefix(PREFIX)
    }
}

/// Mount-point and in-sandbox environment defaults (spec §6).
pub mod mount {
    /// Default in-sandbox path at which the enforcing filesystem is bound.
    pub const DEFAULT_MOUNT_POINT: &str = "/workspace";

    /// Bounded symlink-resolution depth before a loop error (spec §4.4).
    pub const MAX_SYMLINK_DEPTH: u32 = 40;
}

/// Shell defaults for exec and session commands (spec §6).
pub mod shell {
    /// Default shell for one-shot exec requests.
    pub const DEFAULT_EXEC_SHELL: &str = "/bin/sh";

    /// Default shell for interactive sessions.
    pub const DEFAULT_SESSION_SHELL: &str = "/bin/sh";

    /// Flags appended when the session shell is bash, to suppress user
    /// startup files that would otherwise leak host customization into
    /// the sandbox's "clean slate" shell.
    pub const BASH_NO_RC_FLAGS: &[&str] = &["--norc", "--noprofile", "-i"];
}

/// Timeouts and grace periods used across the lifecycle and runtime (spec §5).
pub mod timing {
    use std::time::Duration;

    /// Default bound on waiting for mount readiness during `start()`.
    pub const DEFAULT_MOUNT_READY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Minimum delay between a best-effort interrupt and a hard kill.
    pub const MIN_INTERRUPT_TO_KILL_GRACE: Duration = Duration::from_millis(50);
}
