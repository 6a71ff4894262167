//! The crate-wide error taxonomy (spec §7).

use thiserror::Error;

/// Result alias used throughout boxwarden.
pub type WardenResult<T> = Result<T, WardenError>;

/// The nine-kind error taxonomy from spec §7.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Bad permission rule, unknown runtime variant, malformed request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Sandbox id, session id, or source tree id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Sandbox not in the state required for the requested operation.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Command or mount readiness exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A permission rule rejected the operation (surfaced to the in-sandbox
    /// process as a syscall error, not returned to the API caller as a
    /// command failure — see spec §7 propagation policy).
    #[error("permission denied: {0}")]
    Denied(String),

    /// The path resolves to `none`; indistinguishable from "no such file"
    /// at every boundary.
    #[error("no such file or directory: {0}")]
    Hidden(String),

    /// Underlying filesystem or process syscall failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The isolation mechanism failed (missing binary, image pull failure,
    /// container exited before launch).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// An invariant was violated; should be impossible.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// The libc errno this error should surface as at the virtual
    /// filesystem boundary (spec §6).
    pub fn as_errno(&self) -> i32 {
        match self {
            WardenError::Hidden(_) | WardenError::NotFound(_) => libc::ENOENT,
            WardenError::Denied(_) => libc::EACCES,
            WardenError::Timeout(_) => libc::ETIMEDOUT,
            WardenError::Validation(_) | WardenError::PreconditionFailed(_) => libc::EINVAL,
            _ => libc::EIO,
        }
    }
}

impl From<std::io::Error> for WardenError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => WardenError::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => WardenError::Denied(e.to_string()),
            std::io::ErrorKind::TimedOut => WardenError::Timeout(e.to_string()),
            _ => WardenError::Io(e.to_string()),
        }
    }
}

impl From<walkdir::Error> for WardenError {
    fn from(e: walkdir::Error) -> Self {
        WardenError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_maps_to_enoent() {
        assert_eq!(WardenError::Hidden("x".into()).as_errno(), libc::ENOENT);
    }

    #[test]
    fn denied_maps_to_eacces() {
        assert_eq!(WardenError::Denied("x".into()).as_errno(), libc::EACCES);
    }

    #[test]
    fn io_not_found_becomes_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: WardenError = io.into();
        assert!(matches!(err, WardenError::NotFound(_)));
    }
}
