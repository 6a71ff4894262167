//! Async-signal-safe utilities shared by the `pre_exec` hook.
//!
//! Everything in this module may run between `fork()` and `exec()`, so it
//! is held to the same discipline documented in
//! [`pre_exec`](crate::jailer::pre_exec): no heap allocation, no logging,
//! no locking — raw syscalls only.

pub mod fd;
pub mod fs;
pub mod pid;
pub mod rlimit;
