//! The enforcing virtual filesystem (C4): a FUSE filesystem that answers
//! every path-touching syscall by consulting the permission engine (C1/C2)
//! and, where allowed, the delta store (C3).

pub mod cache;
pub mod fs;
pub mod inode;
pub mod mount;

pub use fs::EnforcingFs;
pub use mount::{mount, mount_default, MountHandle};
