//! Bidirectional inode ↔ path table for the enforcing virtual filesystem.
//!
//! FUSE addresses everything by inode number after the initial lookup;
//! this table is the only place that translates between the kernel's
//! inode space and our path space.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// The inode FUSE reserves for the mount root.
pub const ROOT_INODE: u64 = 1;

#[derive(Default)]
struct Tables {
    path_to_inode: HashMap<PathBuf, u64>,
    inode_to_path: HashMap<u64, PathBuf>,
    next_inode: u64,
}

/// Assigns stable inode numbers to normalized virtual paths and looks them
/// back up in either direction. Entries are never evicted within a mount's
/// lifetime — `forget` only drops the kernel's reference count, which this
/// table does not track, trading a bounded memory growth for simplicity.
pub struct InodeTable {
    inner: RwLock<Tables>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut tables = Tables {
            next_inode: ROOT_INODE + 1,
            ..Default::default()
        };
        tables.path_to_inode.insert(PathBuf::from("/"), ROOT_INODE);
        tables.inode_to_path.insert(ROOT_INODE, PathBuf::from("/"));
        Self {
            inner: RwLock::new(tables),
        }
    }

    /// Look up the inode for `path`, allocating a new one if this is the
    /// first time the path has been observed.
    pub fn inode_for(&self, path: &Path) -> u64 {
        if let Some(inode) = self.inner.read().path_to_inode.get(path) {
            return *inode;
        }
        let mut tables = self.inner.write();
        if let Some(inode) = tables.path_to_inode.get(path) {
            return *inode;
        }
        let inode = tables.next_inode;
        tables.next_inode += 1;
        tables.path_to_inode.insert(path.to_path_buf(), inode);
        tables.inode_to_path.insert(inode, path.to_path_buf());
        inode
    }

    pub fn path_for(&self, inode: u64) -> Option<PathBuf> {
        self.inner.read().inode_to_path.get(&inode).cloned()
    }

    /// Re-point an existing inode at a new path, used after a rename so
    /// open handles addressed by inode keep resolving correctly.
    pub fn reparent(&self, inode: u64, new_path: &Path) {
        let mut tables = self.inner.write();
        if let Some(old_path) = tables.inode_to_path.get(&inode).cloned() {
            tables.path_to_inode.remove(&old_path);
        }
        tables.inode_to_path.insert(inode, new_path.to_path_buf());
        tables.path_to_inode.insert(new_path.to_path_buf(), inode);
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
