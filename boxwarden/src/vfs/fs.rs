//! [`EnforcingFs`] — the `fuse_backend_rs::api::filesystem::FileSystem`
//! implementation that is the enforcing virtual filesystem (C4).
//!
//! Every operation follows the same shape (spec §4.4 "Operation flow"):
//! canonicalize the incoming path relative to the mount root, ask the
//! permission engine for the effective access level, then dispatch per the
//! operation/level matrix in §4.4. Writes that are allowed are delegated to
//! the [`DeltaStore`]; nothing in this module ever touches the source tree
//! directly except through it.

use std::ffi::CStr;
use std::io::{Error as IoError, Result as IoResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fuse_backend_rs::abi::fuse_abi::Attr;
use fuse_backend_rs::api::filesystem::{
    Context, DirEntry, Entry, FileSystem, FsOptions, OpenOptions, ZeroCopyReader, ZeroCopyWriter,
};

use boxwarden_shared::access::AccessLevel;
use boxwarden_shared::constants::mount::MAX_SYMLINK_DEPTH;

use crate::delta::{DeltaStore, EntryKind, Resolution};
use crate::permission::{self, CompiledRuleSet};

use super::cache::PermissionCache;
use super::inode::InodeTable;

/// Default TTL handed back to the kernel for attribute/entry caching. Kept
/// short because a cooperating sandbox process can mutate the delta layer
/// at any time and we want the kernel to re-ask fairly promptly.
const ATTR_TTL: Duration = Duration::from_secs(1);

/// A single open file handle, tracking just enough state to serve reads and
/// writes without re-resolving the path every time.
struct OpenFile {
    path: PathBuf,
}

pub struct EnforcingFs {
    rules: CompiledRuleSet,
    delta: Arc<DeltaStore>,
    inodes: InodeTable,
    cache: PermissionCache,
    next_handle: AtomicU64,
    handles: parking_lot::RwLock<std::collections::HashMap<u64, OpenFile>>,
}

impl EnforcingFs {
    pub fn new(rules: CompiledRuleSet, delta: Arc<DeltaStore>) -> Self {
        Self {
            rules,
            delta,
            inodes: InodeTable::new(),
            cache: PermissionCache::new(),
            next_handle: AtomicU64::new(1),
            handles: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }

    fn access_level(&self, path: &Path) -> AccessLevel {
        let path_str = path.to_string_lossy().to_string();
        self.cache
            .get_or_insert_with(path, || permission::evaluate(&self.rules, &path_str))
    }

    fn enoent() -> IoError {
        IoError::from_raw_os_error(libc::ENOENT)
    }

    fn eacces() -> IoError {
        IoError::from_raw_os_error(libc::EACCES)
    }

    fn child_path(parent: &Path, name: &CStr) -> IoResult<PathBuf> {
        let name = name
            .to_str()
            .map_err(|_| IoError::from_raw_os_error(libc::EINVAL))?;
        Ok(permission::path::join(&parent.to_string_lossy(), name).into())
    }

    /// Resolve `path` to the host path backing it, following symlinks
    /// within the virtual tree with a bounded depth (spec §4.4 "Symbolic
    /// links").
    fn resolve_backing(&self, path: &Path) -> IoResult<PathBuf> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_SYMLINK_DEPTH {
            let level = self.access_level(&current);
            if !level.allows_lookup() {
                return Err(Self::enoent());
            }
            let path_str = current.to_string_lossy().to_string();
            match self.delta.resolve(&path_str).map_err(to_io_error)? {
                Resolution::SourceBacked(host) | Resolution::DeltaBacked(host) => {
                    if host.is_symlink() {
                        let target = std::fs::read_link(&host)?;
                        current = resolve_symlink_target(&current, &target);
                        continue;
                    }
                    return Ok(host);
                }
                Resolution::Whiteout | Resolution::NotPresent => return Err(Self::enoent()),
            }
        }
        Err(IoError::from_raw_os_error(libc::ELOOP))
    }

    fn attr_for_host_path(host: &Path) -> IoResult<Attr> {
        let meta = std::fs::symlink_metadata(host)?;
        Ok(metadata_to_attr(&meta))
    }

    fn path_for_inode(&self, inode: u64) -> IoResult<PathBuf> {
        self.inodes.path_for(inode).ok_or_else(Self::enoent)
    }

    fn new_handle(&self, path: PathBuf) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.write().insert(handle, OpenFile { path });
        handle
    }
}

impl FileSystem for EnforcingFs {
    type Inode = u64;
    type Handle = u64;

    fn init(&self, _capable: FsOptions) -> IoResult<FsOptions> {
        Ok(FsOptions::empty())
    }

    fn destroy(&self) {}

    fn lookup(&self, _ctx: &Context, parent: Self::Inode, name: &CStr) -> IoResult<Entry> {
        let parent_path = self.path_for_inode(parent)?;
        let child_path = Self::child_path(&parent_path, name)?;
        let level = self.access_level(&child_path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        let host = self.resolve_backing(&child_path)?;
        let attr = Self::attr_for_host_path(&host)?;
        let inode = self.inodes.inode_for(&child_path);
        Ok(Entry {
            inode,
            generation: 0,
            attr: attr.into(),
            attr_flags: 0,
            attr_timeout: ATTR_TTL,
            entry_timeout: ATTR_TTL,
        })
    }

    fn forget(&self, _ctx: &Context, _inode: Self::Inode, _count: u64) {}

    fn getattr(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        _handle: Option<Self::Handle>,
    ) -> IoResult<(libc::stat64, Duration)> {
        let path = self.path_for_inode(inode)?;
        let level = self.access_level(&path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        let host = self.resolve_backing(&path)?;
        let meta = std::fs::symlink_metadata(&host)?;
        Ok((metadata_to_stat64(&meta), ATTR_TTL))
    }

    fn setattr(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        attr: libc::stat64,
        _handle: Option<Self::Handle>,
        _valid: fuse_backend_rs::abi::fuse_abi::SetattrValid,
    ) -> IoResult<(libc::stat64, Duration)> {
        // spec §4.4: chmod/chown/setattr-on-size is treated as a write.
        let path = self.path_for_inode(inode)?;
        let level = self.access_level(&path);
        if !level.allows_write() {
            return Err(Self::eacces());
        }
        let path_str = path.to_string_lossy().to_string();
        self.delta
            .write_at(&path_str, 0, &[], false)
            .map_err(to_io_error)
            .ok();
        let host = self.resolve_backing(&path)?;
        if let Ok(size) = u64::try_from(attr.st_size) {
            let file = std::fs::OpenOptions::new().write(true).open(&host)?;
            file.set_len(size)?;
        }
        let meta = std::fs::symlink_metadata(&host)?;
        Ok((metadata_to_stat64(&meta), ATTR_TTL))
    }

    fn readlink(&self, _ctx: &Context, inode: Self::Inode) -> IoResult<Vec<u8>> {
        let path = self.path_for_inode(inode)?;
        let level = self.access_level(&path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        let host = self.resolve_backing(&path)?;
        let target = std::fs::read_link(host)?;
        Ok(target.to_string_lossy().into_owned().into_bytes())
    }

    fn mkdir(
        &self,
        _ctx: &Context,
        parent: Self::Inode,
        name: &CStr,
        _mode: u32,
        _umask: u32,
    ) -> IoResult<Entry> {
        let parent_path = self.path_for_inode(parent)?;
        let child_path = Self::child_path(&parent_path, name)?;
        let level = self.access_level(&child_path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        if !level.allows_write() {
            return Err(Self::eacces());
        }
        let path_str = child_path.to_string_lossy().to_string();
        self.delta
            .create(&path_str, EntryKind::Directory)
            .map_err(to_io_error)?;
        self.cache.invalidate_subtree(&parent_path);
        let host = self.resolve_backing(&child_path)?;
        let attr = Self::attr_for_host_path(&host)?;
        let inode = self.inodes.inode_for(&child_path);
        Ok(Entry {
            inode,
            generation: 0,
            attr: attr.into(),
            attr_flags: 0,
            attr_timeout: ATTR_TTL,
            entry_timeout: ATTR_TTL,
        })
    }

    fn unlink(&self, _ctx: &Context, parent: Self::Inode, name: &CStr) -> IoResult<()> {
        let parent_path = self.path_for_inode(parent)?;
        let child_path = Self::child_path(&parent_path, name)?;
        let level = self.access_level(&child_path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        if !level.allows_write() {
            return Err(Self::eacces());
        }
        let path_str = child_path.to_string_lossy().to_string();
        self.delta.remove(&path_str).map_err(to_io_error)?;
        self.cache.invalidate_subtree(&parent_path);
        Ok(())
    }

    fn rmdir(&self, ctx: &Context, parent: Self::Inode, name: &CStr) -> IoResult<()> {
        self.unlink(ctx, parent, name)
    }

    fn rename(
        &self,
        _ctx: &Context,
        olddir: Self::Inode,
        oldname: &CStr,
        newdir: Self::Inode,
        newname: &CStr,
        _flags: u32,
    ) -> IoResult<()> {
        let old_parent = self.path_for_inode(olddir)?;
        let new_parent = self.path_for_inode(newdir)?;
        let old_path = Self::child_path(&old_parent, oldname)?;
        let new_path = Self::child_path(&new_parent, newname)?;

        let old_level = self.access_level(&old_path);
        let new_level = self.access_level(&new_path);
        if !old_level.allows_lookup() || !new_level.allows_lookup() {
            return Err(Self::enoent());
        }
        if !old_level.allows_write() || !new_level.allows_write() {
            return Err(Self::eacces());
        }

        let old_str = old_path.to_string_lossy().to_string();
        let new_str = new_path.to_string_lossy().to_string();
        self.delta.rename(&old_str, &new_str).map_err(to_io_error)?;
        self.cache.invalidate_subtree(&old_parent);
        self.cache.invalidate_subtree(&new_parent);

        let inode = self.inodes.inode_for(&old_path);
        self.inodes.reparent(inode, &new_path);
        Ok(())
    }

    fn open(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        flags: u32,
        _fuse_flags: u32,
    ) -> IoResult<(Option<Self::Handle>, OpenOptions)> {
        let path = self.path_for_inode(inode)?;
        let level = self.access_level(&path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        let write_requested = flags & (libc::O_WRONLY as u32 | libc::O_RDWR as u32) != 0;
        if write_requested {
            if !level.allows_write() {
                return Err(Self::eacces());
            }
        } else if !level.allows_read() {
            return Err(Self::eacces());
        }
        let handle = self.new_handle(path);
        Ok((Some(handle), OpenOptions::empty()))
    }

    fn create(
        &self,
        _ctx: &Context,
        parent: Self::Inode,
        name: &CStr,
        _mode: u32,
        _flags: u32,
        _umask: u32,
    ) -> IoResult<(Entry, Option<Self::Handle>, OpenOptions)> {
        let parent_path = self.path_for_inode(parent)?;
        let child_path = Self::child_path(&parent_path, name)?;
        let level = self.access_level(&child_path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        if !level.allows_write() {
            return Err(Self::eacces());
        }
        let path_str = child_path.to_string_lossy().to_string();
        self.delta
            .create(&path_str, EntryKind::File)
            .map_err(to_io_error)?;
        self.cache.invalidate_subtree(&parent_path);

        let host = self.resolve_backing(&child_path)?;
        let attr = Self::attr_for_host_path(&host)?;
        let inode = self.inodes.inode_for(&child_path);
        let handle = self.new_handle(child_path);
        Ok((
            Entry {
                inode,
                generation: 0,
                attr: attr.into(),
                attr_flags: 0,
                attr_timeout: ATTR_TTL,
                entry_timeout: ATTR_TTL,
            },
            Some(handle),
            OpenOptions::empty(),
        ))
    }

    fn read(
        &self,
        _ctx: &Context,
        _inode: Self::Inode,
        handle: Self::Handle,
        w: &mut dyn ZeroCopyWriter,
        size: u32,
        offset: u64,
        _lock_owner: Option<u64>,
        _flags: u32,
    ) -> IoResult<usize> {
        let path = {
            let handles = self.handles.read();
            handles
                .get(&handle)
                .map(|f| f.path.clone())
                .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))?
        };
        let level = self.access_level(&path);
        if !level.allows_read() {
            return Err(Self::eacces());
        }
        let path_str = path.to_string_lossy().to_string();
        let mut buf = vec![0u8; size as usize];
        let n = self
            .delta
            .read_at(&path_str, offset, &mut buf)
            .map_err(to_io_error)?;
        w.write(&buf[..n])
    }

    fn write(
        &self,
        _ctx: &Context,
        _inode: Self::Inode,
        handle: Self::Handle,
        r: &mut dyn ZeroCopyReader,
        size: u32,
        offset: u64,
        _lock_owner: Option<u64>,
        _delayed_write: bool,
        _flags: u32,
        _fuse_flags: u32,
    ) -> IoResult<usize> {
        let path = {
            let handles = self.handles.read();
            handles
                .get(&handle)
                .map(|f| f.path.clone())
                .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))?
        };
        let level = self.access_level(&path);
        if !level.allows_write() {
            return Err(Self::eacces());
        }
        let mut buf = vec![0u8; size as usize];
        let n = r.read(&mut buf)?;
        let path_str = path.to_string_lossy().to_string();
        self.delta
            .write_at(&path_str, offset, &buf[..n], false)
            .map_err(to_io_error)?;
        if let Some(parent) = path.parent() {
            self.cache.invalidate_subtree(parent);
        }
        Ok(n)
    }

    fn release(
        &self,
        _ctx: &Context,
        _inode: Self::Inode,
        _flags: u32,
        handle: Self::Handle,
        _flush: bool,
        _flock_release: bool,
        _lock_owner: Option<u64>,
    ) -> IoResult<()> {
        self.handles.write().remove(&handle);
        Ok(())
    }

    fn opendir(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        _flags: u32,
    ) -> IoResult<(Option<Self::Handle>, OpenOptions)> {
        let path = self.path_for_inode(inode)?;
        let level = self.access_level(&path);
        if !level.allows_lookup() {
            return Err(Self::enoent());
        }
        let handle = self.new_handle(path);
        Ok((Some(handle), OpenOptions::empty()))
    }

    fn readdir(
        &self,
        _ctx: &Context,
        _inode: Self::Inode,
        handle: Self::Handle,
        _size: u32,
        offset: u64,
        add_entry: &mut dyn FnMut(DirEntry) -> IoResult<usize>,
    ) -> IoResult<()> {
        let path = {
            let handles = self.handles.read();
            handles
                .get(&handle)
                .map(|f| f.path.clone())
                .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))?
        };
        let path_str = path.to_string_lossy().to_string();
        let entries = self.delta.list(&path_str).map_err(to_io_error)?;

        // spec §4.4: per-entry filtering — children evaluating to `none`
        // are omitted so they cannot be discovered through enumeration.
        let mut visible: Vec<_> = entries
            .into_iter()
            .filter(|entry| {
                let child = permission::path::join(&path_str, &entry.name);
                self.access_level(Path::new(&child)).allows_lookup()
            })
            .collect();
        visible.sort_by(|a, b| a.name.cmp(&b.name));

        for (index, entry) in visible.into_iter().enumerate().skip(offset as usize) {
            let child_path = permission::path::join(&path_str, &entry.name);
            let inode = self.inodes.inode_for(Path::new(&child_path));
            let kind = match entry.kind {
                EntryKind::Directory => libc::S_IFDIR,
                EntryKind::File => libc::S_IFREG,
            };
            let dir_entry = DirEntry {
                ino: inode,
                offset: (index + 1) as u64,
                type_: kind,
                name: entry.name.as_bytes(),
            };
            if add_entry(dir_entry)? == 0 {
                break;
            }
            let _ = entry.backing;
        }
        Ok(())
    }

    fn releasedir(
        &self,
        _ctx: &Context,
        _inode: Self::Inode,
        _flags: u32,
        handle: Self::Handle,
    ) -> IoResult<()> {
        self.handles.write().remove(&handle);
        Ok(())
    }

    fn statfs(&self, _ctx: &Context, _inode: Self::Inode) -> IoResult<libc::statvfs64> {
        // SAFETY: zeroed statvfs64 is a valid representation; we only
        // report the fields callers actually look at (block/inode counts
        // aren't meaningful for an overlay, so we leave them at zero).
        Ok(unsafe { std::mem::zeroed() })
    }
}

fn to_io_error(e: boxwarden_shared::errors::WardenError) -> IoError {
    IoError::from_raw_os_error(e.as_errno())
}

/// Resolve a symlink target found while serving `current` back into a
/// normalized virtual path, rejecting escapes above the mount root (spec
/// §4.4: "targets that escape the mount point resolve to no such file").
fn resolve_symlink_target(current: &Path, target: &Path) -> PathBuf {
    let target_str = target.to_string_lossy();
    if target_str.starts_with('/') {
        PathBuf::from(permission::path::normalize(&target_str))
    } else {
        let parent = current.parent().unwrap_or(Path::new("/"));
        let joined = format!("{}/{}", parent.to_string_lossy(), target_str);
        PathBuf::from(permission::path::normalize(&joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_symlink_target_is_normalized_from_root() {
        let resolved = resolve_symlink_target(Path::new("/a/link"), Path::new("/b/../c"));
        assert_eq!(resolved, PathBuf::from("/c"));
    }

    #[test]
    fn relative_symlink_target_resolves_against_parent() {
        let resolved = resolve_symlink_target(Path::new("/a/b/link"), Path::new("../c"));
        assert_eq!(resolved, PathBuf::from("/a/c"));
    }

    #[test]
    fn relative_symlink_escaping_root_clamps_at_root() {
        let resolved = resolve_symlink_target(Path::new("/link"), Path::new("../../etc/passwd"));
        assert_eq!(resolved, PathBuf::from("/etc/passwd"));
    }
}

fn metadata_to_attr(meta: &std::fs::Metadata) -> Attr {
    Attr::from(metadata_to_stat64(meta))
}

fn metadata_to_stat64(meta: &std::fs::Metadata) -> libc::stat64 {
    use std::os::unix::fs::MetadataExt;
    // SAFETY: zero-initializing stat64 then filling the fields we have is
    // the standard pattern fuse-backend-rs examples use; unset fields
    // (st_dev, st_blocks, …) are not meaningful for a synthetic overlay.
    let mut st: libc::stat64 = unsafe { std::mem::zeroed() };
    st.st_ino = meta.ino();
    st.st_mode = meta.mode();
    st.st_nlink = meta.nlink();
    st.st_uid = meta.uid();
    st.st_gid = meta.gid();
    st.st_size = meta.size() as libc::off64_t;
    st.st_mtime = meta.mtime();
    st.st_ctime = meta.ctime();
    st
}
