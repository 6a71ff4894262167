//! The Delta Store (C3): a per-sandbox copy-on-write overlay on top of a
//! read-only source tree (spec §4.3).
//!
//! Every mutating operation serializes under [`DeltaStore`]'s internal lock;
//! reads proceed in parallel with each other but not with a concurrent
//! `sync`. The source tree is never written to except by `sync`.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use boxwarden_shared::constants::whiteout;
use boxwarden_shared::errors::{WardenError, WardenResult};
use parking_lot::RwLock;

/// Where a path's data currently lives, as seen by the delta store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    SourceBacked(PathBuf),
    DeltaBacked(PathBuf),
    Whiteout,
    NotPresent,
}

/// The kind of entry being created or listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Which layer a listed directory entry's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Source,
    Delta,
}

/// One entry returned by [`DeltaStore::list`].
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
    pub backing: Backing,
}

/// Outcome of [`DeltaStore::sync`].
#[derive(Debug, Default)]
pub struct SyncReport {
    pub files_synced: usize,
    pub deletions_applied: usize,
    pub errors: Vec<(PathBuf, String)>,
}

/// A per-sandbox copy-on-write overlay.
///
/// `source_root` is treated as read-only by every method except `sync`.
/// `delta_root` is owned exclusively by this store.
pub struct DeltaStore {
    source_root: PathBuf,
    delta_root: PathBuf,
    lock: RwLock<()>,
}

impl DeltaStore {
    pub fn new(source_root: impl Into<PathBuf>, delta_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            delta_root: delta_root.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn delta_root(&self) -> &Path {
        &self.delta_root
    }

    fn delta_path(&self, p: &str) -> PathBuf {
        self.delta_root.join(p.trim_start_matches('/'))
    }

    fn source_path(&self, p: &str) -> PathBuf {
        self.source_root.join(p.trim_start_matches('/'))
    }

    /// `<delta>/<parent>/.wh.<name>` for logical path `p`.
    fn whiteout_path(&self, p: &str) -> PathBuf {
        let (parent, name) = split_parent(p);
        self.delta_path(parent).join(whiteout::sentinel_name(name))
    }

    /// Reject user-directed creations whose basename collides with the
    /// whiteout sentinel prefix (spec §9 "Whiteout prefix collisions").
    fn reject_reserved_name(p: &str) -> WardenResult<()> {
        let (_, name) = split_parent(p);
        if name.starts_with(whiteout::PREFIX) {
            return Err(WardenError::Validation(format!(
                "path {p:?} collides with the reserved whiteout prefix {:?}",
                whiteout::PREFIX
            )));
        }
        Ok(())
    }

    /// **resolve** (spec §4.3).
    pub fn resolve(&self, p: &str) -> WardenResult<Resolution> {
        let _guard = self.lock.read();
        self.resolve_locked(p)
    }

    fn resolve_locked(&self, p: &str) -> WardenResult<Resolution> {
        let whiteout_path = self.whiteout_path(p);
        if whiteout_path.exists() {
            return Ok(Resolution::Whiteout);
        }
        let delta_path = self.delta_path(p);
        if delta_path.exists() {
            return Ok(Resolution::DeltaBacked(delta_path));
        }
        let source_path = self.source_path(p);
        if source_path.exists() {
            return Ok(Resolution::SourceBacked(source_path));
        }
        Ok(Resolution::NotPresent)
    }

    /// **read** (spec §4.3): a positioned read of up to `buf.len()` bytes.
    pub fn read_at(&self, p: &str, offset: u64, buf: &mut [u8]) -> WardenResult<usize> {
        let _guard = self.lock.read();
        let backing = match self.resolve_locked(p)? {
            Resolution::SourceBacked(path) | Resolution::DeltaBacked(path) => path,
            Resolution::Whiteout | Resolution::NotPresent => {
                return Err(WardenError::NotFound(p.to_string()));
            }
        };
        let mut file = File::open(&backing)?;
        file.seek(SeekFrom::Start(offset))?;
        let n = file.read(buf)?;
        Ok(n)
    }

    /// Read the entire resolved file. Convenience wrapper over `read_at`.
    pub fn read_all(&self, p: &str) -> WardenResult<Vec<u8>> {
        let _guard = self.lock.read();
        let backing = match self.resolve_locked(p)? {
            Resolution::SourceBacked(path) | Resolution::DeltaBacked(path) => path,
            Resolution::Whiteout | Resolution::NotPresent => {
                return Err(WardenError::NotFound(p.to_string()));
            }
        };
        Ok(fs::read(backing)?)
    }

    /// Lazily copy a source-backed file into the delta before it is
    /// mutated. A no-op if `p` is already delta-backed or absent. Creates
    /// parent directories in the delta on demand.
    fn copy_up(&self, p: &str) -> WardenResult<PathBuf> {
        let delta_path = self.delta_path(p);
        if let Some(parent) = delta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if delta_path.exists() {
            return Ok(delta_path);
        }
        let source_path = self.source_path(p);
        if source_path.exists() {
            match reflink_copy::reflink(&source_path, &delta_path) {
                Ok(()) => {}
                Err(_) => {
                    if let Err(e) = fs::copy(&source_path, &delta_path) {
                        let _ = fs::remove_file(&delta_path);
                        return Err(e.into());
                    }
                    // fs::copy doesn't carry mtime across; match the source
                    // file's so an unmodified copy-up doesn't look touched.
                    if let Ok(meta) = fs::metadata(&source_path) {
                        let mtime = filetime::FileTime::from_last_modification_time(&meta);
                        let _ = filetime::set_file_mtime(&delta_path, mtime);
                    }
                }
            }
        }
        Ok(delta_path)
    }

    /// **write** (spec §4.3): copy-up if needed, apply the write, clear any
    /// whiteout that shadowed `p`.
    pub fn write_at(
        &self,
        p: &str,
        offset: u64,
        data: &[u8],
        truncate: bool,
    ) -> WardenResult<()> {
        Self::reject_reserved_name(p)?;
        let _guard = self.lock.write();
        let delta_path = self.copy_up(p)?;
        let result = (|| -> WardenResult<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&delta_path)?;
            if truncate {
                file.set_len(0)?;
            }
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            Ok(())
        })();
        if result.is_err() && !self.source_path(p).exists() {
            // Partial file from a failed copy-up/write with no source
            // backing to fall back to — remove it so the delta never keeps
            // a half-written entry (spec §4.3 "fails atomically").
            let _ = fs::remove_file(&delta_path);
        }
        result?;
        self.clear_whiteout_locked(p)?;
        Ok(())
    }

    /// **create** (spec §4.3).
    pub fn create(&self, p: &str, kind: EntryKind) -> WardenResult<()> {
        Self::reject_reserved_name(p)?;
        let _guard = self.lock.write();
        if !matches!(self.resolve_locked(p)?, Resolution::Whiteout | Resolution::NotPresent) {
            return Err(WardenError::Validation(format!(
                "{p:?} already exists"
            )));
        }
        let delta_path = self.delta_path(p);
        if let Some(parent) = delta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match kind {
            EntryKind::File => {
                File::create(&delta_path)?;
            }
            EntryKind::Directory => {
                fs::create_dir_all(&delta_path)?;
            }
        }
        self.clear_whiteout_locked(p)?;
        Ok(())
    }

    fn clear_whiteout_locked(&self, p: &str) -> WardenResult<()> {
        let whiteout_path = self.whiteout_path(p);
        if whiteout_path.exists() {
            fs::remove_file(&whiteout_path)?;
        }
        Ok(())
    }

    /// **remove** (spec §4.3): writes a whiteout for source-backed entries,
    /// deletes delta-backed entries (directories recursively), and always
    /// leaves a whiteout behind so subsequent listings skip the name.
    pub fn remove(&self, p: &str) -> WardenResult<()> {
        let _guard = self.lock.write();
        let resolution = self.resolve_locked(p)?;
        match &resolution {
            Resolution::NotPresent | Resolution::Whiteout => {
                return Err(WardenError::NotFound(p.to_string()));
            }
            Resolution::DeltaBacked(path) => {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                } else {
                    fs::remove_file(path)?;
                }
            }
            Resolution::SourceBacked(_) => {}
        }
        let whiteout_path = self.whiteout_path(p);
        if let Some(parent) = whiteout_path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&whiteout_path)?;
        Ok(())
    }

    /// **rename** (spec §4.3): copy-up-of-source-if-needed at `from`, write
    /// at `to`, remove at `from`. Serializes under the same lock so
    /// overlapping renames cannot interleave.
    pub fn rename(&self, from: &str, to: &str) -> WardenResult<()> {
        Self::reject_reserved_name(to)?;
        let _guard = self.lock.write();
        let source_path = self.copy_up(from)?;
        if !source_path.exists() {
            return Err(WardenError::NotFound(from.to_string()));
        }
        let dest_path = self.delta_path(to);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source_path, &dest_path)?;
        self.clear_whiteout_locked(to)?;

        let from_whiteout = self.whiteout_path(from);
        if let Some(parent) = from_whiteout.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&from_whiteout)?;
        Ok(())
    }

    /// **list** (spec §4.3): merge source and delta entries for `dir`,
    /// subtracting whiteouts, preferring delta entries by name.
    pub fn list(&self, dir: &str) -> WardenResult<Vec<ListEntry>> {
        let _guard = self.lock.read();
        let delta_dir = self.delta_path(dir);
        let source_dir = self.source_path(dir);

        let mut whiteouts = HashSet::new();
        let mut entries: Vec<ListEntry> = Vec::new();
        let mut seen = HashSet::new();

        if delta_dir.is_dir() {
            for entry in fs::read_dir(&delta_dir)? {
                let entry = entry?;
                let file_name = entry.file_name();
                let name = file_name.to_string_lossy().to_string();
                if let Some(logical) = whiteout::logical_name(&name) {
                    whiteouts.insert(logical.to_string());
                    continue;
                }
                let kind = if entry.file_type()?.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                seen.insert(name.clone());
                entries.push(ListEntry {
                    name,
                    kind,
                    backing: Backing::Delta,
                });
            }
        }

        if source_dir.is_dir() {
            for entry in fs::read_dir(&source_dir)? {
                let entry = entry?;
                let file_name = entry.file_name();
                let name = file_name.to_string_lossy().to_string();
                if seen.contains(&name) || whiteouts.contains(&name) {
                    continue;
                }
                let kind = if entry.file_type()?.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                entries.push(ListEntry {
                    name,
                    kind,
                    backing: Backing::Source,
                });
            }
        }

        Ok(entries)
    }

    /// **sync** (spec §4.3): walk the delta, copy regular files and apply
    /// whiteout deletions into the source tree. Conflict policy is
    /// last-writer-wins — no timestamp pre-check. Errors on individual
    /// paths are collected and do not abort the walk (see DESIGN.md for the
    /// open-question decision this implements).
    pub fn sync(&self) -> WardenResult<SyncReport> {
        let _guard = self.lock.write();
        let mut report = SyncReport::default();
        if !self.delta_root.exists() {
            return Ok(report);
        }
        for entry in walkdir::WalkDir::new(&self.delta_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let rel = match entry.path().strip_prefix(&self.delta_root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => continue,
            };
            let file_name = entry.file_name().to_string_lossy();
            if let Some(logical) = whiteout::logical_name(&file_name) {
                let target = self
                    .source_root
                    .join(rel.parent().unwrap_or(Path::new("")))
                    .join(logical);
                let result = if target.is_dir() {
                    fs::remove_dir_all(&target)
                } else {
                    fs::remove_file(&target)
                };
                match result {
                    Ok(()) => report.deletions_applied += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => report.errors.push((target, e.to_string())),
                }
                continue;
            }
            if entry.file_type().is_dir() {
                let target = self.source_root.join(rel);
                if let Err(e) = fs::create_dir_all(&target) {
                    report.errors.push((target, e.to_string()));
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let target = self.source_root.join(rel);
            if let Some(parent) = target.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    report.errors.push((target.clone(), e.to_string()));
                    continue;
                }
            }
            match fs::copy(entry.path(), &target) {
                Ok(_) => report.files_synced += 1,
                Err(e) => report.errors.push((target, e.to_string())),
            }
        }
        Ok(report)
    }
}

/// Split a normalized path into `(parent, basename)`. `/` splits to `("/", "")`.
fn split_parent(p: &str) -> (&str, &str) {
    let trimmed = p.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("/", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, tempfile::TempDir, DeltaStore) {
        let source = tempdir().unwrap();
        let delta = tempdir().unwrap();
        let store = DeltaStore::new(source.path(), delta.path());
        (source, delta, store)
    }

    #[test]
    fn resolve_not_present_by_default() {
        let (_s, _d, store) = store();
        assert_eq!(store.resolve("/a.txt").unwrap(), Resolution::NotPresent);
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_s, _d, store) = store();
        store.write_at("/out/r.txt", 0, b"X", true).unwrap();
        let data = store.read_all("/out/r.txt").unwrap();
        assert_eq!(data, b"X");
    }

    #[test]
    fn write_copies_up_source_backed_file() {
        let (source, _d, store) = store();
        fs::write(source.path().join("a.txt"), b"original").unwrap();
        assert!(matches!(
            store.resolve("/a.txt").unwrap(),
            Resolution::SourceBacked(_)
        ));
        store.write_at("/a.txt", 0, b"changed", true).unwrap();
        assert!(matches!(
            store.resolve("/a.txt").unwrap(),
            Resolution::DeltaBacked(_)
        ));
        assert_eq!(store.read_all("/a.txt").unwrap(), b"changed");
        // source untouched until sync
        assert_eq!(fs::read(source.path().join("a.txt")).unwrap(), b"original");
    }

    #[test]
    fn remove_source_backed_writes_whiteout() {
        let (source, delta, store) = store();
        fs::write(source.path().join("secret.pem"), b"s3cr3t").unwrap();
        store.remove("/secret.pem").unwrap();
        assert_eq!(store.resolve("/secret.pem").unwrap(), Resolution::Whiteout);
        assert!(delta.path().join(".wh.secret.pem").exists());
    }

    #[test]
    fn create_then_remove_then_lookup_not_found() {
        let (_s, _d, store) = store();
        store.create("/new.txt", EntryKind::File).unwrap();
        store.remove("/new.txt").unwrap();
        assert_eq!(store.resolve("/new.txt").unwrap(), Resolution::Whiteout);
    }

    #[test]
    fn rename_round_trip_is_a_no_op() {
        let (source, _d, store) = store();
        fs::write(source.path().join("a.txt"), b"payload").unwrap();
        store.rename("/a.txt", "/b.txt").unwrap();
        assert_eq!(store.read_all("/b.txt").unwrap(), b"payload");
        store.rename("/b.txt", "/a.txt").unwrap();
        assert_eq!(store.read_all("/a.txt").unwrap(), b"payload");
    }

    #[test]
    fn list_merges_source_and_delta_and_hides_whiteouts() {
        let (source, _d, store) = store();
        fs::write(source.path().join("app.py"), b"").unwrap();
        fs::create_dir(source.path().join("secrets")).unwrap();
        fs::write(source.path().join("secrets/key.pem"), b"").unwrap();
        store.remove("/secrets/key.pem").unwrap();
        store.create("/out.txt", EntryKind::File).unwrap();

        let top = store.list("/").unwrap();
        let names: Vec<_> = top.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"app.py"));
        assert!(names.contains(&"out.txt"));

        let secrets = store.list("/secrets").unwrap();
        assert!(secrets.is_empty());
    }

    #[test]
    fn sync_propagates_writes_and_deletions() {
        let (source, _d, store) = store();
        fs::write(source.path().join("keep.txt"), b"old").unwrap();
        store.write_at("/keep.txt", 0, b"new", true).unwrap();
        store.write_at("/new.txt", 0, b"created", true).unwrap();

        let report = store.sync().unwrap();
        assert_eq!(report.files_synced, 2);
        assert_eq!(fs::read(source.path().join("keep.txt")).unwrap(), b"new");
        assert_eq!(fs::read(source.path().join("new.txt")).unwrap(), b"created");
    }

    #[test]
    fn sync_applies_whiteout_as_source_deletion() {
        let (source, _d, store) = store();
        fs::write(source.path().join("gone.txt"), b"bye").unwrap();
        store.remove("/gone.txt").unwrap();
        let report = store.sync().unwrap();
        assert_eq!(report.deletions_applied, 1);
        assert!(!source.path().join("gone.txt").exists());
    }

    #[test]
    fn reserved_whiteout_prefix_is_rejected() {
        let (_s, _d, store) = store();
        let err = store.create("/.wh.sneaky", EntryKind::File).unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[test]
    fn write_persists_to_source_across_store_instances_after_sync() {
        let source = tempdir().unwrap();
        let delta = tempdir().unwrap();
        {
            let store = DeltaStore::new(source.path(), delta.path());
            store.write_at("/out/r.txt", 0, b"committed", true).unwrap();
            store.sync().unwrap();
        }
        // A fresh store over the same source, a different delta (as if the
        // sandbox were destroyed and a new one created), sees the write.
        let delta2 = tempdir().unwrap();
        let store2 = DeltaStore::new(source.path(), delta2.path());
        assert_eq!(store2.read_all("/out/r.txt").unwrap(), b"committed");
    }

    #[test]
    fn later_sync_wins_when_two_deltas_race_on_the_same_path() {
        let source = tempdir().unwrap();
        let delta_x = tempdir().unwrap();
        let delta_y = tempdir().unwrap();
        let store_x = DeltaStore::new(source.path(), delta_x.path());
        let store_y = DeltaStore::new(source.path(), delta_y.path());

        store_x.write_at("/out/r.txt", 0, b"X", true).unwrap();
        store_y.write_at("/out/r.txt", 0, b"Y", true).unwrap();

        // Before either syncs, each sandbox sees only its own write.
        assert_eq!(store_x.read_all("/out/r.txt").unwrap(), b"X");
        assert_eq!(store_y.read_all("/out/r.txt").unwrap(), b"Y");

        store_x.sync().unwrap();
        store_y.sync().unwrap();

        assert_eq!(fs::read(source.path().join("out/r.txt")).unwrap(), b"Y");
    }
}
