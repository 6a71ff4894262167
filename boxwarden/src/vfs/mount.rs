//! Mount lifecycle for the enforcing virtual filesystem (spec §4.4, §5
//! "start()").
//!
//! `fuse-backend-rs`'s `fusedev` transport runs the session loop on a
//! dedicated thread; this module owns that thread and gives callers a
//! `MountHandle` that blocks (with a bound) until the mount is actually
//! servicing requests, and that unmounts cleanly on drop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;
use std::time::Duration;

use fuse_backend_rs::api::server::Server;
use fuse_backend_rs::transport::{FuseChannel, FuseSession};

use boxwarden_shared::constants::timing::DEFAULT_MOUNT_READY_TIMEOUT;
use boxwarden_shared::errors::{WardenError, WardenResult};

use super::fs::EnforcingFs;

/// A live FUSE mount. Dropping it unmounts and joins the server thread.
pub struct MountHandle {
    mount_point: PathBuf,
    session: Option<FuseSession>,
    worker: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl MountHandle {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Tear down the mount. Safe to call more than once.
    pub fn unmount(&mut self) -> WardenResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut session) = self.session.take() {
            session
                .umount()
                .map_err(|e| WardenError::Internal(format!("unmount failed: {e}")))?;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        if let Err(err) = self.unmount() {
            tracing::warn!(mount_point = %self.mount_point.display(), %err, "unmount on drop failed");
        }
    }
}

/// Mount `fs` at `mount_point`, blocking until the session is ready to
/// serve requests or `timeout` elapses (spec §5: "start() waits for the
/// filesystem to be ready before returning").
pub fn mount(
    fs: EnforcingFs,
    mount_point: &Path,
    timeout: Duration,
) -> WardenResult<MountHandle> {
    std::fs::create_dir_all(mount_point).map_err(WardenError::from)?;

    let mut session = FuseSession::new(mount_point, "boxwarden", "", false)
        .map_err(|e| WardenError::Internal(format!("failed to create fuse session: {e}")))?;
    session
        .mount()
        .map_err(|e| WardenError::Internal(format!("failed to mount fuse session: {e}")))?;

    let channel = session
        .new_channel()
        .map_err(|e| WardenError::Internal(format!("failed to create fuse channel: {e}")))?;

    let running = Arc::new(AtomicBool::new(true));
    let ready = Arc::new(Barrier::new(2));
    let worker = spawn_server_thread(fs, channel, Arc::clone(&running), Arc::clone(&ready));

    wait_for_ready(&ready, timeout)?;

    Ok(MountHandle {
        mount_point: mount_point.to_path_buf(),
        session: Some(session),
        worker: Some(worker),
        running,
    })
}

/// Mount with the default readiness timeout (spec §6 defaults).
pub fn mount_default(fs: EnforcingFs, mount_point: &Path) -> WardenResult<MountHandle> {
    mount(fs, mount_point, DEFAULT_MOUNT_READY_TIMEOUT)
}

fn spawn_server_thread(
    fs: EnforcingFs,
    mut channel: FuseChannel,
    running: Arc<AtomicBool>,
    ready: Arc<Barrier>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let server = Server::new(fs);
        ready.wait();
        while running.load(Ordering::SeqCst) {
            match channel.get_request() {
                Ok(Some((reader, writer))) => {
                    if let Err(err) = server.handle_message(reader, writer.into(), None, None) {
                        tracing::warn!(%err, "fuse request handling failed");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(%err, "fuse channel read failed");
                    break;
                }
            }
        }
    })
}

fn wait_for_ready(ready: &Arc<Barrier>, timeout: Duration) -> WardenResult<()> {
    // The server thread calls `ready.wait()` once it has entered its
    // serving loop; we race that against the timeout on a scratch thread
    // so a wedged mount cannot hang `start()` forever.
    let ready = Arc::clone(ready);
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        ready.wait();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout)
        .map_err(|_| WardenError::Timeout("mount did not become ready in time".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_accessor_reflects_constructor() {
        // Constructing a full MountHandle requires a live FUSE session, so
        // this only exercises the accessor contract via a manual instance.
        let handle = MountHandle {
            mount_point: PathBuf::from("/workspace"),
            session: None,
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
        };
        assert_eq!(handle.mount_point(), Path::new("/workspace"));
    }
}
