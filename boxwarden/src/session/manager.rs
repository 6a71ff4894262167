//! Tracks every live [`Session`], keyed by id and grouped by owning
//! sandbox so a sandbox stop/destroy can tear down all of its sessions
//! (spec §4.6 "Lifecycle binding", §4.7).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use ulid::Ulid;

use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{SandboxId, SessionId};

use super::Session;

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new session bound to `sandbox_id` and register it. `command`
    /// is expected to already be wrapped through the sandbox's jail (see
    /// `LifecycleManager::create_session`).
    pub fn create(
        &self,
        sandbox_id: SandboxId,
        command: std::process::Command,
        initial_env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> WardenResult<Arc<Session>> {
        let id = Ulid::new();
        let session = Arc::new(Session::create(
            id,
            sandbox_id,
            command,
            initial_env,
            working_dir,
        )?);
        self.sessions.write().insert(id, Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, session_id: &SessionId) -> WardenResult<Arc<Session>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| WardenError::NotFound(format!("session {session_id} not found")))
    }

    /// Destroy and unregister one session.
    pub fn destroy(&self, session_id: &SessionId) -> WardenResult<()> {
        let session = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| WardenError::NotFound(format!("session {session_id} not found")))?;
        session.destroy()
    }

    /// Destroy every session owned by `sandbox_id`. Called when a sandbox
    /// stops or is destroyed. Errors are logged and otherwise ignored —
    /// the sandbox teardown must proceed regardless.
    pub fn destroy_all_for_sandbox(&self, sandbox_id: &SandboxId) {
        let to_remove: Vec<SessionId> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| session.sandbox_id() == sandbox_id)
            .map(|(id, _)| *id)
            .collect();

        for id in to_remove {
            if let Some(session) = self.sessions.write().remove(&id) {
                if let Err(err) = session.destroy() {
                    tracing::warn!(session_id = %id, error = %err, "error destroying session during sandbox teardown");
                }
            }
        }
    }

    pub fn count_for_sandbox(&self, sandbox_id: &SandboxId) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|session| session.sandbox_id() == sandbox_id)
            .count()
    }
}
