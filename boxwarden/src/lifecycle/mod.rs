//! The Sandbox Lifecycle Manager (C7): owns the sandbox state machine and
//! wires the permission engine, delta store, enforcing filesystem, jailer,
//! and session manager together (spec §4.7).
//!
//! ```text
//!                create()                 start()           stop()
//!   (nothing) ────────────▶ pending ──────────────▶ running ────────▶ stopped
//!                             │                      │  │                │
//!                             │ destroy              │  │ destroy        │ destroy
//!                             ▼                      ▼  ▼                ▼
//!                         (removed)               (removed on error)  (removed)
//!                                                     ▲
//!                                                     │ failure during launch
//!                                                   error
//! ```
//!
//! Every transition on a given sandbox is serialized through that
//! sandbox's own `tokio::sync::Mutex` — `start`/`stop`/`exec` cross
//! `.await` points, which rules out `parking_lot` here (spec §4.7).

mod record;
mod resolver;

pub use record::{SandboxRecord, DEFAULT_START_TIMEOUT};
pub use resolver::{PathSourceTreeResolver, SourceTreeResolver};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::process::Command as TokioCommand;
use tokio::sync::Mutex as AsyncMutex;

use boxwarden_shared::constants::mount::DEFAULT_MOUNT_POINT;
use boxwarden_shared::constants::shell::DEFAULT_EXEC_SHELL;
use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{
    ExecRequest, ExecResult, RuntimeVariant, SandboxCreateRequest, SandboxDescriptor, SandboxId,
    SandboxStatus,
};

use crate::delta::DeltaStore;
use crate::jailer::sandbox::{ContainerSandbox, MockSandbox};
use crate::jailer::{Jail, JailerBuilder};
use crate::permission::CompiledRuleSet;
use crate::session::SessionManager;
use crate::vfs::{mount_default, EnforcingFs};

/// Owns every sandbox this process knows about, plus the shared session
/// table (sessions are scoped to a sandbox but tracked centrally so a
/// sandbox teardown can sweep its sessions in one pass).
pub struct LifecycleManager<R: SourceTreeResolver = PathSourceTreeResolver> {
    /// Root directory under which each sandbox gets `<base>/<id>/delta`
    /// and `<base>/<id>/mount`.
    base_dir: PathBuf,
    resolver: R,
    sandboxes: parking_lot::RwLock<HashMap<SandboxId, Arc<AsyncMutex<SandboxRecord>>>>,
    sessions: SessionManager,
}

impl LifecycleManager<PathSourceTreeResolver> {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_resolver(base_dir, PathSourceTreeResolver)
    }
}

impl<R: SourceTreeResolver> LifecycleManager<R> {
    pub fn with_resolver(base_dir: impl Into<PathBuf>, resolver: R) -> Self {
        Self {
            base_dir: base_dir.into(),
            resolver,
            sandboxes: parking_lot::RwLock::new(HashMap::new()),
            sessions: SessionManager::new(),
        }
    }

    fn sandbox_dir(&self, id: &SandboxId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    async fn record(&self, id: &SandboxId) -> WardenResult<Arc<AsyncMutex<SandboxRecord>>> {
        self.sandboxes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WardenError::NotFound(format!("sandbox {id} not found")))
    }

    /// **create** (spec §4.7): validates inputs, compiles the rule set
    /// (fail fast), allocates an id, persists the record as `pending`.
    /// Touches no filesystem or runtime state.
    pub fn create(&self, req: SandboxCreateRequest) -> WardenResult<SandboxId> {
        let rules = CompiledRuleSet::compile(&req.rules)?;
        let rule_count = req.rules.len();

        if req.runtime_variant == RuntimeVariant::Container && req.container_image.is_none() {
            return Err(WardenError::Validation(
                "container runtime variant requires a container_image".to_string(),
            ));
        }

        let source_root = self.resolver.resolve(&req.source_tree_id)?;
        let id = SandboxId::new();
        let dir = self.sandbox_dir(&id);
        let sandbox_mount_point = req
            .mount_point
            .clone()
            .unwrap_or_else(|| DEFAULT_MOUNT_POINT.to_string());

        let now = Utc::now();
        let record = SandboxRecord {
            id,
            source_tree_id: req.source_tree_id,
            status: SandboxStatus::Pending,
            labels: req.labels,
            created_at: now,
            started_at: None,
            stopped_at: None,
            expires_at: req.expires_in.map(|ttl| now + ttl),
            rules,
            rule_count,
            resource_limits: req.resource_limits,
            runtime_variant: req.runtime_variant,
            network: req.network,
            container_image: req.container_image,
            host_mount_point: dir.join("mount"),
            sandbox_mount_point,
            source_root,
            delta_root: dir.join("delta"),
            delta: None,
            mount: None,
            jail: None,
        };

        self.sandboxes
            .write()
            .insert(id, Arc::new(AsyncMutex::new(record)));
        Ok(id)
    }

    pub async fn descriptor(&self, id: &SandboxId) -> WardenResult<SandboxDescriptor> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(guard.descriptor())
    }

    /// **start** (spec §4.7): `pending`/`stopped` → `running`. Creates the
    /// delta directory, mounts the virtual filesystem, waits for
    /// readiness, launches the isolation runtime. Any failure rolls back
    /// in reverse order.
    pub async fn start(&self, id: &SandboxId) -> WardenResult<()> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;

        match guard.status {
            SandboxStatus::Pending | SandboxStatus::Stopped => {}
            other => {
                return Err(WardenError::PreconditionFailed(format!(
                    "sandbox {id} is {other:?}, cannot start"
                )));
            }
        }

        if let Err(err) = self.start_locked(&mut *guard).await {
            guard.status = SandboxStatus::Error;
            tracing::warn!(sandbox_id = %id, error = %err, "start failed, sandbox moved to error");
            return Err(err);
        }

        guard.status = SandboxStatus::Running;
        guard.started_at = Some(Utc::now());
        Ok(())
    }

    async fn start_locked(&self, record: &mut SandboxRecord) -> WardenResult<()> {
        std::fs::create_dir_all(&record.delta_root).map_err(WardenError::from)?;
        std::fs::create_dir_all(&record.host_mount_point).map_err(WardenError::from)?;

        let delta = Arc::new(DeltaStore::new(
            record.source_root.clone(),
            record.delta_root.clone(),
        ));
        let fs = EnforcingFs::new(record.rules.clone(), Arc::clone(&delta));

        let mount = match mount_default(fs, &record.host_mount_point) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = std::fs::remove_dir(&record.host_mount_point);
                return Err(err);
            }
        };

        let jail = self.build_jail(record)?;
        jail.prepare()?;

        record.delta = Some(delta);
        record.mount = Some(mount);
        record.jail = Some(jail);
        Ok(())
    }

    fn build_jail(&self, record: &SandboxRecord) -> WardenResult<Box<dyn Jail + Send + Sync>> {
        let builder = JailerBuilder::new()
            .with_id(record.id.to_string())
            .with_mount_point(record.host_mount_point.clone())
            .with_resource_limits(record.resource_limits)
            .with_network(record.network);

        let builder = if let Some(image) = &record.container_image {
            builder.with_container_image(image.clone())
        } else {
            builder
        };

        match record.runtime_variant {
            RuntimeVariant::Namespace => Ok(Box::new(builder.build()?)),
            RuntimeVariant::Container => Ok(Box::new(builder.build_with(ContainerSandbox::new())?)),
            RuntimeVariant::Mock => Ok(Box::new(builder.build_with(MockSandbox::new())?)),
        }
    }

    /// **exec** (spec §4.7): requires `running`; delegates to the jailer,
    /// then triggers a best-effort delta sync.
    pub async fn exec(&self, id: &SandboxId, req: ExecRequest) -> WardenResult<ExecResult> {
        let record = self.record(id).await?;
        let guard = record.lock().await;

        if guard.status != SandboxStatus::Running {
            return Err(WardenError::PreconditionFailed(format!(
                "sandbox {id} is not running"
            )));
        }

        // Mock performs no actual isolation and no actual execution (spec
        // §4.5): it exists so callers can exercise the lifecycle without a
        // real command ever touching the host.
        if guard.runtime_variant == RuntimeVariant::Mock {
            return Ok(ExecResult {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_code: 0,
                duration: std::time::Duration::default(),
            });
        }

        let jail = guard
            .jail
            .as_ref()
            .ok_or_else(|| WardenError::Internal("running sandbox has no jail".to_string()))?;

        let mut cmd = jail.command(std::path::Path::new(DEFAULT_EXEC_SHELL), &[
            "-c".to_string(),
            req.command.clone(),
        ]);
        for (key, value) in &req.env {
            cmd.env(key, value);
        }
        if let Some(working_dir) = &req.working_dir {
            cmd.current_dir(guard.host_mount_point.join(working_dir.trim_start_matches('/')));
        } else {
            cmd.current_dir(&guard.host_mount_point);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let delta = guard.delta.clone();
        drop(guard);

        let mut tokio_cmd = TokioCommand::from(cmd);
        // A timed-out exec drops this future without waiting on the child;
        // without this the orphaned process (e.g. a runaway `sleep`) would
        // keep running after the call returns.
        tokio_cmd.kill_on_drop(true);
        let start = std::time::Instant::now();
        let timeout = req.timeout;
        let stdin_data = req.stdin;

        let run = async move {
            let mut child = tokio_cmd.spawn().map_err(WardenError::from)?;
            if let Some(stdin_text) = stdin_data {
                if let Some(mut stdin) = child.stdin.take() {
                    use tokio::io::AsyncWriteExt;
                    let _ = stdin.write_all(stdin_text.as_bytes()).await;
                }
            }
            let output = child.wait_with_output().await.map_err(WardenError::from)?;
            Ok::<_, WardenError>(output)
        };

        let output = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| WardenError::Timeout(format!("exec exceeded {timeout:?}")))??,
            None => run.await?,
        };

        let result = ExecResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        };

        if let Some(delta) = delta {
            match delta.sync() {
                Ok(report) if !report.errors.is_empty() => {
                    tracing::warn!(sandbox_id = %id, errors = ?report.errors, "delta sync completed with errors");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(sandbox_id = %id, error = %err, "delta sync failed");
                }
            }
        }

        Ok(result)
    }

    /// **stop** (spec §4.7): destroys sessions, unmounts, tears down the
    /// runtime, retains the delta directory.
    pub async fn stop(&self, id: &SandboxId) -> WardenResult<()> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;

        if guard.status != SandboxStatus::Running && guard.status != SandboxStatus::Error {
            return Err(WardenError::PreconditionFailed(format!(
                "sandbox {id} is not running"
            )));
        }

        self.sessions.destroy_all_for_sandbox(id);

        // Dropping the mount handle and jail tears down the FUSE session
        // and releases the sandbox process; never panics, matching
        // spec §4.7's "cleanup paths never panic" rule.
        guard.mount = None;
        guard.jail = None;
        guard.delta = None;

        guard.status = SandboxStatus::Stopped;
        guard.stopped_at = Some(Utc::now());
        Ok(())
    }

    /// **destroy** (spec §4.7): forcibly stops if running, then removes
    /// the delta and mount directories.
    pub async fn destroy(&self, id: &SandboxId) -> WardenResult<()> {
        let record = self.record(id).await?;

        {
            let mut guard = record.lock().await;
            if guard.status == SandboxStatus::Running || guard.status == SandboxStatus::Error {
                self.sessions.destroy_all_for_sandbox(id);
                guard.mount = None;
                guard.jail = None;
                guard.delta = None;
            }
        }

        self.sandboxes.write().remove(id);

        let dir = self.sandbox_dir(id);
        if dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(sandbox_id = %id, error = %err, "failed to remove sandbox directory");
            }
        }
        Ok(())
    }

    /// **session create** (spec §4.6/§4.7): requires `running`; spawns the
    /// shell through the sandbox's own jail, the same isolation boundary
    /// `exec` uses, so an interactive session is never a bare unwrapped
    /// host process.
    pub async fn create_session(
        &self,
        id: &SandboxId,
        shell: &str,
        shell_args: &[String],
        initial_env: &HashMap<String, String>,
        working_dir: &str,
    ) -> WardenResult<Arc<crate::session::Session>> {
        let record = self.record(id).await?;
        let guard = record.lock().await;

        if guard.status != SandboxStatus::Running {
            return Err(WardenError::PreconditionFailed(format!(
                "sandbox {id} is not running"
            )));
        }

        let jail = guard
            .jail
            .as_ref()
            .ok_or_else(|| WardenError::Internal("running sandbox has no jail".to_string()))?;
        let command = jail.command(std::path::Path::new(shell), shell_args);
        let host_working_dir = guard.host_mount_point.join(working_dir.trim_start_matches('/'));
        let sandbox_id = *id;
        drop(guard);

        self.sessions.create(sandbox_id, command, initial_env, &host_working_dir)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn list(&self) -> Vec<SandboxId> {
        self.sandboxes.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxwarden_shared::access::AccessLevel;
    use boxwarden_shared::types::{NetworkPolicy, PatternRule, ResourceLimits, RuleKind};
    use tempfile::tempdir;

    fn basic_request(source_root: &std::path::Path) -> SandboxCreateRequest {
        SandboxCreateRequest {
            source_tree_id: source_root.display().to_string(),
            rules: vec![PatternRule {
                pattern: "/**".to_string(),
                kind: RuleKind::Glob,
                access: AccessLevel::View,
                priority: 0,
            }],
            labels: HashMap::new(),
            expires_in: None,
            runtime_variant: RuntimeVariant::Mock,
            resource_limits: ResourceLimits::default(),
            container_image: None,
            network: NetworkPolicy::None,
            mount_point: None,
        }
    }

    #[tokio::test]
    async fn create_persists_a_pending_sandbox() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        let manager = LifecycleManager::new(base.path());

        let id = manager.create(basic_request(source.path())).unwrap();
        let descriptor = manager.descriptor(&id).await.unwrap();
        assert_eq!(descriptor.status, SandboxStatus::Pending);
        assert_eq!(descriptor.rule_count, 1);
    }

    #[tokio::test]
    async fn create_rejects_container_variant_without_image() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        let manager = LifecycleManager::new(base.path());

        let mut req = basic_request(source.path());
        req.runtime_variant = RuntimeVariant::Container;
        assert!(manager.create(req).is_err());
    }

    #[tokio::test]
    async fn exec_before_start_is_precondition_failed() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        let manager = LifecycleManager::new(base.path());
        let id = manager.create(basic_request(source.path())).unwrap();

        let result = manager
            .exec(
                &id,
                ExecRequest {
                    command: "true".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(WardenError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn stop_before_start_is_precondition_failed() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        let manager = LifecycleManager::new(base.path());
        let id = manager.create(basic_request(source.path())).unwrap();

        let result = manager.stop(&id).await;
        assert!(matches!(result, Err(WardenError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn operations_on_unknown_sandbox_are_not_found() {
        let base = tempdir().unwrap();
        let manager = LifecycleManager::new(base.path());
        let bogus = SandboxId::new();
        assert!(matches!(
            manager.descriptor(&bogus).await,
            Err(WardenError::NotFound(_))
        ));
    }
}
