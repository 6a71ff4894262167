//! Per-sandbox state tracked by the lifecycle manager (spec §4.7).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use boxwarden_shared::types::{
    NetworkPolicy, ResourceLimits, RuntimeVariant, SandboxDescriptor, SandboxId, SandboxStatus,
    SourceTreeId,
};

use crate::delta::DeltaStore;
use crate::jailer::Jail;
use crate::permission::CompiledRuleSet;
use crate::vfs::MountHandle;

/// Everything the lifecycle manager needs to remember about one sandbox.
/// Lives inside a `tokio::sync::Mutex` so `start`/`stop`/`exec` see a
/// consistent, serialized view (spec §5 "per-sandbox locks").
pub struct SandboxRecord {
    pub id: SandboxId,
    pub source_tree_id: SourceTreeId,
    pub status: SandboxStatus,
    pub labels: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rules: CompiledRuleSet,
    pub rule_count: usize,
    pub resource_limits: ResourceLimits,
    pub runtime_variant: RuntimeVariant,
    pub network: NetworkPolicy,
    pub container_image: Option<String>,
    /// The host directory the enforcing filesystem is actually FUSE-mounted
    /// at. Bound into the sandbox at the same path by the jailer.
    pub host_mount_point: PathBuf,
    /// The path this mount is presented as inside the sandbox (spec §6:
    /// defaults to `/workspace`). Informational only — the bind mirrors
    /// `host_mount_point` at the same path on both sides.
    pub sandbox_mount_point: String,
    pub source_root: PathBuf,
    pub delta_root: PathBuf,

    /// Populated only while `status == Running`.
    pub delta: Option<Arc<DeltaStore>>,
    pub mount: Option<MountHandle>,
    pub jail: Option<Box<dyn Jail + Send + Sync>>,
}

impl SandboxRecord {
    pub fn descriptor(&self) -> SandboxDescriptor {
        SandboxDescriptor {
            id: self.id,
            source_tree_id: self.source_tree_id.clone(),
            status: self.status,
            labels: self.labels.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            expires_at: self.expires_at,
            rule_count: self.rule_count,
            runtime_variant: self.runtime_variant,
            mount_point: self.sandbox_mount_point.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Default bound on how long `start()` waits for the mount to become
/// ready before treating the launch as failed (spec §4.7 "default 5s").
pub const DEFAULT_START_TIMEOUT: Duration =
    boxwarden_shared::constants::timing::DEFAULT_MOUNT_READY_TIMEOUT;
