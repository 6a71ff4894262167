//! Request/response structs at the boundary described in spec §6.
//!
//! These are plain structs, not wire types — whoever puts an RPC/REST
//! layer in front of boxwarden owns serialization framing; `serde` derives
//! here are a convenience, not a protocol commitment.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::access::AccessLevel;

/// Stable opaque identifier for a sandbox.
pub type SandboxId = Ulid;

/// Stable opaque identifier for a session.
pub type SessionId = Ulid;

/// Identifier of a source tree owned by the (external) storage service.
pub type SourceTreeId = String;

/// One pattern rule as supplied by a caller (spec §3 "Pattern Rule").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Textual pattern: literal segments, `*`, `**`, `?`.
    pub pattern: String,
    /// How `pattern` is interpreted.
    pub kind: RuleKind,
    /// Access level granted when this rule wins.
    pub access: AccessLevel,
    /// Higher wins; unspecified/zero is the lowest priority.
    #[serde(default)]
    pub priority: i64,
}

/// How a [`PatternRule`]'s pattern is interpreted (spec §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Exact path match.
    File,
    /// Prefix match at path-segment granularity.
    Directory,
    /// Wildcard match (`*`, `**`, `?`) against the whole normalized path.
    Glob,
}

/// Which isolation mechanism backs a sandbox (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeVariant {
    /// User-space namespace isolation (bubblewrap).
    Namespace,
    /// Container isolation (docker/podman).
    Container,
    /// No isolation; used only in tests.
    Mock,
}

/// Network policy for container-based sandboxes (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No network access. Default.
    #[default]
    None,
    /// Container's own bridged network.
    Bridge,
    /// Share the host network namespace.
    Host,
}

/// Resource limits for a sandbox's isolation runtime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes, if constrained.
    pub memory_bytes: Option<u64>,
    /// CPU quota (fraction of one core, e.g. `1.5`), if constrained.
    pub cpu_quota: Option<f64>,
    /// Max process/thread count, if constrained.
    pub process_limit: Option<u32>,
}

/// Everything needed to create a sandbox (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxCreateRequest {
    /// Source tree to bind as the sandbox's read-only base.
    pub source_tree_id: SourceTreeId,
    /// Access-control rules, compiled at creation time.
    pub rules: Vec<PatternRule>,
    /// Free-form labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Optional time-to-live; the sandbox is eligible for reaping after this.
    pub expires_in: Option<Duration>,
    /// Which isolation mechanism to use. Defaults to `Namespace`.
    #[serde(default = "default_runtime_variant")]
    pub runtime_variant: RuntimeVariant,
    /// Resource limits for the isolation runtime.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Container image, required when `runtime_variant` is `Container`.
    pub container_image: Option<String>,
    /// Network policy. Defaults to `None`.
    #[serde(default)]
    pub network: NetworkPolicy,
    /// In-sandbox path at which the enforcing filesystem is mounted.
    /// Defaults to `/workspace`.
    pub mount_point: Option<String>,
}

fn default_runtime_variant() -> RuntimeVariant {
    RuntimeVariant::Namespace
}

/// Sandbox status (spec §3 "Sandbox").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Pending,
    Running,
    Stopped,
    Error,
}

/// Read-only view of a sandbox's state, safe to hand to a caller (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxDescriptor {
    pub id: SandboxId,
    pub source_tree_id: SourceTreeId,
    pub status: SandboxStatus,
    pub labels: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rule_count: usize,
    pub runtime_variant: RuntimeVariant,
    pub mount_point: String,
}

/// A single command execution request (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    pub stdin: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    pub timeout: Option<Duration>,
}

/// A session-scoped command execution request (spec §6).
#[derive(Debug, Clone)]
pub struct SessionExecRequest {
    pub command: String,
    pub timeout: Option<Duration>,
}

/// The result of a completed command execution (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A chunk of streaming output, tagged by stream (spec §6).
#[derive(Debug, Clone)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}
