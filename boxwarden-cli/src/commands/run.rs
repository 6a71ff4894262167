//! `boxwarden run`: create, start, run one command, tear down.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use boxwarden::LifecycleManager;
use boxwarden_shared::types::{
    ExecRequest, NetworkPolicy, ResourceLimits, RuntimeVariant, SandboxCreateRequest,
};
use clap::Args;

use crate::cli::GlobalFlags;
use crate::commands::rules::parse_rule;
use crate::util::to_shell_exit_code;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Host directory bound read-only as the sandbox's source tree.
    #[arg(long)]
    pub source: String,

    /// Access rule, repeatable: PATTERN:KIND:ACCESS[:PRIORITY]
    /// (KIND is file|directory|glob, ACCESS is none|view|read|write).
    #[arg(long = "rule", value_name = "RULE")]
    pub rules: Vec<String>,

    #[arg(long, value_enum, default_value = "namespace")]
    pub runtime: RuntimeArg,

    /// Container image; required when --runtime=container.
    #[arg(long)]
    pub image: Option<String>,

    #[arg(long, value_enum, default_value = "none")]
    pub network: NetworkArg,

    /// Exec timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Command to run inside the sandbox.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum RuntimeArg {
    Namespace,
    Container,
    Mock,
}

impl From<RuntimeArg> for RuntimeVariant {
    fn from(value: RuntimeArg) -> Self {
        match value {
            RuntimeArg::Namespace => RuntimeVariant::Namespace,
            RuntimeArg::Container => RuntimeVariant::Container,
            RuntimeArg::Mock => RuntimeVariant::Mock,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum NetworkArg {
    None,
    Bridge,
    Host,
}

impl From<NetworkArg> for NetworkPolicy {
    fn from(value: NetworkArg) -> Self {
        match value {
            NetworkArg::None => NetworkPolicy::None,
            NetworkArg::Bridge => NetworkPolicy::Bridge,
            NetworkArg::Host => NetworkPolicy::Host,
        }
    }
}

pub async fn execute(args: RunArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let rules = args
        .rules
        .iter()
        .map(|r| parse_rule(r))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let manager = LifecycleManager::new(global.base_dir());

    let request = SandboxCreateRequest {
        source_tree_id: args.source.clone(),
        rules,
        labels: HashMap::new(),
        expires_in: None,
        runtime_variant: args.runtime.into(),
        resource_limits: ResourceLimits::default(),
        container_image: args.image.clone(),
        network: args.network.into(),
        mount_point: None,
    };

    let id = manager.create(request)?;
    tracing::info!(sandbox_id = %id, "sandbox created");

    if let Err(err) = manager.start(&id).await {
        manager.destroy(&id).await.ok();
        return Err(err.into());
    }

    let exec_result = manager
        .exec(
            &id,
            ExecRequest {
                command: args.command.join(" "),
                stdin: None,
                env: HashMap::new(),
                working_dir: None,
                timeout: args.timeout.map(Duration::from_secs),
            },
        )
        .await;

    manager.stop(&id).await.ok();
    manager.destroy(&id).await.ok();

    let result = exec_result?;
    std::io::stdout().write_all(&result.stdout)?;
    std::io::stderr().write_all(&result.stderr)?;

    if !result.success() {
        std::process::exit(to_shell_exit_code(result.exit_code));
    }
    Ok(())
}
