//! `boxwarden shell`: attach an interactive session to a fresh sandbox.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use boxwarden::LifecycleManager;
use boxwarden_shared::constants::shell::DEFAULT_SESSION_SHELL;
use boxwarden_shared::types::{NetworkPolicy, ResourceLimits, SandboxCreateRequest};
use clap::Args;

use crate::cli::GlobalFlags;
use crate::commands::rules::parse_rule;

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Host directory bound read-only as the sandbox's source tree.
    #[arg(long)]
    pub source: String,

    /// Access rule, repeatable: PATTERN:KIND:ACCESS[:PRIORITY].
    #[arg(long = "rule", value_name = "RULE")]
    pub rules: Vec<String>,

    #[arg(long, value_enum, default_value = "namespace")]
    pub runtime: super::run::RuntimeArg,

    /// Per-command timeout in seconds.
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

pub async fn execute(args: ShellArgs, global: &GlobalFlags) -> anyhow::Result<()> {
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
        container_image: None,
        network: NetworkPolicy::None,
        mount_point: None,
    };

    let id = manager.create(request)?;
    manager.start(&id).await?;

    let session_result = manager
        .create_session(&id, DEFAULT_SESSION_SHELL, &[], &HashMap::new(), "/")
        .await;

    let session = match session_result {
        Ok(session) => session,
        Err(err) => {
            manager.stop(&id).await.ok();
            manager.destroy(&id).await.ok();
            return Err(err.into());
        }
    };

    eprintln!("attached to sandbox {id}; type 'exit' to leave");
    let timeout = Duration::from_secs(args.timeout);
    let stdin = io::stdin();

    loop {
        print!("boxwarden> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        match session.exec(line, timeout) {
            Ok(result) => {
                io::stdout().write_all(&result.stdout)?;
                if !result.success() {
                    eprintln!("[exit code {}]", result.exit_code);
                }
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }

    manager.sessions().destroy(session.id()).ok();
    manager.stop(&id).await.ok();
    manager.destroy(&id).await.ok();
    Ok(())
}
