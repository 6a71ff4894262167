//! MockSandbox — `RuntimeVariant::Mock` (spec §4.5: "performs no actual
//! isolation; used for tests and for environments where neither namespace
//! nor container isolation is available").

use std::path::Path;
use std::process::Command;

use boxwarden_shared::errors::WardenResult;

use super::{Sandbox, SandboxContext};

#[derive(Debug, Default)]
pub struct MockSandbox;

impl MockSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Sandbox for MockSandbox {
    fn is_available(&self) -> bool {
        true
    }

    fn setup(&self, _ctx: &SandboxContext) -> WardenResult<()> {
        Ok(())
    }

    fn wrap(&self, _ctx: &SandboxContext, binary: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(args);
        cmd
    }

    fn cgroup_procs_path(&self, _ctx: &SandboxContext) -> Option<std::ffi::CString> {
        None
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxwarden_shared::types::{NetworkPolicy, ResourceLimits};

    #[test]
    fn mock_sandbox_is_always_available() {
        assert!(MockSandbox::new().is_available());
    }

    #[test]
    fn mock_sandbox_wraps_without_modification() {
        let sandbox = MockSandbox::new();
        let limits = ResourceLimits::default();
        let ctx = SandboxContext {
            id: "test",
            paths: vec![],
            resource_limits: &limits,
            network: NetworkPolicy::None,
            container_image: None,
        };
        let cmd = sandbox.wrap(&ctx, Path::new("/bin/echo"), &["hi".to_string()]);
        assert_eq!(cmd.get_program(), "/bin/echo");
    }
}
