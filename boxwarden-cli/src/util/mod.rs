//! Utility functions shared across commands.

/// Convert a sandbox exec exit code to a shell exit code.
///
/// A command killed by a signal is reported as a negative exit code
/// (e.g. -9 for SIGKILL); shell convention encodes that as 128 + signal.
pub fn to_shell_exit_code(exit_code: i32) -> i32 {
    match exit_code {
        code if code < 0 => 128 + code.abs(),
        code => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_shell_exit_code_success() {
        assert_eq!(to_shell_exit_code(0), 0);
    }

    #[test]
    fn test_to_shell_exit_code_normal_failure() {
        assert_eq!(to_shell_exit_code(1), 1);
        assert_eq!(to_shell_exit_code(127), 127);
    }

    #[test]
    fn test_to_shell_exit_code_signal_termination() {
        // SIGKILL (9)
        assert_eq!(to_shell_exit_code(-9), 137);
        // SIGTERM (15)
        assert_eq!(to_shell_exit_code(-15), 143);
        // SIGINT (2)
        assert_eq!(to_shell_exit_code(-2), 130);
    }
}
