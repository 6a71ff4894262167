//! The session manager (C6): a persistent interactive shell inside a
//! running sandbox, preserving working directory, environment, aliases,
//! and background processes across many command submissions (spec §4.6).

mod manager;
mod marker;
mod strip;

pub use manager::SessionManager;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};

use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{ExecResult, SandboxId, SessionId};

use marker::Marker;

/// A live interactive shell session.
pub struct Session {
    id: SessionId,
    sandbox_id: SandboxId,
    writer: Mutex<Box<dyn Write + Send>>,
    buffer: Arc<Mutex<Vec<u8>>>,
    child: Mutex<Box<dyn Child + Send>>,
    closed: Mutex<bool>,
    // Kept alive for the session's lifetime; dropping it hangs up the pty.
    _pair: PtyPair,
}

impl Session {
    /// Attach a pseudo-terminal to `command` — already wrapped through the
    /// sandbox's jail by the caller, the same way [`crate::lifecycle`]'s
    /// `exec` wraps one-shot commands — and wait for its first prompt.
    ///
    /// `command`'s program, args, and env are carried over into the pty's
    /// command line; `working_dir` and `initial_env` are applied on top,
    /// mirroring how a jailed `exec` layers its own env over the wrapper's.
    pub fn create(
        id: SessionId,
        sandbox_id: SandboxId,
        command: std::process::Command,
        initial_env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> WardenResult<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| WardenError::Runtime(format!("failed to open pty: {e}")))?;

        let mut cmd = CommandBuilder::new(command.get_program());
        for arg in command.get_args() {
            cmd.arg(arg);
        }
        for (key, value) in command.get_envs() {
            if let Some(value) = value {
                cmd.env(key, value);
            }
        }
        cmd.cwd(working_dir);
        for (key, value) in initial_env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| WardenError::Runtime(format!("failed to spawn session shell: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| WardenError::Runtime(format!("failed to clone pty reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| WardenError::Runtime(format!("failed to take pty writer: {e}")))?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        spawn_reader_thread(reader, Arc::clone(&buffer));

        Ok(Self {
            id,
            sandbox_id,
            writer: Mutex::new(writer),
            buffer,
            child: Mutex::new(child),
            closed: Mutex::new(false),
            _pair: pair,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn sandbox_id(&self) -> &SandboxId {
        &self.sandbox_id
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Submit `command` to the live shell and capture its discrete output
    /// and exit code (spec §4.6 "Output framing").
    pub fn exec(&self, command: &str, timeout: Duration) -> WardenResult<ExecResult> {
        if self.is_closed() {
            return Err(WardenError::PreconditionFailed(
                "session closed".to_string(),
            ));
        }

        let marker = Marker::random();
        let framed = marker.frame_command(command);

        {
            let mut writer = self.writer.lock().unwrap();
            writer
                .write_all(framed.as_bytes())
                .map_err(WardenError::from)?;
            writer.flush().map_err(WardenError::from)?;
        }

        let start = Instant::now();
        let read_result = self.read_until_marker(&marker, timeout);

        match read_result {
            Some((output, exit_code)) => {
                let stdout = strip::strip_control_sequences(&output);
                Ok(ExecResult {
                    stdout: stdout.into_bytes(),
                    stderr: Vec::new(),
                    exit_code,
                    duration: start.elapsed(),
                })
            }
            None => {
                self.interrupt();
                Err(WardenError::Timeout(format!(
                    "session command exceeded {:?}",
                    timeout
                )))
            }
        }
    }

    /// Read from the shared buffer until the END marker appears at the
    /// start of a line, or `timeout` elapses.
    fn read_until_marker(&self, marker: &Marker, timeout: Duration) -> Option<(String, i32)> {
        let deadline = Instant::now() + timeout;
        let end_line_prefix = marker.end_line_prefix();

        loop {
            {
                let buf = self.buffer.lock().unwrap();
                let text = String::from_utf8_lossy(&buf);
                if let Some(end_pos) = find_line_start(&text, &end_line_prefix) {
                    let start_marker = marker.start_marker();
                    let body_start = text
                        .find(&start_marker)
                        .map(|p| p + start_marker.len())
                        .unwrap_or(0);
                    let body_start = text[body_start..]
                        .find('\n')
                        .map(|n| body_start + n + 1)
                        .unwrap_or(body_start);
                    let body = text[body_start..end_pos].to_string();
                    let exit_code = parse_exit_code(&text[end_pos..], &end_line_prefix);
                    return Some((body, exit_code));
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Send an interrupt character (Ctrl-C) to abort the current command
    /// without killing the shell itself (spec §4.6 "Timeout behavior").
    fn interrupt(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.write_all(&[0x03]);
            let _ = writer.flush();
        }
    }

    /// Terminate the shell and all its descendants; mark the session
    /// closed (spec §4.6 "destroy").
    pub fn destroy(&self) -> WardenResult<()> {
        *self.closed.lock().unwrap() = true;
        let mut child = self.child.lock().unwrap();
        child
            .kill()
            .map_err(|e| WardenError::Runtime(format!("failed to kill session shell: {e}")))?;
        Ok(())
    }
}

fn spawn_reader_thread(mut reader: Box<dyn Read + Send>, buffer: Arc<Mutex<Vec<u8>>>) {
    std::thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.lock().unwrap().extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }
        }
    });
}

fn find_line_start(text: &str, needle: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(needle) {
        let pos = search_from + rel;
        if pos == 0 || text.as_bytes()[pos - 1] == b'\n' {
            return Some(pos);
        }
        search_from = pos + 1;
    }
    None
}

fn parse_exit_code(after_marker: &str, end_line_prefix: &str) -> i32 {
    after_marker
        .strip_prefix(end_line_prefix)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|code| code.parse().ok())
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_line_start_matches_at_buffer_start() {
        assert_eq!(find_line_start("MARK rest", "MARK"), Some(0));
    }

    #[test]
    fn find_line_start_requires_newline_before() {
        assert_eq!(find_line_start("xMARK rest", "MARK"), None);
        assert_eq!(find_line_start("x\nMARK rest", "MARK"), Some(2));
    }

    #[test]
    fn parse_exit_code_extracts_leading_number() {
        assert_eq!(parse_exit_code("END123 0\n", "END123"), 0);
        assert_eq!(parse_exit_code("END123 17\n", "END123"), 17);
    }

    #[test]
    fn parse_exit_code_defaults_when_unparseable() {
        assert_eq!(parse_exit_code("garbage", "END123"), -1);
    }

    fn spawn_sh_session() -> Session {
        Session::create(
            SessionId::new(),
            SandboxId::new(),
            std::process::Command::new("/bin/sh"),
            &HashMap::new(),
            Path::new("/tmp"),
        )
        .expect("spawn a real /bin/sh for session tests")
    }

    /// Scenario E — exported state survives across exec calls within the
    /// same session (a new session would not see it; see
    /// `SessionManager::destroy` for the teardown half of that property).
    #[test]
    fn exported_variable_persists_across_exec_calls() {
        let session = spawn_sh_session();
        let timeout = Duration::from_secs(5);
        session.exec("export V=hi", timeout).unwrap();
        let result = session.exec("echo $V", timeout).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "hi");
        session.destroy().unwrap();
    }

    /// Property 13 — a `cd` in one command is visible to the next.
    #[test]
    fn working_directory_change_persists_across_exec_calls() {
        let session = spawn_sh_session();
        let timeout = Duration::from_secs(5);
        session.exec("cd /tmp", timeout).unwrap();
        let result = session.exec("pwd", timeout).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "/tmp");
        session.destroy().unwrap();
    }

    #[test]
    fn exec_after_destroy_is_precondition_failed() {
        let session = spawn_sh_session();
        session.destroy().unwrap();
        let err = session.exec("echo hi", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, WardenError::PreconditionFailed(_)));
    }
}
