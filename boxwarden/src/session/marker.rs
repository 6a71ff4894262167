//! Random START/END markers that frame a submitted command's output so
//! it can be distinguished from leftover prompt text or background-job
//! noise in the shared pty stream (spec §4.6 "Output framing").

use rand::RngCore;

/// A single-use marker pair generated per command.
pub struct Marker {
    token: String,
}

impl Marker {
    /// Generate a fresh marker from 16 random bytes, hex-encoded so it
    /// never collides with shell metacharacters or needs quoting.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            token: hex::encode(bytes),
        }
    }

    pub fn start_marker(&self) -> String {
        format!("__BW_START_{}__", self.token)
    }

    /// Prefix of the END line, without the trailing exit code. The
    /// session reader matches this against the start of a line, then
    /// parses the exit code that follows it.
    pub fn end_line_prefix(&self) -> String {
        format!("__BW_END_{}__", self.token)
    }

    /// Wrap `command` so the shell echoes the START marker, runs the
    /// command, then echoes the END marker followed by its exit status.
    /// `printf` (not `echo`) avoids shell-dependent escape handling.
    pub fn frame_command(&self, command: &str) -> String {
        format!(
            "printf '%s\\n' '{start}'; {command}\nprintf '%s %d\\n' '{end}' $?\n",
            start = self.start_marker(),
            command = command,
            end = self.end_line_prefix(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_markers_are_unique() {
        let a = Marker::random();
        let b = Marker::random();
        assert_ne!(a.start_marker(), b.start_marker());
    }

    #[test]
    fn frame_command_includes_both_markers() {
        let marker = Marker::random();
        let framed = marker.frame_command("ls -la");
        assert!(framed.contains(&marker.start_marker()));
        assert!(framed.contains(&marker.end_line_prefix()));
        assert!(framed.contains("ls -la"));
    }

    #[test]
    fn marker_token_is_32_hex_chars() {
        let marker = Marker::random();
        assert_eq!(marker.token.len(), 32);
        assert!(marker.token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
