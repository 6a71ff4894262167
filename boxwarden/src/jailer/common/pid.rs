//! PID file writing for the `pre_exec` hook.
//!
//! Async-signal-safe: the file is opened/written/closed with raw syscalls
//! so the caller's PID file is the single source of truth for "is this
//! sandbox's process running" without racing against `fork()`.

/// Write the current process's PID (as decimal ASCII) to `path`.
/// Async-signal-safe.
///
/// # Safety
///
/// `path` must be a null-terminated C string. Only uses `open`, `write`,
/// `close`, and `getpid` — no allocation, no logging.
pub fn write_pid_file_raw(path: &std::ffi::CStr) -> Result<(), i32> {
    // SAFETY: path is a valid null-terminated C string; all syscalls used
    // here are async-signal-safe.
    unsafe {
        let fd = libc::open(
            path.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            0o644,
        );
        if fd < 0 {
            return Err(*libc::__errno_location());
        }

        let pid = libc::getpid();
        let mut buf = [0u8; 16];
        let len = write_pid_to_buf(&mut buf, pid);

        let written = libc::write(fd, buf.as_ptr() as *const libc::c_void, len);
        libc::close(fd);

        if written < 0 {
            return Err(*libc::__errno_location());
        }
    }
    Ok(())
}

/// Write a pid_t as decimal ASCII into a stack buffer. Returns bytes written.
fn write_pid_to_buf(buf: &mut [u8], mut pid: libc::pid_t) -> usize {
    if pid == 0 {
        buf[0] = b'0';
        return 1;
    }
    let mut temp = [0u8; 10];
    let mut len = 0;
    while pid > 0 {
        temp[len] = b'0' + (pid % 10) as u8;
        pid /= 10;
        len += 1;
    }
    for i in 0..len {
        buf[i] = temp[len - 1 - i];
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn write_pid_to_buf_formats_decimal() {
        let mut buf = [0u8; 16];
        let len = write_pid_to_buf(&mut buf, 1234);
        assert_eq!(&buf[..len], b"1234");
    }

    #[test]
    fn write_pid_to_buf_handles_zero() {
        let mut buf = [0u8; 16];
        let len = write_pid_to_buf(&mut buf, 0);
        assert_eq!(&buf[..len], b"0");
    }

    #[test]
    fn write_pid_file_raw_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        let c_path = CString::new(path.to_str().unwrap()).unwrap();

        write_pid_file_raw(&c_path).expect("should write pid file");

        let contents = std::fs::read_to_string(&path).unwrap();
        let pid: libc::pid_t = contents.trim().parse().unwrap();
        assert_eq!(pid, unsafe { libc::getpid() });
    }
}
