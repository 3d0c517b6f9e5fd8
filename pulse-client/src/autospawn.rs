//! Autospawn: fork+exec of a local server daemon when no candidate address connects, serialized
//! across concurrent callers with a file lock.

use pulse_protocol::error::PulseError;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Environment variable the spawned daemon reads to discover the pre-created socket fd it should
/// use instead of creating and binding its own.
pub const PASSED_FD_ENV: &str = "PULSE_AUTOSPAWN_FD";

/// Bound on how long autospawn will wait for the daemon to finish its startup fork/exec dance
/// before giving up.
const SPAWN_TIMEOUT: Duration = Duration::from_secs(10);

fn lock_path() -> PathBuf {
    let dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(dir).join("pulse-autospawn.lock")
}

/// Holds the autospawn file lock (an `flock(2)` exclusive lock) for the duration of one connect
/// attempt. The lock is released automatically on drop.
pub struct AutospawnLock {
    file: File,
}

impl AutospawnLock {
    /// Acquires the lock, blocking until held. Serializes autospawn across peers so that exactly
    /// one of a set of racing callers actually forks the daemon.
    pub fn acquire() -> Result<Self, PulseError> {
        let path = lock_path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(AutospawnLock { file })
    }
}

impl Drop for AutospawnLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}

/// Result of a successful spawn: a connected socket to the freshly started daemon.
pub struct SpawnResult {
    pub socket: UnixStream,
}

/// Forks and execs `binary`, passing it one end of a freshly created socketpair via
/// [`PASSED_FD_ENV`], waits (bounded) for the child to exit (the daemon daemonizes itself, so the
/// immediate child exits quickly), and returns the other end of the pair connected for use.
pub fn spawn(binary: &str, args: &[&str]) -> Result<SpawnResult, PulseError> {
    let (ours, theirs) = UnixStream::pair()?;
    let their_fd = theirs.as_raw_fd();

    clear_cloexec(their_fd)?;

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(PulseError::Forked);
    }
    if pid == 0 {
        // Child: exec the daemon with the fd number passed via environment.
        std::env::set_var(PASSED_FD_ENV, their_fd.to_string());
        let c_binary = std::ffi::CString::new(binary).unwrap();
        let c_args: Vec<std::ffi::CString> =
            std::iter::once(binary).chain(args.iter().copied()).map(|a| std::ffi::CString::new(a).unwrap()).collect();
        let mut argv: Vec<*const libc::c_char> = c_args.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());
        unsafe {
            libc::execvp(c_binary.as_ptr(), argv.as_ptr());
            libc::_exit(127);
        }
    }

    drop(theirs);
    let deadline = Instant::now() + SPAWN_TIMEOUT;
    loop {
        let mut status = 0i32;
        let ret = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if ret == pid {
            break;
        }
        if Instant::now() >= deadline {
            return Err(PulseError::Timeout);
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    ours.set_nonblocking(true)?;
    Ok(SpawnResult { socket: ours })
}

fn clear_cloexec(fd: std::os::unix::io::RawFd) -> Result<(), PulseError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_drop_does_not_deadlock_reacquire() {
        std::env::set_var("XDG_RUNTIME_DIR", std::env::temp_dir());
        {
            let _lock = AutospawnLock::acquire().unwrap();
        }
        let _lock2 = AutospawnLock::acquire().unwrap();
    }
}
