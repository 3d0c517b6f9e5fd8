//! I/O channel: a non-blocking, full-duplex byte endpoint over a local or TCP socket, with
//! best-effort peer-credential retrieval on platforms that support it.

use crate::error::PulseError;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Peer credentials, retrievable only on a connected `AF_UNIX` socket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<u32>,
}

/// The result of a non-blocking I/O attempt: either it made progress, or the fd is not ready yet.
#[derive(Debug)]
pub enum IoResult<T> {
    Done(T),
    WouldBlock,
}

/// A full-duplex, non-blocking byte channel. Implemented for local (`AF_UNIX`) and TCP sockets;
/// credential variants degrade to plain I/O (returning `None` for the credentials) on transports
/// that don't support out-of-band credential passing.
pub trait IoChannel: AsRawFd {
    fn read(&mut self, buf: &mut [u8]) -> Result<IoResult<usize>, PulseError>;
    fn write(&mut self, buf: &[u8]) -> Result<IoResult<usize>, PulseError>;

    /// Reads, additionally reporting any credentials that rode along with this read. Sockets that
    /// cannot carry credentials (e.g. TCP) always report `None`.
    fn read_with_creds(&mut self, buf: &mut [u8]) -> Result<IoResult<(usize, Option<Credentials>)>, PulseError> {
        match self.read(buf)? {
            IoResult::Done(n) => Ok(IoResult::Done((n, None))),
            IoResult::WouldBlock => Ok(IoResult::WouldBlock),
        }
    }

    /// Whether this transport is local (eligible for shared-memory block exchange and credential
    /// passing), as opposed to a network socket.
    fn is_local(&self) -> bool;
}

fn classify_io_error(e: std::io::Error) -> Result<IoResult<usize>, PulseError> {
    match e.kind() {
        ErrorKind::WouldBlock => Ok(IoResult::WouldBlock),
        ErrorKind::Interrupted => Ok(IoResult::WouldBlock),
        _ => Err(e.into()),
    }
}

/// An `AF_UNIX` stream socket channel. Supports credential retrieval via `SO_PEERCRED` on Linux.
pub struct UnixChannel {
    stream: UnixStream,
}

impl UnixChannel {
    pub fn new(stream: UnixStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(UnixChannel { stream })
    }

    #[cfg(target_os = "linux")]
    fn peer_credentials(&self) -> Option<Credentials> {
        let fd = self.stream.as_raw_fd();
        let mut creds = libc::ucred { pid: 0, uid: 0, gid: 0 };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut creds as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret != 0 {
            return None;
        }
        Some(Credentials { uid: creds.uid, gid: creds.gid, pid: Some(creds.pid as u32) })
    }

    #[cfg(not(target_os = "linux"))]
    fn peer_credentials(&self) -> Option<Credentials> {
        None
    }
}

impl AsRawFd for UnixChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl IoChannel for UnixChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<IoResult<usize>, PulseError> {
        match self.stream.read(buf) {
            Ok(0) => Err(PulseError::ConnectionTerminated),
            Ok(n) => Ok(IoResult::Done(n)),
            Err(e) => classify_io_error(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<IoResult<usize>, PulseError> {
        match self.stream.write(buf) {
            Ok(n) => Ok(IoResult::Done(n)),
            Err(e) => classify_io_error(e),
        }
    }

    fn read_with_creds(&mut self, buf: &mut [u8]) -> Result<IoResult<(usize, Option<Credentials>)>, PulseError> {
        let creds = self.peer_credentials();
        match self.read(buf)? {
            IoResult::Done(n) => Ok(IoResult::Done((n, creds))),
            IoResult::WouldBlock => Ok(IoResult::WouldBlock),
        }
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// A TCP stream channel, for `tcp4:`/`tcp6:` server addresses. Never carries credentials.
pub struct TcpChannel {
    stream: std::net::TcpStream,
}

impl TcpChannel {
    pub fn new(stream: std::net::TcpStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(TcpChannel { stream })
    }
}

impl AsRawFd for TcpChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl IoChannel for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<IoResult<usize>, PulseError> {
        match self.stream.read(buf) {
            Ok(0) => Err(PulseError::ConnectionTerminated),
            Ok(n) => Ok(IoResult::Done(n)),
            Err(e) => classify_io_error(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<IoResult<usize>, PulseError> {
        match self.stream.write(buf) {
            Ok(n) => Ok(IoResult::Done(n)),
            Err(e) => classify_io_error(e),
        }
    }

    fn is_local(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_socketpair_round_trips_bytes() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut a = UnixChannel::new(a).unwrap();
        let mut b = UnixChannel::new(b).unwrap();
        assert!(matches!(a.write(b"hi").unwrap(), IoResult::Done(2)));
        let mut buf = [0u8; 2];
        // give the kernel a moment in case of scheduling jitter; socketpair is usually immediate.
        loop {
            match b.read(&mut buf).unwrap() {
                IoResult::Done(n) => {
                    assert_eq!(n, 2);
                    assert_eq!(&buf, b"hi");
                    break;
                }
                IoResult::WouldBlock => continue,
            }
        }
    }

    #[test]
    fn unix_channel_reports_local() {
        let (a, _b) = UnixStream::pair().unwrap();
        let a = UnixChannel::new(a).unwrap();
        assert!(a.is_local());
    }
}
