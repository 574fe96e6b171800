// src/channel/netlink.rs

use super::Transport;
use nix::unistd::geteuid;
use proctrace_common::NETLINK_CONNECTOR;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use tracing::{debug, warn};

/// `PF_NETLINK` datagram socket speaking `NETLINK_CONNECTOR`.
#[derive(Debug, Default, Clone)]
pub struct NetlinkTransport {
    receive_buffer_bytes: Option<usize>,
}

impl NetlinkTransport {
    pub fn new(receive_buffer_bytes: Option<usize>) -> Self {
        Self {
            receive_buffer_bytes,
        }
    }

    fn set_receive_buffer(fd: &OwnedFd, bytes: usize) -> io::Result<()> {
        let value = libc::c_int::try_from(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "receive buffer too large"))?;
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &value as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Transport for NetlinkTransport {
    type Endpoint = OwnedFd;

    fn has_privilege(&self) -> bool {
        geteuid().is_root()
    }

    fn create(&mut self) -> io::Result<OwnedFd> {
        // SOCK_CLOEXEC keeps the socket out of anything the host later execs
        let fd = unsafe {
            libc::socket(
                libc::PF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                NETLINK_CONNECTOR,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        if let Some(bytes) = self.receive_buffer_bytes {
            match Self::set_receive_buffer(&fd, bytes) {
                Ok(()) => debug!("[Netlink] SO_RCVBUF set to {} bytes", bytes),
                Err(e) => warn!("[Netlink] Could not set SO_RCVBUF to {}: {}", bytes, e),
            }
        }
        Ok(fd)
    }

    fn bind(&mut self, endpoint: &OwnedFd, pid: u32, groups: u32) -> io::Result<()> {
        let mut address: libc::sockaddr_nl = unsafe { mem::zeroed() };
        address.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        address.nl_pid = pid;
        address.nl_groups = groups;

        let rc = unsafe {
            libc::bind(
                endpoint.as_raw_fd(),
                &address as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn send(&mut self, endpoint: &OwnedFd, message: &[u8]) -> io::Result<usize> {
        let sent = unsafe {
            libc::send(
                endpoint.as_raw_fd(),
                message.as_ptr() as *const libc::c_void,
                message.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }

    fn recv(&mut self, endpoint: &OwnedFd, buf: &mut [u8]) -> io::Result<usize> {
        let received = unsafe {
            libc::recv(
                endpoint.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if received < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(received as usize)
    }

    fn release(&mut self, endpoint: OwnedFd) -> io::Result<()> {
        // OwnedFd's drop ignores close(2) errors, so close by hand to see them
        let raw = endpoint.into_raw_fd();
        if unsafe { libc::close(raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

