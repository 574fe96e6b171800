//! Ownership of the proc connector subscription.
//!
//! [`ChannelManager`] keeps at most one open endpoint. Syscalls go through a
//! [`Transport`], so the open/subscribe/close sequence is the same whether it
//! drives a real netlink socket or a scripted one.

pub mod netlink;

use proctrace_common::{encode_subscribe_request, McastOp, CN_IDX_PROC};
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use netlink::NetlinkTransport;

/// Errors raised while establishing or driving the channel. Everything but
/// `NotConnected` is a startup failure the caller is expected to treat as
/// fatal.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("root privileges are required to listen for process events")]
    PermissionDenied,
    #[error("failed to create netlink connector socket: {0}")]
    SocketCreateFailed(#[source] io::Error),
    #[error("failed to bind to the proc connector group: {0}")]
    BindFailed(#[source] io::Error),
    #[error("failed to subscribe to process events: {0}")]
    SubscribeFailed(#[source] io::Error),
    #[error("channel is not open")]
    NotConnected,
}

/// The syscall surface the channel needs.
pub trait Transport {
    type Endpoint;

    fn has_privilege(&self) -> bool;
    fn create(&mut self) -> io::Result<Self::Endpoint>;
    fn bind(&mut self, endpoint: &Self::Endpoint, pid: u32, groups: u32) -> io::Result<()>;
    fn send(&mut self, endpoint: &Self::Endpoint, message: &[u8]) -> io::Result<usize>;
    /// Blocks until a datagram arrives or a signal interrupts the call.
    fn recv(&mut self, endpoint: &Self::Endpoint, buf: &mut [u8]) -> io::Result<usize>;
    fn release(&mut self, endpoint: Self::Endpoint) -> io::Result<()>;
}

pub struct ChannelManager<T: Transport> {
    transport: T,
    handle: Option<T::Endpoint>,
    pid: u32,
    subscribed: bool,
}

impl<T: Transport> ChannelManager<T> {
    pub fn new(transport: T) -> Self {
        Self::with_pid(transport, std::process::id())
    }

    /// `pid` is used as the netlink port id and as the sender of requests.
    pub fn with_pid(transport: T, pid: u32) -> Self {
        Self {
            transport,
            handle: None,
            pid,
            subscribed: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Opens, binds and subscribes a fresh endpoint. An endpoint that is
    /// already held is closed first, so a reopen never leaks one.
    pub fn open(&mut self) -> Result<(), ChannelError> {
        if !self.transport.has_privilege() {
            return Err(ChannelError::PermissionDenied);
        }

        info!("[Channel] Attempting to connect to the proc connector");
        if self.handle.is_some() {
            info!("[Channel] Existing connection found, disconnecting first");
            self.close();
        }

        let endpoint = self
            .transport
            .create()
            .map_err(ChannelError::SocketCreateFailed)?;

        if let Err(e) = self.transport.bind(&endpoint, self.pid, CN_IDX_PROC) {
            self.discard(endpoint);
            return Err(ChannelError::BindFailed(e));
        }

        if let Err(e) = Self::send_request(&mut self.transport, &endpoint, self.pid, true) {
            self.discard(endpoint);
            return Err(ChannelError::SubscribeFailed(e));
        }

        self.handle = Some(endpoint);
        self.subscribed = true;
        info!("[Channel] Connected and subscribed (port id {})", self.pid);
        Ok(())
    }

    /// Sends a LISTEN (`enable`) or IGNORE request on the open endpoint. A
    /// failed send is returned as is; nothing is retried.
    pub fn subscribe(&mut self, enable: bool) -> Result<(), ChannelError> {
        let endpoint = self.handle.as_ref().ok_or(ChannelError::NotConnected)?;
        Self::send_request(&mut self.transport, endpoint, self.pid, enable)
            .map_err(ChannelError::SubscribeFailed)?;
        self.subscribed = enable;
        Ok(())
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.handle.as_ref() {
            Some(endpoint) => self.transport.recv(endpoint, buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Unsubscribes and releases the endpoint. Safe to call any number of
    /// times; failures are logged and swallowed.
    pub fn close(&mut self) {
        let Some(endpoint) = self.handle.take() else {
            return;
        };

        info!("[Channel] Attempting to disconnect from the proc connector");
        if self.subscribed {
            if let Err(e) = Self::send_request(&mut self.transport, &endpoint, self.pid, false) {
                warn!("[Channel] Could not unsubscribe before closing: {}", e);
            }
            self.subscribed = false;
        }

        match self.transport.release(endpoint) {
            Ok(()) => info!("[Channel] Disconnected from the proc connector"),
            Err(e) => warn!("[Channel] Failed to release the connector socket: {}", e),
        }
    }

    fn discard(&mut self, endpoint: T::Endpoint) {
        if let Err(e) = self.transport.release(endpoint) {
            warn!("[Channel] Failed to release a half-open socket: {}", e);
        }
    }

    fn send_request(
        transport: &mut T,
        endpoint: &T::Endpoint,
        pid: u32,
        enable: bool,
    ) -> io::Result<()> {
        let request = encode_subscribe_request(enable, pid);
        let sent = transport.send(endpoint, &request)?;
        if sent != request.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, request.len()),
            ));
        }
        debug!(
            "[Channel] Sent {:?} request ({} bytes)",
            McastOp::from_enable(enable),
            sent
        );
        Ok(())
    }
}

impl<T: Transport> Drop for ChannelManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}
