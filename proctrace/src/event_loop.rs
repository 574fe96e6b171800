//! Blocking receive → decode → dispatch cycle.
//!
//! One thread owns the channel. Between datagrams the loop looks at the
//! [`StopFlag`]; a signal landing while `recv` blocks makes the call return
//! `EINTR`, which is only a cue to look again. Teardown runs on every way
//! out of [`EventLoop::run`].

use crate::channel::{ChannelError, ChannelManager, Transport};
use crate::report::{ExecReport, ExitReport, Reporter};
use crate::resolver::{ProcResolver, ResolveError};
use crate::signal_handler::StopFlag;
use proctrace_common::{decode_event_notification, EventNotification, ProcEvent};
use std::io;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Proc events are 76 bytes; the slack absorbs larger future layouts.
pub const RECV_BUFFER_LEN: usize = 1024;
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Connected,
    Running,
    Stopping,
    Stopped,
}

/// Counters kept across one run, logged at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub lookups: u64,
    pub execs_reported: u64,
    /// Exec events whose process was gone before it could be resolved.
    pub execs_vanished: u64,
    pub exits_seen: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub recv_errors: u64,
    pub report_errors: u64,
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("receive failed {attempts} times in a row: {source}")]
    Transport { attempts: u32, source: io::Error },
}

/// What a single notification turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Listening,
    Reported { pid: u32 },
    Vanished { pid: u32 },
    Exited { pid: u32 },
    Ignored { what: u32 },
}

pub struct EventLoop<T: Transport, R: Reporter> {
    channel: ChannelManager<T>,
    resolver: ProcResolver,
    reporter: R,
    stop: StopFlag,
    report_exits: bool,
    state: LoopState,
    stats: LoopStats,
}

impl<T: Transport, R: Reporter> EventLoop<T, R> {
    pub fn new(
        channel: ChannelManager<T>,
        resolver: ProcResolver,
        reporter: R,
        stop: StopFlag,
    ) -> Self {
        Self {
            channel,
            resolver,
            reporter,
            stop,
            report_exits: false,
            state: LoopState::NotStarted,
            stats: LoopStats::default(),
        }
    }

    pub fn report_exits(mut self, enabled: bool) -> Self {
        self.report_exits = enabled;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn channel(&self) -> &ChannelManager<T> {
        &self.channel
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn connect(&mut self) -> Result<(), LoopError> {
        match self.channel.open() {
            Ok(()) => {
                self.state = LoopState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = LoopState::Stopped;
                Err(e.into())
            }
        }
    }

    /// Connects if needed, then receives until the stop flag is raised or
    /// the transport keeps failing. The channel is closed before returning,
    /// whatever the outcome.
    pub fn run(&mut self) -> Result<LoopStats, LoopError> {
        if self.state != LoopState::Connected {
            self.connect()?;
        }

        self.state = LoopState::Running;
        info!("[EventLoop] Waiting for process events.");
        let result = self.receive_loop();

        self.state = LoopState::Stopping;
        info!("[EventLoop] Stopping, tearing down the channel.");
        self.channel.close();
        self.state = LoopState::Stopped;

        let stats = self.stats;
        info!(
            "[EventLoop] Stopped. received={} reported={} vanished={} exits={} malformed={} recv_errors={}",
            stats.received,
            stats.execs_reported,
            stats.execs_vanished,
            stats.exits_seen,
            stats.malformed,
            stats.recv_errors
        );
        result.map(|()| stats)
    }

    fn receive_loop(&mut self) -> Result<(), LoopError> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut consecutive_errors = 0u32;

        while !self.stop.is_raised() {
            match self.channel.recv(&mut buf) {
                Ok(len) => {
                    consecutive_errors = 0;
                    self.stats.received += 1;
                    self.handle_message(&buf[..len]);
                }
                Err(e) if self.stop.is_raised() => {
                    debug!("[EventLoop] Receive ended during shutdown: {}", e);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("[EventLoop] Receive interrupted, stop flag not set.");
                }
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    self.stats.recv_errors += 1;
                    warn!("[EventLoop] Socket buffer overrun, some process events were lost.");
                }
                Err(e) => {
                    self.stats.recv_errors += 1;
                    consecutive_errors += 1;
                    warn!(
                        "[EventLoop] Receive failed ({}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_RECV_ERRORS, e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                        error!("[EventLoop] Giving up on the connector socket.");
                        return Err(LoopError::Transport {
                            attempts: consecutive_errors,
                            source: e,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes and dispatches one datagram. A message that does not decode
    /// is counted and dropped.
    pub fn handle_message(&mut self, bytes: &[u8]) -> Option<Dispatch> {
        match decode_event_notification(bytes) {
            Ok(notification) => Some(self.dispatch(&notification)),
            Err(e) => {
                self.stats.malformed += 1;
                warn!("[EventLoop] Dropping malformed message: {}", e);
                None
            }
        }
    }

    pub fn dispatch(&mut self, notification: &EventNotification) -> Dispatch {
        match notification.event {
            ProcEvent::None { err } => {
                if err == 0 {
                    info!("[EventLoop] Listening to process events.");
                } else {
                    warn!("[EventLoop] Subscription acknowledged with error {}.", err);
                }
                Dispatch::Listening
            }
            ProcEvent::Exec { pid, tgid } => {
                self.stats.lookups += 1;
                let identity = match self.resolver.identify(pid) {
                    Ok(identity) => identity,
                    Err(ResolveError::NotFound { .. }) => {
                        self.stats.execs_vanished += 1;
                        return Dispatch::Vanished { pid };
                    }
                    Err(e) => {
                        self.stats.execs_vanished += 1;
                        debug!("[EventLoop] Could not resolve exec of {}: {}", pid, e);
                        return Dispatch::Vanished { pid };
                    }
                };

                let report = ExecReport {
                    pid,
                    tgid,
                    timestamp_ns: notification.timestamp_ns,
                    identity: &identity,
                };
                match self.reporter.report_exec(&report) {
                    Ok(()) => self.stats.execs_reported += 1,
                    Err(e) => {
                        self.stats.report_errors += 1;
                        warn!("[EventLoop] Failed to report exec of {}: {}", pid, e);
                    }
                }
                Dispatch::Reported { pid }
            }
            ProcEvent::Exit {
                pid,
                tgid,
                exit_code,
                exit_signal,
                parent,
            } => {
                self.stats.exits_seen += 1;
                if self.report_exits {
                    let report = ExitReport {
                        pid,
                        tgid,
                        timestamp_ns: notification.timestamp_ns,
                        exit_code,
                        exit_signal,
                        parent_pid: parent.map(|p| p.pid),
                    };
                    if let Err(e) = self.reporter.report_exit(&report) {
                        self.stats.report_errors += 1;
                        warn!("[EventLoop] Failed to report exit of {}: {}", pid, e);
                    }
                }
                Dispatch::Exited { pid }
            }
            ProcEvent::Other { what } => {
                self.stats.ignored += 1;
                Dispatch::Ignored { what }
            }
        }
    }
}
