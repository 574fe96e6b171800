#![allow(dead_code)]

use proctrace::channel::Transport;
use proctrace::signal_handler::StopFlag;
use proctrace_common::{
    decode_subscribe_request, EventNotification, McastOp, ProcEvent, SubscribeRequest,
};
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One scripted answer to `recv`.
pub enum Step {
    Message(Vec<u8>),
    Error(io::Error),
}

pub fn event(event: ProcEvent) -> Step {
    Step::Message(EventNotification::new(event, 0, 1_000).encode().to_vec())
}

pub fn exec(pid: u32) -> Step {
    event(ProcEvent::Exec { pid, tgid: pid })
}

pub fn ack() -> Step {
    event(ProcEvent::None { err: 0 })
}

/// Everything the transport was asked to do, shared with the test.
#[derive(Debug, Default)]
pub struct TransportLog {
    pub created: u32,
    pub released: u32,
    pub open: BTreeSet<u32>,
    pub bound: Vec<(u32, u32, u32)>,
    pub sent: Vec<(u32, SubscribeRequest)>,
    pub recv_calls: u32,
}

impl TransportLog {
    pub fn ops(&self) -> Vec<McastOp> {
        self.sent.iter().map(|(_, req)| req.op).collect()
    }
}

/// In-memory stand-in for the netlink socket. Endpoints are numbered from 1.
/// When the script runs dry, `recv` behaves like a blocked call hit by
/// SIGTERM: the stop flag is raised and `EINTR` comes back.
pub struct ScriptedTransport {
    pub log: Arc<Mutex<TransportLog>>,
    script: VecDeque<Step>,
    stop: Option<StopFlag>,
    pub privileged: bool,
    pub fail_create: bool,
    pub fail_bind: bool,
    pub fail_send: bool,
    pub fail_release: bool,
    next_id: u32,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(TransportLog::default())),
            script: VecDeque::new(),
            stop: None,
            privileged: true,
            fail_create: false,
            fail_bind: false,
            fail_send: false,
            fail_release: false,
            next_id: 1,
        }
    }

    pub fn with_script(mut self, steps: Vec<Step>) -> Self {
        self.script = steps.into();
        self
    }

    pub fn stopping(mut self, stop: &StopFlag) -> Self {
        self.stop = Some(stop.clone());
        self
    }

    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        Arc::clone(&self.log)
    }
}

impl Transport for ScriptedTransport {
    type Endpoint = u32;

    fn has_privilege(&self) -> bool {
        self.privileged
    }

    fn create(&mut self) -> io::Result<u32> {
        if self.fail_create {
            return Err(io::Error::from_raw_os_error(libc::EMFILE));
        }
        let id = self.next_id;
        self.next_id += 1;
        let mut log = self.log.lock().unwrap();
        log.created += 1;
        log.open.insert(id);
        Ok(id)
    }

    fn bind(&mut self, endpoint: &u32, pid: u32, groups: u32) -> io::Result<()> {
        if self.fail_bind {
            return Err(io::Error::from_raw_os_error(libc::EADDRINUSE));
        }
        self.log.lock().unwrap().bound.push((*endpoint, pid, groups));
        Ok(())
    }

    fn send(&mut self, endpoint: &u32, message: &[u8]) -> io::Result<usize> {
        if self.fail_send {
            return Err(io::Error::from_raw_os_error(libc::ECONNREFUSED));
        }
        let request = decode_subscribe_request(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.log.lock().unwrap().sent.push((*endpoint, request));
        Ok(message.len())
    }

    fn recv(&mut self, _endpoint: &u32, buf: &mut [u8]) -> io::Result<usize> {
        self.log.lock().unwrap().recv_calls += 1;
        match self.script.pop_front() {
            Some(Step::Message(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Some(Step::Error(e)) => Err(e),
            None => {
                if let Some(stop) = &self.stop {
                    stop.raise();
                }
                Err(io::Error::from_raw_os_error(libc::EINTR))
            }
        }
    }

    fn release(&mut self, endpoint: u32) -> io::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.released += 1;
        log.open.remove(&endpoint);
        if self.fail_release {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(())
    }
}

/// Lays out `<root>/<pid>/exe` and `<root>/<pid>/cmdline`.
pub fn fake_process(root: &Path, pid: u32, exe: &str, cmdline: &[u8]) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).unwrap();
    symlink(exe, dir.join("exe")).unwrap();
    fs::write(dir.join("cmdline"), cmdline).unwrap();
}
