use crate::{
    get_u32, get_u64, nlmsg_align, put_u32, put_u64, read_headers, CnMsgHeader, DecodeError,
    NlMsgHeader, CN_MSG_HDRLEN, NLMSG_DONE, NLMSG_HDRLEN,
};

/// Start of `struct proc_event` inside a notification.
pub const PROC_EVENT_OFFSET: usize = NLMSG_HDRLEN + CN_MSG_HDRLEN;
/// Start of the `event_data` union, after `what`, `cpu` and `timestamp_ns`.
pub const PROC_EVENT_DATA_OFFSET: usize = PROC_EVENT_OFFSET + 16;
/// Largest union member is `comm_proc_event` (pid, tgid, comm[16]).
const PROC_EVENT_DATA_LEN: usize = 24;
const PROC_EVENT_LEN: usize = PROC_EVENT_DATA_OFFSET - PROC_EVENT_OFFSET + PROC_EVENT_DATA_LEN;

/// Size of a notification as the kernel sends it.
pub const EVENT_NOTIFICATION_LEN: usize = nlmsg_align(PROC_EVENT_OFFSET + PROC_EVENT_LEN);

/// Values of `proc_event.what`.
pub mod proc_event_what {
    pub const NONE: u32 = 0x0000_0000;
    pub const FORK: u32 = 0x0000_0001;
    pub const EXEC: u32 = 0x0000_0002;
    pub const UID: u32 = 0x0000_0004;
    pub const GID: u32 = 0x0000_0040;
    pub const SID: u32 = 0x0000_0080;
    pub const PTRACE: u32 = 0x0000_0100;
    pub const COMM: u32 = 0x0000_0200;
    pub const NONZERO_EXIT: u32 = 0x2000_0000;
    pub const COREDUMP: u32 = 0x4000_0000;
    pub const EXIT: u32 = 0x8000_0000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentTask {
    pub pid: u32,
    pub tgid: u32,
}

/// The `event_data` member selected by `what`. Kinds this crate does not
/// decode keep only their discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcEvent {
    /// Acknowledgement of a subscribe request; `err` is 0 on success.
    None { err: u32 },
    Exec {
        pid: u32,
        tgid: u32,
    },
    Exit {
        pid: u32,
        tgid: u32,
        /// Wait status as reported by the kernel.
        exit_code: u32,
        exit_signal: u32,
        parent: Option<ParentTask>,
    },
    Other { what: u32 },
}

impl ProcEvent {
    pub fn what(&self) -> u32 {
        match self {
            ProcEvent::None { .. } => proc_event_what::NONE,
            ProcEvent::Exec { .. } => proc_event_what::EXEC,
            ProcEvent::Exit { .. } => proc_event_what::EXIT,
            ProcEvent::Other { what } => *what,
        }
    }

    fn read(what: u32, buf: &[u8]) -> Result<Self, DecodeError> {
        let data = PROC_EVENT_DATA_OFFSET;
        let event = match what {
            proc_event_what::NONE => ProcEvent::None {
                err: get_u32(buf, data)?,
            },
            proc_event_what::EXEC => ProcEvent::Exec {
                pid: get_u32(buf, data)?,
                tgid: get_u32(buf, data + 4)?,
            },
            proc_event_what::EXIT => {
                // parent_pid/parent_tgid were appended to exit_proc_event later
                let parent = match (get_u32(buf, data + 16), get_u32(buf, data + 20)) {
                    (Ok(pid), Ok(tgid)) => Some(ParentTask { pid, tgid }),
                    _ => None,
                };
                ProcEvent::Exit {
                    pid: get_u32(buf, data)?,
                    tgid: get_u32(buf, data + 4)?,
                    exit_code: get_u32(buf, data + 8)?,
                    exit_signal: get_u32(buf, data + 12)?,
                    parent,
                }
            }
            what => ProcEvent::Other { what },
        };
        Ok(event)
    }

    fn write(&self, buf: &mut [u8]) {
        let data = PROC_EVENT_DATA_OFFSET;
        match *self {
            ProcEvent::None { err } => put_u32(buf, data, err),
            ProcEvent::Exec { pid, tgid } => {
                put_u32(buf, data, pid);
                put_u32(buf, data + 4, tgid);
            }
            ProcEvent::Exit {
                pid,
                tgid,
                exit_code,
                exit_signal,
                parent,
            } => {
                put_u32(buf, data, pid);
                put_u32(buf, data + 4, tgid);
                put_u32(buf, data + 8, exit_code);
                put_u32(buf, data + 12, exit_signal);
                if let Some(parent) = parent {
                    put_u32(buf, data + 16, parent.pid);
                    put_u32(buf, data + 20, parent.tgid);
                }
            }
            ProcEvent::Other { .. } => {}
        }
    }
}

/// A decoded `nlmsghdr` + `cn_msg` + `proc_event` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventNotification {
    pub header: NlMsgHeader,
    pub cn: CnMsgHeader,
    pub cpu: u32,
    /// Nanoseconds since boot.
    pub timestamp_ns: u64,
    pub event: ProcEvent,
}

impl EventNotification {
    pub fn new(event: ProcEvent, cpu: u32, timestamp_ns: u64) -> Self {
        Self {
            header: NlMsgHeader {
                len: EVENT_NOTIFICATION_LEN as u32,
                kind: NLMSG_DONE,
                ..Default::default()
            },
            cn: CnMsgHeader::proc(PROC_EVENT_LEN as u16),
            cpu,
            timestamp_ns,
            event,
        }
    }

    pub fn encode(&self) -> [u8; EVENT_NOTIFICATION_LEN] {
        let mut buf = [0u8; EVENT_NOTIFICATION_LEN];
        self.header.write(&mut buf);
        self.cn.write(&mut buf);
        put_u32(&mut buf, PROC_EVENT_OFFSET, self.event.what());
        put_u32(&mut buf, PROC_EVENT_OFFSET + 4, self.cpu);
        put_u64(&mut buf, PROC_EVENT_OFFSET + 8, self.timestamp_ns);
        self.event.write(&mut buf);
        buf
    }

    /// Decodes one notification. `bytes` is what a single `recv` returned;
    /// anything shorter than the fields being read yields `Truncated`.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (header, cn, bytes) = read_headers(bytes, PROC_EVENT_DATA_OFFSET)?;
        let what = get_u32(bytes, PROC_EVENT_OFFSET)?;
        Ok(Self {
            header,
            cn,
            cpu: get_u32(bytes, PROC_EVENT_OFFSET + 4)?,
            timestamp_ns: get_u64(bytes, PROC_EVENT_OFFSET + 8)?,
            event: ProcEvent::read(what, bytes)?,
        })
    }
}

pub fn decode_event_notification(bytes: &[u8]) -> Result<EventNotification, DecodeError> {
    EventNotification::decode(bytes)
}
