#![cfg_attr(not(any(feature = "std", test)), no_std)]

//! Binary layout of the messages exchanged with the kernel proc connector.
//!
//! Every message is a netlink header (`struct nlmsghdr`, 16 bytes) followed
//! without padding by a connector header (`struct cn_msg`, 20 bytes) and its
//! payload. Offsets are written out explicitly instead of casting `#[repr(C)]`
//! structs, since the C side relies on `__attribute__((packed))` wrappers.
//! All integers are in host byte order.

use core::fmt;

mod event;
mod subscribe;

pub use event::{
    decode_event_notification, proc_event_what, EventNotification, ParentTask, ProcEvent,
    EVENT_NOTIFICATION_LEN, PROC_EVENT_DATA_OFFSET, PROC_EVENT_OFFSET,
};
pub use subscribe::{
    decode_subscribe_request, encode_subscribe_request, McastOp, SubscribeRequest,
    SUBSCRIBE_REQUEST_LEN,
};

/// `NETLINK_CONNECTOR` protocol number for `socket(2)`.
pub const NETLINK_CONNECTOR: i32 = 11;
/// Connector index of the process events group, also its multicast group.
pub const CN_IDX_PROC: u32 = 1;
pub const CN_VAL_PROC: u32 = 1;

pub const NLMSG_ALIGNTO: usize = 4;
pub const NLMSG_HDRLEN: usize = 16;
pub const NLMSG_DONE: u16 = 3;
pub const CN_MSG_HDRLEN: usize = 20;

pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// `struct nlmsghdr`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NlMsgHeader {
    pub len: u32,
    pub kind: u16,
    pub flags: u16,
    pub seq: u32,
    pub pid: u32,
}

impl NlMsgHeader {
    fn write(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.len);
        put_u16(buf, 4, self.kind);
        put_u16(buf, 6, self.flags);
        put_u32(buf, 8, self.seq);
        put_u32(buf, 12, self.pid);
    }

    fn read(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            len: get_u32(buf, 0)?,
            kind: get_u16(buf, 4)?,
            flags: get_u16(buf, 6)?,
            seq: get_u32(buf, 8)?,
            pid: get_u32(buf, 12)?,
        })
    }
}

/// `struct cn_msg` without its trailing flexible data member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CnMsgHeader {
    pub idx: u32,
    pub val: u32,
    pub seq: u32,
    pub ack: u32,
    /// Length of the payload following this header.
    pub len: u16,
    pub flags: u16,
}

impl CnMsgHeader {
    pub fn proc(len: u16) -> Self {
        Self {
            idx: CN_IDX_PROC,
            val: CN_VAL_PROC,
            len,
            ..Default::default()
        }
    }

    pub fn is_proc(&self) -> bool {
        self.idx == CN_IDX_PROC && self.val == CN_VAL_PROC
    }

    fn write(&self, buf: &mut [u8]) {
        let base = NLMSG_HDRLEN;
        put_u32(buf, base, self.idx);
        put_u32(buf, base + 4, self.val);
        put_u32(buf, base + 8, self.seq);
        put_u32(buf, base + 12, self.ack);
        put_u16(buf, base + 16, self.len);
        put_u16(buf, base + 18, self.flags);
    }

    fn read(buf: &[u8]) -> Result<Self, DecodeError> {
        let base = NLMSG_HDRLEN;
        Ok(Self {
            idx: get_u32(buf, base)?,
            val: get_u32(buf, base + 4)?,
            seq: get_u32(buf, base + 8)?,
            ack: get_u32(buf, base + 12)?,
            len: get_u16(buf, base + 16)?,
            flags: get_u16(buf, base + 18)?,
        })
    }
}

/// Reasons a buffer could not be decoded. All of them mean the message is
/// malformed; none of them are fatal to a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends before a field that must be read.
    Truncated { needed: usize, available: usize },
    /// `nlmsg_len` disagrees with the bytes actually received.
    LengthMismatch { declared: u32, available: usize },
    UnexpectedMessageType(u16),
    /// The message was not sent by the proc connector.
    UnexpectedConnector { idx: u32, val: u32 },
    UnknownOpcode(u32),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { needed, available } => write!(
                f,
                "truncated message: need {} bytes, got {}",
                needed, available
            ),
            DecodeError::LengthMismatch {
                declared,
                available,
            } => write!(
                f,
                "declared length {} does not fit {} received bytes",
                declared, available
            ),
            DecodeError::UnexpectedMessageType(kind) => {
                write!(f, "unexpected netlink message type {}", kind)
            }
            DecodeError::UnexpectedConnector { idx, val } => {
                write!(f, "message from connector {}:{} is not a proc event", idx, val)
            }
            DecodeError::UnknownOpcode(op) => write!(f, "unknown multicast opcode {}", op),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Checks the netlink and connector headers shared by both message kinds and
/// returns them with the buffer cut down to the declared length.
fn read_headers(
    bytes: &[u8],
    min_len: usize,
) -> Result<(NlMsgHeader, CnMsgHeader, &[u8]), DecodeError> {
    if bytes.len() < min_len {
        return Err(DecodeError::Truncated {
            needed: min_len,
            available: bytes.len(),
        });
    }
    let header = NlMsgHeader::read(bytes)?;
    let declared = header.len as usize;
    if declared > bytes.len() || declared < min_len {
        return Err(DecodeError::LengthMismatch {
            declared: header.len,
            available: bytes.len(),
        });
    }
    if header.kind != NLMSG_DONE {
        return Err(DecodeError::UnexpectedMessageType(header.kind));
    }
    let bytes = &bytes[..declared];
    let cn = CnMsgHeader::read(bytes)?;
    if !cn.is_proc() {
        return Err(DecodeError::UnexpectedConnector {
            idx: cn.idx,
            val: cn.val,
        });
    }
    Ok((header, cn, bytes))
}

fn check_len(buf: &[u8], offset: usize, width: usize) -> Result<(), DecodeError> {
    if offset + width > buf.len() {
        return Err(DecodeError::Truncated {
            needed: offset + width,
            available: buf.len(),
        });
    }
    Ok(())
}

fn get_u16(buf: &[u8], offset: usize) -> Result<u16, DecodeError> {
    check_len(buf, offset, 2)?;
    Ok(u16::from_ne_bytes([buf[offset], buf[offset + 1]]))
}

fn get_u32(buf: &[u8], offset: usize) -> Result<u32, DecodeError> {
    check_len(buf, offset, 4)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    Ok(u32::from_ne_bytes(raw))
}

fn get_u64(buf: &[u8], offset: usize) -> Result<u64, DecodeError> {
    check_len(buf, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    Ok(u64::from_ne_bytes(raw))
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_ne_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_four() {
        assert_eq!(nlmsg_align(0), 0);
        assert_eq!(nlmsg_align(37), 40);
        assert_eq!(nlmsg_align(40), 40);
        assert_eq!(nlmsg_align(73), 76);
    }

    #[test]
    fn headers_have_kernel_offsets() {
        let mut buf = [0u8; NLMSG_HDRLEN + CN_MSG_HDRLEN];
        NlMsgHeader {
            len: 0x1122_3344,
            kind: NLMSG_DONE,
            flags: 0,
            seq: 7,
            pid: 42,
        }
        .write(&mut buf);
        CnMsgHeader::proc(4).write(&mut buf);

        assert_eq!(&buf[0..4], &0x1122_3344u32.to_ne_bytes());
        assert_eq!(&buf[4..6], &NLMSG_DONE.to_ne_bytes());
        assert_eq!(&buf[12..16], &42u32.to_ne_bytes());
        assert_eq!(&buf[16..20], &CN_IDX_PROC.to_ne_bytes());
        assert_eq!(&buf[20..24], &CN_VAL_PROC.to_ne_bytes());
        assert_eq!(&buf[32..34], &4u16.to_ne_bytes());
    }

    #[test]
    fn short_reads_are_reported_not_panicking() {
        assert_eq!(
            get_u32(&[1, 2, 3], 0),
            Err(DecodeError::Truncated {
                needed: 4,
                available: 3
            })
        );
        assert!(get_u64(&[0; 12], 8).is_err());
    }
}
