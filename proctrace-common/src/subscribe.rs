use crate::{
    get_u32, nlmsg_align, put_u32, read_headers, CnMsgHeader, DecodeError, NlMsgHeader,
    CN_MSG_HDRLEN, NLMSG_DONE, NLMSG_HDRLEN,
};

const OP_OFFSET: usize = NLMSG_HDRLEN + CN_MSG_HDRLEN;
const OP_LEN: usize = 4;

/// Size of a subscribe request on the wire, `nlmsg_len` included.
pub const SUBSCRIBE_REQUEST_LEN: usize = nlmsg_align(OP_OFFSET + OP_LEN);

/// `enum proc_cn_mcast_op`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum McastOp {
    Listen = 1,
    Ignore = 2,
}

impl McastOp {
    pub fn from_enable(enable: bool) -> Self {
        if enable {
            McastOp::Listen
        } else {
            McastOp::Ignore
        }
    }
}

impl TryFrom<u32> for McastOp {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(McastOp::Listen),
            2 => Ok(McastOp::Ignore),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub header: NlMsgHeader,
    pub cn: CnMsgHeader,
    pub op: McastOp,
}

impl SubscribeRequest {
    pub fn new(op: McastOp, pid: u32) -> Self {
        Self {
            header: NlMsgHeader {
                len: SUBSCRIBE_REQUEST_LEN as u32,
                kind: NLMSG_DONE,
                flags: 0,
                seq: 0,
                pid,
            },
            cn: CnMsgHeader::proc(OP_LEN as u16),
            op,
        }
    }

    pub fn encode(&self) -> [u8; SUBSCRIBE_REQUEST_LEN] {
        let mut buf = [0u8; SUBSCRIBE_REQUEST_LEN];
        self.header.write(&mut buf);
        self.cn.write(&mut buf);
        put_u32(&mut buf, OP_OFFSET, self.op as u32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (header, cn, bytes) = read_headers(bytes, OP_OFFSET + OP_LEN)?;
        let op = McastOp::try_from(get_u32(bytes, OP_OFFSET)?)?;
        Ok(Self { header, cn, op })
    }
}

/// Encodes the request that turns the proc event multicast on (`enable`) or
/// off for the socket bound to `pid`.
pub fn encode_subscribe_request(enable: bool, pid: u32) -> [u8; SUBSCRIBE_REQUEST_LEN] {
    SubscribeRequest::new(McastOp::from_enable(enable), pid).encode()
}

pub fn decode_subscribe_request(bytes: &[u8]) -> Result<SubscribeRequest, DecodeError> {
    SubscribeRequest::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CN_IDX_PROC, CN_VAL_PROC, NLMSG_DONE};

    #[test]
    fn request_is_forty_bytes_and_says_so() {
        let bytes = encode_subscribe_request(true, 1234);
        assert_eq!(SUBSCRIBE_REQUEST_LEN, 40);
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &40u32.to_ne_bytes());
        assert_eq!(&bytes[4..6], &NLMSG_DONE.to_ne_bytes());
        assert_eq!(&bytes[12..16], &1234u32.to_ne_bytes());
        assert_eq!(&bytes[16..20], &CN_IDX_PROC.to_ne_bytes());
        assert_eq!(&bytes[20..24], &CN_VAL_PROC.to_ne_bytes());
        assert_eq!(&bytes[32..34], &4u16.to_ne_bytes());
        assert_eq!(&bytes[36..40], &1u32.to_ne_bytes());
    }

    #[test]
    fn opcode_survives_decode() {
        for enable in [true, false] {
            let decoded = decode_subscribe_request(&encode_subscribe_request(enable, 99)).unwrap();
            assert_eq!(decoded.op, McastOp::from_enable(enable));
            assert_eq!(decoded.header.pid, 99);
            assert_eq!(decoded.header.len as usize, SUBSCRIBE_REQUEST_LEN);
        }
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut bytes = encode_subscribe_request(true, 1);
        bytes[36..40].copy_from_slice(&7u32.to_ne_bytes());
        assert_eq!(
            decode_subscribe_request(&bytes),
            Err(DecodeError::UnknownOpcode(7))
        );
    }

    #[test]
    fn short_request_is_truncated() {
        let bytes = encode_subscribe_request(false, 1);
        assert!(matches!(
            decode_subscribe_request(&bytes[..30]),
            Err(DecodeError::Truncated { needed: 40, available: 30 })
        ));
    }
}
