use std::io::Write;

use bitflags::bitflags;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::{
    Payload,
    error::{Error, ErrorKind, Result},
};

/// Flags carried by every frame.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MsgFlags(u8);

bitflags! {
    impl MsgFlags: u8 {
        const IsReq = 1;
        const IsRsp = 2;
        /// Meta and payload are MessagePack instead of JSON.
        const UseMessagePack = 4;
    }
}

/// Routing header of a frame.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct MsgMeta {
    /// `"<Service>/<method>"`.
    pub method: String,
    pub flags: MsgFlags,
    /// Correlates a response with the request waiting for it.
    pub msgid: u64,
}

impl MsgMeta {
    #[must_use]
    pub fn is_req(&self) -> bool {
        self.flags.contains(MsgFlags::IsReq)
    }

    #[must_use]
    pub fn is_rsp(&self) -> bool {
        self.flags.contains(MsgFlags::IsRsp)
    }
}

/// A decoded frame body: header plus the still-encoded payload.
///
/// Body layout:
///
/// ```text
/// | 4 bytes  | N bytes | M bytes |
/// | meta_len | meta    | payload |
/// ```
#[derive(Debug, Default)]
pub struct Message {
    pub meta: MsgMeta,
    pub payload: Payload,
}

impl Message {
    #[must_use]
    pub fn new(meta: MsgMeta, payload: Payload) -> Self {
        Self { meta, payload }
    }

    /// Splits a frame body into its header and payload.
    ///
    /// JSON headers are recognised by their leading `{`, anything else is
    /// decoded as MessagePack.
    ///
    /// # Errors
    ///
    /// Returns `DeserializeFailed` when the body is truncated or the header
    /// cannot be decoded.
    pub fn parse(payload: impl Into<Payload>) -> Result<Self> {
        const S: usize = std::mem::size_of::<u32>();
        let mut payload: Payload = payload.into();

        let len = payload.len();
        let Some(prefix) = payload.get(..S).and_then(|b| <[u8; S]>::try_from(b).ok()) else {
            return Err(Error::new(
                ErrorKind::DeserializeFailed,
                format!("invalid msg length: {len}"),
            ));
        };
        let meta_len = u32::from_be_bytes(prefix) as usize;
        if meta_len == 0 {
            return Err(Error::new(
                ErrorKind::DeserializeFailed,
                "empty meta".to_string(),
            ));
        }

        let offset = S + meta_len;
        if offset > len {
            return Err(Error::new(
                ErrorKind::DeserializeFailed,
                format!("invalid meta length: {meta_len}, msg length: {len}"),
            ));
        }

        let meta: MsgMeta = if payload[S] == b'{' {
            serde_json::from_slice(&payload[S..offset])?
        } else {
            rmp_serde::from_slice(&payload[S..offset])?
        };

        payload.advance(offset);
        Ok(Message { meta, payload })
    }

    /// Decodes the payload with the codec named by the header flags.
    ///
    /// An empty payload decodes as `null`, so unit requests need no body.
    ///
    /// # Errors
    ///
    /// Returns the codec error when the payload does not match `P`.
    pub fn deserialize<P: for<'c> Deserialize<'c>>(self) -> Result<P> {
        if self.payload.is_empty() {
            Ok(serde_json::from_value(serde_json::Value::Null)?)
        } else if self.meta.flags.contains(MsgFlags::UseMessagePack) {
            Ok(rmp_serde::from_slice(&self.payload)?)
        } else {
            Ok(serde_json::from_slice(&self.payload)?)
        }
    }
}

/// A growable buffer a frame can be encoded into.
pub trait SendMsg {
    fn size(&self) -> usize;

    /// Writes whatever must precede the body (e.g. the transport header).
    ///
    /// # Errors
    fn prepare(&mut self) -> Result<()>;

    /// Back-fills length prefixes once the body is written.
    ///
    /// # Errors
    fn finish(&mut self, meta_offset: usize, payload_offset: usize) -> Result<()>;

    fn writer(&mut self) -> impl std::io::Write;
}

impl MsgMeta {
    /// Encodes this header and `payload` into `msg`.
    ///
    /// # Errors
    ///
    /// Returns `SerializeFailed` if either part cannot be encoded.
    pub fn serialize_to<M: SendMsg, P: Serialize>(&self, payload: &P, msg: &mut M) -> Result<()> {
        msg.prepare()?;

        let meta_offset = msg.size();
        msg.writer()
            .write_all(&0u32.to_be_bytes())
            .map_err(|e| Error::new(ErrorKind::SerializeFailed, e.to_string()))?;
        let use_msgpack = self.flags.contains(MsgFlags::UseMessagePack);
        if use_msgpack {
            rmp_serde::encode::write_named(&mut msg.writer(), self)?;
        } else {
            serde_json::to_writer(msg.writer(), self)?;
        }

        let payload_offset = msg.size();
        if use_msgpack {
            rmp_serde::encode::write_named(&mut msg.writer(), payload)?;
        } else {
            serde_json::to_writer(msg.writer(), payload)?;
        }

        msg.finish(meta_offset, payload_offset)
    }
}

impl SendMsg for BytesMut {
    fn size(&self) -> usize {
        self.len()
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, meta_offset: usize, payload_offset: usize) -> Result<()> {
        const S: usize = std::mem::size_of::<u32>();
        let meta_len = u32::try_from(payload_offset - meta_offset - S)?;
        self[meta_offset..meta_offset + S].copy_from_slice(&meta_len.to_be_bytes());
        Ok(())
    }

    fn writer(&mut self) -> impl std::io::Write {
        #[repr(transparent)]
        struct Writer<'a>(&'a mut BytesMut);

        impl std::io::Write for Writer<'_> {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        Writer(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_frame() {
        let meta = MsgMeta {
            method: "HelloService/hello".into(),
            flags: MsgFlags::IsReq,
            msgid: 7,
        };
        let mut buf = BytesMut::new();
        meta.serialize_to(&"World".to_string(), &mut buf).unwrap();

        let msg = Message::parse(buf).unwrap();
        assert_eq!(msg.meta, meta);
        assert!(msg.meta.is_req());
        assert_eq!(msg.deserialize::<String>().unwrap(), "World");
    }

    #[test]
    fn test_msgpack_frame() {
        let meta = MsgMeta {
            method: "HelloService/hello".into(),
            flags: MsgFlags::IsRsp | MsgFlags::UseMessagePack,
            msgid: 1,
        };
        let mut buf = BytesMut::new();
        meta.serialize_to(&42u32, &mut buf).unwrap();

        let msg = Message::parse(buf).unwrap();
        assert!(msg.meta.is_rsp());
        assert_eq!(msg.deserialize::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_truncated_frame() {
        let err = Message::parse(BytesMut::from(&[0u8, 0][..])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeserializeFailed);

        let err = Message::parse(BytesMut::from(&[0u8, 0, 0, 9, b'{'][..])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeserializeFailed);
    }

    #[test]
    fn test_empty_payload_is_null() {
        let msg = Message::default();
        let (): () = msg.deserialize().unwrap();
    }
}
