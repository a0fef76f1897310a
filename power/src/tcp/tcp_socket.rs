use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    Receiver, Waiter,
    error::{Error, ErrorKind, Result},
    msg::{MsgMeta, SendMsg},
};

/// Sending half of a pooled connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TcpSocket {
    stream: mpsc::Sender<Bytes>,
}

struct FrameBuf(BytesMut);

impl SendMsg for FrameBuf {
    fn size(&self) -> usize {
        self.0.size()
    }

    fn prepare(&mut self) -> Result<()> {
        self.0.extend_from_slice(&super::MAGIC_NUM.to_be_bytes());
        self.0.extend_from_slice(&0u32.to_be_bytes());
        self.0.prepare()
    }

    fn finish(&mut self, meta_offset: usize, payload_offset: usize) -> Result<()> {
        const S: usize = std::mem::size_of::<u32>();
        if meta_offset < S {
            return Err(Error::new(
                ErrorKind::SerializeFailed,
                format!("invalid meta offset: {meta_offset}"),
            ));
        }

        self.0.finish(meta_offset, payload_offset)?;
        let body_len = u32::try_from(self.size() - meta_offset)?;
        self.0[meta_offset - S..meta_offset].copy_from_slice(&body_len.to_be_bytes());
        Ok(())
    }

    fn writer(&mut self) -> impl std::io::Write {
        self.0.writer()
    }
}

impl TcpSocket {
    pub(crate) fn new(stream: mpsc::Sender<Bytes>) -> Self {
        Self { stream }
    }

    /// Queues one frame. Requests get a fresh msgid from `waiter` and the
    /// receiver for their response; responses return `None`.
    ///
    /// # Errors
    ///
    /// Fails if the payload cannot be encoded or the connection is closed.
    pub async fn send<'w, P: Serialize>(
        &self,
        meta: &mut MsgMeta,
        payload: &P,
        waiter: &'w Waiter,
    ) -> Result<Option<Receiver<'w>>> {
        let receiver = if meta.is_req() {
            let (msgid, rx) = waiter.alloc();
            meta.msgid = msgid;
            Some(rx)
        } else {
            None
        };

        let mut frame = FrameBuf(BytesMut::with_capacity(512));
        meta.serialize_to(payload, &mut frame)?;
        if frame.0.len() >= super::MAX_MSG_SIZE {
            return Err(Error::new(
                ErrorKind::TcpParseMsgFailed,
                format!("msg is too long: {}", frame.0.len()),
            ));
        }

        self.stream
            .send(frame.0.freeze())
            .await
            .map_err(|e| Error::new(ErrorKind::TcpSendMsgFailed, e.to_string()))?;

        Ok(receiver)
    }
}
