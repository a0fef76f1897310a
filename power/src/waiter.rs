use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use foldhash::fast::RandomState;
use tokio::sync::oneshot;

use crate::{Error, ErrorKind, Message, Result};

/// Pending requests keyed by message id.
#[derive(Default)]
pub struct Waiter {
    index: AtomicU64,
    id_map: DashMap<u64, oneshot::Sender<Message>, RandomState>,
}

/// Handle for one pending request. Dropping it forgets the request.
pub struct Receiver<'a> {
    rx: oneshot::Receiver<Message>,
    waiter: &'a Waiter,
    msgid: u64,
}

impl Receiver<'_> {
    /// # Errors
    ///
    /// Returns `TcpRecvMsgFailed` if the connection went away first.
    pub async fn recv(mut self) -> Result<Message> {
        (&mut self.rx)
            .await
            .map_err(|e| Error::new(ErrorKind::TcpRecvMsgFailed, e.to_string()))
    }
}

impl Drop for Receiver<'_> {
    fn drop(&mut self) {
        self.waiter.id_map.remove(&self.msgid);
    }
}

impl Waiter {
    /// Reserves a message id and the receiver its response will arrive on.
    pub fn alloc(&self) -> (u64, Receiver<'_>) {
        let msgid = self.index.fetch_add(1, Ordering::AcqRel);
        let (tx, rx) = oneshot::channel();
        self.id_map.insert(msgid, tx);
        (
            msgid,
            Receiver {
                rx,
                waiter: self,
                msgid,
            },
        )
    }

    pub fn post(&self, msgid: u64, msg: Message) {
        if let Some((_, tx)) = self.id_map.remove(&msgid) {
            let _ = tx.send(msg);
        } else {
            tracing::warn!("no request waiting for msgid {msgid}");
        }
    }

    #[must_use]
    pub fn contains_message_id(&self, msgid: u64) -> bool {
        self.id_map.contains_key(&msgid)
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("pending", &self.id_map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_waiter() {
        let waiter = Arc::new(Waiter::default());

        let (msgid, rx) = waiter.alloc();
        assert_eq!(msgid, 0);
        assert!(waiter.contains_message_id(msgid));

        let handle = tokio::spawn({
            let waiter = waiter.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                let mut msg = Message::default();
                msg.meta.method = "dummy".into();
                waiter.post(msgid, msg);
            }
        });

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.meta.method, "dummy");
        handle.await.unwrap();
        assert!(!waiter.contains_message_id(msgid));

        let (msgid, rx) = waiter.alloc();
        drop(rx);
        assert!(!waiter.contains_message_id(msgid));
    }
}
