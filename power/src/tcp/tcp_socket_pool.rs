use std::{collections::HashMap, io::IoSlice, net::SocketAddr, sync::Arc};

use bytes::{Buf, Bytes, BytesMut};
use foldhash::fast::RandomState;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{RwLock, mpsc},
};
use tokio_util::sync::DropGuard;

use super::TcpSocket;
use crate::{
    Message, State, TaskSupervisor, TaskSupervisorGuard,
    error::{Error, ErrorKind, Result},
};

const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Live connections, outgoing ones cached by peer address.
pub struct TcpSocketPool {
    socket_map: RwLock<HashMap<SocketAddr, TcpSocket, RandomState>>,
    task_supervisor: TaskSupervisor,
}

impl TcpSocketPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            socket_map: RwLock::default(),
            task_supervisor: TaskSupervisor::create(),
        })
    }

    /// Closes every connection once its queued frames are written.
    pub fn stop(&self) {
        self.task_supervisor.stop();
    }

    pub fn drop_guard(&self) -> DropGuard {
        self.task_supervisor.drop_guard()
    }

    pub async fn join(&self) {
        self.task_supervisor.all_stopped().await;
    }

    /// Returns the cached connection to `addr`, dialing it on first use.
    ///
    /// # Errors
    ///
    /// Returns `TcpConnectFailed` if the peer cannot be reached.
    pub async fn acquire(self: &Arc<Self>, addr: &SocketAddr, state: &Arc<State>) -> Result<TcpSocket> {
        if let Ok(socket_map) = self.socket_map.try_read()
            && let Some(socket) = socket_map.get(addr)
        {
            return Ok(socket.clone());
        }

        let mut socket_map = self.socket_map.write().await;
        if let Some(socket) = socket_map.get(addr) {
            return Ok(socket.clone());
        }

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::new(ErrorKind::TcpConnectFailed, e.to_string()))?;

        let socket = self.add_socket(*addr, stream, state);
        socket_map.insert(*addr, socket.clone());
        Ok(socket)
    }

    /// Starts the send and receive loops for an established stream.
    pub fn add_socket(
        self: &Arc<Self>,
        addr: SocketAddr,
        stream: TcpStream,
        state: &Arc<State>,
    ) -> TcpSocket {
        let (recv_stream, send_stream) = stream.into_split();
        let (sender, receiver) = mpsc::channel(1024);

        let task = self.task_supervisor.start_async_task();
        tokio::spawn(async move {
            if let Err(e) = Self::start_send_loop(send_stream, receiver, &task).await {
                tracing::error!("send loop for {addr} failed: {e}");
            }
        });

        let socket = TcpSocket::new(sender);
        let task = self.task_supervisor.start_async_task();
        tokio::spawn({
            let this = self.clone();
            let socket = socket.clone();
            let state = state.clone();
            async move {
                tokio::select! {
                    () = task.stopped() => {},
                    r = Self::start_recv_loop(recv_stream, socket, &state) => {
                        if let Err(e) = r {
                            tracing::debug!("recv loop for {addr} ended: {e}");
                        }
                        this.socket_map.write().await.remove(&addr);
                    }
                }
            }
        });
        socket
    }

    fn parse_frame(buffer: &mut BytesMut) -> Result<Option<Bytes>> {
        const S: usize = std::mem::size_of::<u64>();
        let Some(header) = buffer.get(..S).and_then(|b| <[u8; S]>::try_from(b).ok()) else {
            return Ok(None);
        };
        let header = u64::from_be_bytes(header);
        if (header >> 32) as u32 != super::MAGIC_NUM {
            return Err(Error::new(
                ErrorKind::TcpParseMsgFailed,
                format!("invalid header: {header:016X}"),
            ));
        }

        let len = usize::try_from(header & u64::from(u32::MAX))?;
        if S + len >= super::MAX_MSG_SIZE {
            return Err(Error::new(
                ErrorKind::TcpParseMsgFailed,
                format!("msg is too long: {len}"),
            ));
        }

        if buffer.len() < S + len {
            Ok(None)
        } else {
            buffer.advance(S);
            Ok(Some(buffer.split_to(len).freeze()))
        }
    }

    async fn start_recv_loop(
        mut recv_stream: OwnedReadHalf,
        socket: TcpSocket,
        state: &Arc<State>,
    ) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(1 << 16);
        loop {
            if let Some(bytes) = Self::parse_frame(&mut buffer)? {
                let msg = Message::parse(bytes)?;
                state.handle_recv(&socket, msg);
            } else {
                let n = recv_stream
                    .read_buf(&mut buffer)
                    .await
                    .map_err(|e| Error::new(ErrorKind::TcpRecvMsgFailed, e.to_string()))?;
                if n == 0 {
                    return Err(Error::new(
                        ErrorKind::TcpRecvMsgFailed,
                        "socket eof".to_string(),
                    ));
                }
            }
        }
    }

    /// Writes queued frames until the pool stops, then flushes whatever is
    /// already queued and returns.
    async fn start_send_loop(
        mut send_stream: OwnedWriteHalf,
        mut receiver: mpsc::Receiver<Bytes>,
        task: &TaskSupervisorGuard,
    ) -> Result<()> {
        const LIMIT: usize = 64;
        let mut msgs = Vec::with_capacity(LIMIT);
        loop {
            let n = tokio::select! {
                biased;
                n = receiver.recv_many(&mut msgs, LIMIT) => n,
                () = task.stopped(), if !receiver.is_closed() => {
                    receiver.close();
                    continue;
                }
            };
            if n == 0 {
                return Ok(());
            }

            if receiver.is_closed() {
                tokio::time::timeout(FLUSH_TIMEOUT, Self::write_frames(&mut send_stream, &msgs))
                    .await
                    .map_err(|_| {
                        Error::new(ErrorKind::TcpSendMsgFailed, "flush timed out".to_string())
                    })??;
            } else {
                Self::write_frames(&mut send_stream, &msgs).await?;
            }
            msgs.clear();
        }
    }

    async fn write_frames(send_stream: &mut OwnedWriteHalf, msgs: &[Bytes]) -> Result<()> {
        let mut bufs: Vec<IoSlice<'_>> = msgs.iter().map(|m| IoSlice::new(m)).collect();
        let mut slices = &mut bufs[..];
        while !slices.is_empty() {
            let n = send_stream
                .write_vectored(slices)
                .await
                .map_err(|e| Error::new(ErrorKind::TcpSendMsgFailed, e.to_string()))?;
            if n == 0 {
                return Err(Error::new(
                    ErrorKind::TcpSendMsgFailed,
                    "socket closed".to_string(),
                ));
            }
            IoSlice::advance_slices(&mut slices, n);
        }
        Ok(())
    }
}

impl std::fmt::Debug for TcpSocketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocketPool").finish()
    }
}
