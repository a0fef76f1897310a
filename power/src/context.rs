use std::{net::SocketAddr, sync::Arc};

use serde::Serialize;
use tokio_util::sync::DropGuard;

use crate::{
    Error, Router, State,
    msg::{MsgFlags, MsgMeta},
    tcp::TcpSocket,
};

/// Where a request goes, or where a response goes back to.
#[derive(Clone, Debug, Default)]
pub enum SocketEndpoint {
    #[default]
    Invalid,
    Connected(TcpSocket),
    Address(SocketAddr),
}

/// Per-call handle passed to every service method.
#[derive(Clone)]
pub struct Context {
    pub state: Arc<State>,
    pub(crate) endpoint: SocketEndpoint,
    pub(crate) drop_guard: Option<Arc<DropGuard>>,
}

impl Context {
    /// A client-side context with its own connection pool. The pool is
    /// closed when the last clone is dropped.
    #[must_use]
    pub fn create() -> Self {
        Self::create_with_router(Router::default())
    }

    /// Like [`create`](Self::create), but peers may call back into `router`
    /// over the same connections.
    #[must_use]
    pub fn create_with_router(router: Router) -> Self {
        let state = State::create(router);
        Self {
            drop_guard: Some(Arc::new(state.drop_guard())),
            state,
            endpoint: SocketEndpoint::Invalid,
        }
    }

    #[must_use]
    pub fn with_addr(&self, addr: SocketAddr) -> Self {
        Self {
            state: self.state.clone(),
            endpoint: SocketEndpoint::Address(addr),
            drop_guard: self.drop_guard.clone(),
        }
    }

    pub(crate) fn server_ctx(state: &Arc<State>, socket: TcpSocket) -> Self {
        Self {
            state: state.clone(),
            endpoint: SocketEndpoint::Connected(socket),
            drop_guard: None,
        }
    }

    pub async fn send_rsp<Rsp, E>(&mut self, mut meta: MsgMeta, rsp: std::result::Result<Rsp, E>)
    where
        Rsp: Serialize,
        E: std::error::Error + From<Error> + Serialize,
    {
        meta.flags.remove(MsgFlags::IsReq);
        meta.flags.insert(MsgFlags::IsRsp);
        match &self.endpoint {
            SocketEndpoint::Connected(socket) => {
                if let Err(e) = socket.send(&mut meta, &rsp, &self.state.waiter).await {
                    tracing::warn!("send rsp for {} failed: {e}", meta.method);
                }
            }
            _ => {
                tracing::error!("invalid argument: send rsp without connected socket");
            }
        }
    }

    pub async fn send_err_rsp(&mut self, meta: MsgMeta, err: Error) {
        self.send_rsp::<(), Error>(meta, Err(err)).await;
    }
}
