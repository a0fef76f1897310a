use std::sync::Arc;

use tokio_util::sync::DropGuard;

use crate::{
    Context, Error, ErrorKind, Message, Router, TaskSupervisor, Waiter, tcp::TcpSocket,
    tcp::TcpSocketPool,
};

/// Everything a connection needs to route traffic: the dispatch table,
/// pending client requests, the connections themselves and the in-flight
/// server calls.
#[derive(Debug)]
pub struct State {
    pub router: Router,
    pub(crate) waiter: Waiter,
    pub(crate) socket_pool: Arc<TcpSocketPool>,
    pub(crate) calls: TaskSupervisor,
}

impl State {
    #[must_use]
    pub fn create(router: Router) -> Arc<Self> {
        Arc::new(Self {
            router,
            waiter: Waiter::default(),
            socket_pool: TcpSocketPool::new(),
            calls: TaskSupervisor::create(),
        })
    }

    /// Routes one decoded frame: requests to the router, responses to the
    /// request waiting for them.
    pub fn handle_recv(self: &Arc<Self>, socket: &TcpSocket, msg: Message) {
        if !msg.meta.is_req() {
            self.waiter.post(msg.meta.msgid, msg);
            return;
        }

        let mut ctx = Context::server_ctx(self, socket.clone());
        if self.calls.is_stopping() {
            tokio::spawn(async move {
                let err = Error::new(ErrorKind::InvalidState, "server is shutting down".into());
                ctx.send_err_rsp(msg.meta, err).await;
            });
            return;
        }

        let call = self.calls.start_async_task();
        let fut = self.router.dispatch(ctx, msg);
        tokio::spawn(async move {
            fut.await;
            drop(call);
        });
    }

    pub(crate) fn drop_guard(&self) -> DropGuard {
        self.socket_pool.drop_guard()
    }
}
