use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio_util::sync::DropGuard;

use crate::{Listener, Result, Router, State, services::MetaService};

/// RPC server: a [`Router`] behind a TCP listener.
///
/// Every server also answers the built-in [`MetaService`].
///
/// ```rust,no_run
/// # use power::{Context, Router, Server};
/// # use serde::{Deserialize, Serialize};
/// # use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
/// # #[derive(Serialize, Deserialize)]
/// # struct Request(String);
/// #[power::service]
/// trait EchoService {
///     async fn echo(&self, ctx: &Context, req: &Request) -> power::Result<String>;
/// }
///
/// struct Echo;
///
/// impl EchoService for Echo {
///     async fn echo(&self, _ctx: &Context, req: &Request) -> power::Result<String> {
///         Ok(req.0.clone())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut router = Router::default();
/// EchoService::power_export(Arc::new(Echo), &mut router);
///
/// let server = Server::create(router);
/// let addr = SocketAddr::from_str("127.0.0.1:8000").unwrap();
/// server.listen(addr).await.unwrap();
/// server.shutdown(Duration::from_secs(5)).await;
/// # }
/// ```
pub struct Server {
    state: Arc<State>,
    listener: Listener,
    _drop_guard: DropGuard,
}

impl Server {
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn create(mut router: Router) -> Self {
        MetaService::power_export(Arc::new(()), &mut router);
        let state = State::create(router);
        let drop_guard = state.drop_guard();

        Self {
            state,
            listener: Listener::default(),
            _drop_guard: drop_guard,
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.state.router
    }

    /// Binds `addr` and starts accepting connections. Returns the bound
    /// address, which differs from `addr` when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns `TcpBindFailed` if the address cannot be bound.
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        self.listener.start_listen(addr, &self.state).await
    }

    /// Closes the listener and every connection right away.
    pub fn stop(&self) {
        self.listener.stop();
        self.state.calls.stop();
        self.state.socket_pool.stop();
    }

    /// Refuses new connections and calls, lets running calls finish for up
    /// to `grace`, then closes every connection and waits for the teardown.
    pub async fn shutdown(&self, grace: Duration) {
        self.listener.stop();
        self.state.calls.stop();
        if tokio::time::timeout(grace, self.state.calls.all_stopped())
            .await
            .is_err()
        {
            tracing::warn!("calls still running after {grace:?}, closing connections");
        }
        self.state.socket_pool.stop();
        self.join().await;
    }

    /// Waits until the listener and every connection are gone.
    pub async fn join(&self) {
        self.listener.join().await;
        self.state.socket_pool.join().await;
    }
}
