use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;

use crate::{Error, ErrorKind, Result, State, TaskSupervisor};

/// Accept loop. Stopping it refuses new connections but leaves accepted
/// ones alone.
pub struct Listener {
    task_supervisor: TaskSupervisor,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener {
    #[must_use]
    pub fn new() -> Self {
        Self {
            task_supervisor: TaskSupervisor::create(),
        }
    }

    /// Binds `addr` and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// Returns `TcpBindFailed` if the address cannot be bound.
    pub async fn start_listen(&self, addr: SocketAddr, state: &Arc<State>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::new(ErrorKind::TcpBindFailed, format!("{addr}: {e}")))?;
        let listener_addr = listener
            .local_addr()
            .map_err(|e| Error::new(ErrorKind::TcpBindFailed, e.to_string()))?;
        let state = state.clone();

        let task = self.task_supervisor.start_async_task();
        tokio::spawn(async move {
            tokio::select! {
                () = task.stopped() => {
                    tracing::info!("stop accepting on {listener_addr}");
                }
                () = Self::accept_loop(listener, state) => {}
            }
        });

        Ok(listener_addr)
    }

    async fn accept_loop(listener: TcpListener, state: Arc<State>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("accepted connection from {peer}");
                    state.socket_pool.add_socket(peer, stream, &state);
                }
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.task_supervisor.stop();
    }

    pub async fn join(&self) {
        self.task_supervisor.all_stopped().await;
    }
}
