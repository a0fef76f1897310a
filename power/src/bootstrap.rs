use std::{
    collections::BTreeSet,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, OnceLock},
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    BindableService, Error, ErrorKind, Instance, PowerConfig, Result, Router, Scanner, Server,
    TypeReference, TypeRegistry,
};

/// Lifecycle of a [`Power`] bootstrap.
///
/// `Created → Built → Running → Stopped`, with `Starting` while the port
/// is being bound and `Stopping` while connections drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Built,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Discovers the services under a namespace, serves them on a port, and
/// owns the server's start/stop lifecycle.
///
/// ```rust,no_run
/// # use power::{Power, PowerConfig};
/// # use std::sync::Arc;
/// # use tokio_util::sync::CancellationToken;
/// # #[tokio::main]
/// # async fn main() -> power::Result<()> {
/// let power = Arc::new(Power::create(PowerConfig::new(9000, "server"))?);
/// let shutdown = CancellationToken::new();
/// power.start(shutdown.clone()).await?;
/// power.block_until_shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Power {
    config: PowerConfig,
    server: Server,
    services: BTreeSet<TypeReference>,
    lifecycle: watch::Sender<Lifecycle>,
    local_addr: OnceLock<SocketAddr>,
}

impl Power {
    /// Builds the server from every type registered in this binary.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` is invalid and `InvalidState`
    /// outside a tokio runtime. Types that cannot be resolved or
    /// constructed are logged and skipped.
    pub fn create(config: PowerConfig) -> Result<Self> {
        Self::with_registry(config, &TypeRegistry::collect())
    }

    /// Like [`create`](Self::create), resolving discovered names in `registry`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` is invalid and `InvalidState`
    /// outside a tokio runtime.
    pub fn with_registry(config: PowerConfig, registry: &TypeRegistry) -> Result<Self> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "must be created inside a tokio runtime".to_string(),
            ));
        }
        let lifecycle = watch::Sender::new(Lifecycle::Created);

        let names = Scanner::new(&config.classpath)
            .recursive(config.recursive)
            .suffix(&config.suffix)
            .scan(&config.namespace);
        tracing::debug!("found {} types under {}", names.len(), config.namespace);

        let mut router = Router::default();
        let mut services = BTreeSet::new();
        for name in names {
            match Self::admit(registry, &name) {
                Ok(Some(service)) => {
                    service.bind(&mut router);
                    tracing::info!("registered service {name}");
                    services.insert(name);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("skip {name}: {e}"),
            }
        }
        if services.is_empty() {
            tracing::warn!("no services found under {}", config.namespace);
        }

        let server = Server::create(router);
        lifecycle.send_replace(Lifecycle::Built);
        Ok(Self {
            config,
            server,
            services,
            lifecycle,
            local_addr: OnceLock::new(),
        })
    }

    /// The service to register for `name`, if it carries the marker and is
    /// bindable.
    fn admit(registry: &TypeRegistry, name: &TypeReference) -> Result<Option<Arc<dyn BindableService>>> {
        let registration = registry.resolve(name)?;
        if !registration.marked {
            tracing::debug!("skip {name}: no discovery marker");
            return Ok(None);
        }
        match registration.instantiate()? {
            Instance::Service(service) => Ok(Some(service)),
            Instance::Plain(_) => {
                tracing::debug!("skip {name}: not a bindable service");
                Ok(None)
            }
        }
    }

    /// Binds the configured port and starts serving.
    ///
    /// Cancelling `shutdown` later runs [`stop`](Self::stop); it is the only
    /// shutdown hook this bootstrap installs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the bootstrap is `Built`, and
    /// `TcpBindFailed` if the port cannot be bound, in which case the
    /// bootstrap stays `Built`.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Result<SocketAddr> {
        self.transition(&[Lifecycle::Built], Lifecycle::Starting)
            .map_err(|state| {
                Error::new(ErrorKind::InvalidState, format!("cannot start when {state:?}"))
            })?;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
        let local_addr = match self.server.listen(addr).await {
            Ok(local_addr) => local_addr,
            Err(e) => {
                self.lifecycle.send_replace(Lifecycle::Built);
                return Err(e);
            }
        };
        let _ = self.local_addr.set(local_addr);
        self.lifecycle.send_replace(Lifecycle::Running);
        tracing::info!("Server started, listening on {}", local_addr.port());

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("shutting down server since the process is shutting down");
                    this.stop().await;
                    tracing::info!("server shut down");
                }
                () = this.block_until_shutdown() => {}
            }
        });

        Ok(local_addr)
    }

    /// Stops serving: refuses new connections, gives running calls up to
    /// `shutdown_grace` to finish, then closes everything.
    ///
    /// Safe to call any number of times from any task. Only the first call
    /// tears the server down; the others wait until it is done.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.subscribe();
        let from = loop {
            match self.transition(&[Lifecycle::Built, Lifecycle::Running], Lifecycle::Stopping) {
                Ok(from) => break from,
                Err(Lifecycle::Created | Lifecycle::Starting) => {
                    let _ = lifecycle
                        .wait_for(|state| !matches!(state, Lifecycle::Created | Lifecycle::Starting))
                        .await;
                }
                Err(_) => {
                    let _ = lifecycle.wait_for(|state| *state == Lifecycle::Stopped).await;
                    return;
                }
            }
        };

        tracing::info!("stopping server on port {}", self.config.port);
        if from == Lifecycle::Running {
            self.server.shutdown(self.config.shutdown_grace).await;
        } else {
            self.server.stop();
            self.server.join().await;
        }
        self.lifecycle.send_replace(Lifecycle::Stopped);
        tracing::info!("server on port {} stopped", self.config.port);
    }

    /// Waits until the server is `Stopped`, whoever stops it.
    pub async fn block_until_shutdown(&self) {
        let mut lifecycle = self.lifecycle.subscribe();
        let _ = lifecycle.wait_for(|state| *state == Lifecycle::Stopped).await;
    }

    #[must_use]
    pub fn state(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    #[must_use]
    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The bound address once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Names of the registered services.
    #[must_use]
    pub fn services(&self) -> &BTreeSet<TypeReference> {
        &self.services
    }

    /// Every method in the dispatch table, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.server.router().method_names().cloned().collect();
        names.sort();
        names
    }

    /// Moves `from` → `to` atomically. Returns the previous state, or the
    /// current one if it is not in `from`.
    fn transition(&self, from: &[Lifecycle], to: Lifecycle) -> std::result::Result<Lifecycle, Lifecycle> {
        let mut result = Err(to);
        self.lifecycle.send_if_modified(|state| {
            if from.contains(state) {
                result = Ok(*state);
                *state = to;
                true
            } else {
                result = Err(*state);
                false
            }
        });
        result
    }
}

impl std::fmt::Debug for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Power")
            .field("port", &self.config.port)
            .field("namespace", &self.config.namespace)
            .field("state", &self.state())
            .field("services", &self.services)
            .finish()
    }
}
