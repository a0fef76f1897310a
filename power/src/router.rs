use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    pin::Pin,
    sync::Arc,
};

use foldhash::fast::RandomState;

use crate::{Context, Message, error::{Error, ErrorKind}};

pub type CallFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handler for one RPC method: decodes the request, runs it and replies.
pub type Method = Box<dyn Fn(Context, Message) -> CallFuture + Send + Sync>;

/// A value that can attach its RPC methods to a [`Router`].
///
/// Implement it by exporting each `#[service]` trait the type provides:
///
/// ```rust,ignore
/// impl BindableService for HelloServer {
///     fn bind(self: Arc<Self>, router: &mut Router) {
///         HelloService::power_export(self, router);
///     }
/// }
/// ```
pub trait BindableService: Send + Sync + 'static {
    fn bind(self: Arc<Self>, router: &mut Router);
}

/// The dispatch table, keyed by `"<Service>/<method>"`.
#[derive(Default)]
pub struct Router {
    methods: HashMap<String, Method, RandomState>,
}

impl Router {
    /// Binds `method` under `name`. The first binding of a name wins.
    pub fn add_method(&mut self, name: &str, method: Method) -> bool {
        if self.methods.contains_key(name) {
            tracing::warn!("method {name} is already bound, keeping the first binding");
            return false;
        }
        self.methods.insert(name.to_string(), method);
        true
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &String> {
        self.methods.keys()
    }

    /// Services with at least one bound method.
    #[must_use]
    pub fn service_names(&self) -> BTreeSet<&str> {
        self.methods
            .keys()
            .filter_map(|name| name.split_once('/').map(|(service, _)| service))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub(crate) fn dispatch(&self, mut ctx: Context, msg: Message) -> CallFuture {
        if let Some(method) = self.methods.get(&msg.meta.method) {
            method(ctx, msg)
        } else {
            Box::pin(async move {
                let m = format!("method not found: {}", msg.meta.method);
                tracing::error!("{m}");
                ctx.send_err_rsp(msg.meta, Error::new(ErrorKind::InvalidArgument, m))
                    .await;
            })
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.methods.keys())
            .finish()
    }
}
