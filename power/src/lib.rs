//! # power
//!
//! Bootstrap for an RPC server that finds its own services.
//!
//! Service types opt in with [`grpc_server`], and are listed as artifact
//! files (`HelloServer.svc`) under a namespace directory on the classpath,
//! either loose on disk or inside a zip archive. [`Power`] scans the
//! namespace, resolves every name in the link-time [`TypeRegistry`],
//! instantiates the marked [`BindableService`]s and serves them.

#![forbid(unsafe_code)]

extern crate self as power;

pub use power_macro::{grpc_server, loadable, service};

mod error;
pub use error::{Error, ErrorKind, Result};

mod payload;
pub use payload::Payload;

mod msg;
pub use msg::{Message, MsgFlags, MsgMeta, SendMsg};

mod router;
pub use router::{BindableService, CallFuture, Method, Router};

mod waiter;
pub use waiter::{Receiver, Waiter};

mod task_supervisor;
pub use task_supervisor::{TaskSupervisor, TaskSupervisorGuard};

pub mod tcp;

mod state;
pub use state::State;

pub mod services;

mod context;
pub use context::{Context, SocketEndpoint};

mod listener;
pub use listener::Listener;

mod client;
pub use client::Client;

mod server;
pub use server::Server;

pub mod scanner;
pub use scanner::{Scanner, TypeReference};

pub mod registry;
pub use registry::{Instance, TypeRegistration, TypeRegistry};

mod config;
pub use config::{CLASSPATH_ENV, PowerConfig, default_classpath};

mod bootstrap;
pub use bootstrap::{Lifecycle, Power};

mod signal;
pub use signal::{cancel_on_signal, shutdown_signal};

#[doc(hidden)]
pub mod __private {
    pub use inventory;

    pub use crate::registry::{Probe, ProbePlain, ProbeService};
}
