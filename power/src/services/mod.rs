//! Services bound on every [`Server`](crate::Server).

mod meta_service;
pub use meta_service::MetaService;
