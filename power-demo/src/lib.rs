use power::{Context, Result};
use serde::{Deserialize, Serialize};

/// Namespace the demo services are listed under.
pub const NAMESPACE: &str = "server";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HelloResponse {
    pub greeting: String,
}

#[power::service]
pub trait HelloService {
    async fn hello(&self, ctx: &Context, req: &HelloRequest) -> Result<HelloResponse>;
}

pub mod server {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use power::{BindableService, Context, Result, Router};

    use crate::{HelloRequest, HelloResponse, HelloService};

    /// Greets whoever calls it. Found under the `server` namespace.
    #[power::grpc_server]
    #[derive(Default)]
    pub struct HelloServer {
        served: AtomicU64,
    }

    impl HelloServer {
        #[must_use]
        pub fn served(&self) -> u64 {
            self.served.load(Ordering::Acquire)
        }
    }

    impl HelloService for HelloServer {
        async fn hello(&self, _ctx: &Context, req: &HelloRequest) -> Result<HelloResponse> {
            self.served.fetch_add(1, Ordering::AcqRel);
            Ok(HelloResponse {
                greeting: format!("Hello {}", req.name),
            })
        }
    }

    impl BindableService for HelloServer {
        fn bind(self: Arc<Self>, router: &mut Router) {
            HelloService::power_export(self, router);
        }
    }
}
