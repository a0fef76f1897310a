use std::{
    fs::{self, File},
    net::SocketAddr,
    path::Path,
    sync::Arc,
    time::Duration,
};

use power::{Client, Context, ErrorKind, Lifecycle, Power, PowerConfig, services::MetaService};
use tokio_util::sync::CancellationToken;

#[power::service]
trait GreetService {
    async fn greet(&self, ctx: &Context, req: &String) -> power::Result<String>;
    async fn nap(&self, ctx: &Context, req: &u64) -> power::Result<u64>;
}

#[power::service]
trait EchoService {
    async fn echo(&self, ctx: &Context, req: &String) -> power::Result<String>;
}

#[power::service]
trait AdminService {
    async fn ping(&self, ctx: &Context, req: &()) -> power::Result<()>;
}

mod server {
    use std::{sync::Arc, time::Duration};

    use power::{BindableService, Context, Result, Router};

    use super::{AdminService, EchoService, GreetService};

    #[power::grpc_server]
    #[derive(Default)]
    pub struct Greeter;

    impl GreetService for Greeter {
        async fn greet(&self, _: &Context, req: &String) -> Result<String> {
            Ok(format!("Hello {req}"))
        }

        async fn nap(&self, _: &Context, req: &u64) -> Result<u64> {
            tokio::time::sleep(Duration::from_millis(*req)).await;
            Ok(*req)
        }
    }

    impl BindableService for Greeter {
        fn bind(self: Arc<Self>, router: &mut Router) {
            GreetService::power_export(self, router);
        }
    }

    /// Known by name, but never served.
    #[power::loadable]
    #[derive(Default)]
    pub struct Unmarked;

    impl EchoService for Unmarked {
        async fn echo(&self, _: &Context, req: &String) -> Result<String> {
            Ok(req.clone())
        }
    }

    impl BindableService for Unmarked {
        fn bind(self: Arc<Self>, router: &mut Router) {
            EchoService::power_export(self, router);
        }
    }

    /// Speaks `EchoService`, but cannot bind it.
    #[power::grpc_server]
    #[derive(Default)]
    pub struct NotAService;

    impl EchoService for NotAService {
        async fn echo(&self, _: &Context, req: &String) -> Result<String> {
            Ok(req.clone())
        }
    }

    #[power::grpc_server]
    pub struct Exploding;

    impl Default for Exploding {
        fn default() -> Self {
            panic!("missing database");
        }
    }

    impl EchoService for Exploding {
        async fn echo(&self, _: &Context, req: &String) -> Result<String> {
            Ok(req.clone())
        }
    }

    impl BindableService for Exploding {
        fn bind(self: Arc<Self>, router: &mut Router) {
            EchoService::power_export(self, router);
        }
    }

    pub mod admin {
        use std::sync::Arc;

        use power::{BindableService, Context, Result, Router};

        use crate::AdminService;

        #[power::grpc_server]
        #[derive(Default)]
        pub struct Admin;

        impl AdminService for Admin {
            async fn ping(&self, _: &Context, (): &()) -> Result<()> {
                Ok(())
            }
        }

        impl BindableService for Admin {
            fn bind(self: Arc<Self>, router: &mut Router) {
                AdminService::power_export(self, router);
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn classpath(root: &Path, files: &[&str]) {
    for file in files {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(root: &Path) -> PowerConfig {
    PowerConfig {
        shutdown_grace: Duration::from_secs(2),
        ..PowerConfig::new(free_port(), "server").with_classpath([root])
    }
}

fn client_ctx(power: &Power) -> Context {
    Context::create().with_addr(SocketAddr::from(([127, 0, 0, 1], power.port())))
}

#[tokio::test]
async fn test_discovery_filters() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    classpath(
        dir.path(),
        &[
            "server/Greeter.svc",
            "server/Unmarked.svc",
            "server/NotAService.svc",
            "server/Exploding.svc",
            "server/Ghost.svc",
            "server/admin/Admin.svc",
            "client/Caller.svc",
        ],
    );

    let power = Power::create(config(dir.path())).unwrap();
    assert_eq!(power.state(), Lifecycle::Built);
    let services: Vec<&str> = power.services().iter().map(|s| s.name()).collect();
    assert_eq!(services, ["server.Greeter", "server.admin.Admin"]);
    assert_eq!(
        power.method_names(),
        [
            "AdminService/ping",
            "GreetService/greet",
            "GreetService/nap",
            "MetaService/list_methods",
            "MetaService/list_services",
        ]
    );

    let power = Arc::new(power);
    power.start(CancellationToken::new()).await.unwrap();
    let ctx = client_ctx(&power);
    let client = Client::default();
    let methods = client.list_methods(&ctx, &()).await.unwrap();
    assert!(!methods.contains(&"EchoService/echo".to_string()));
    let err = client.echo(&ctx, &"hi".to_string()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    power.stop().await;
    assert_eq!(power.state(), Lifecycle::Stopped);
}

#[test]
fn test_create_outside_runtime() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let err = Power::create(config(dir.path())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_flat_namespace() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc", "server/admin/Admin.svc"]);

    let config = PowerConfig {
        recursive: false,
        ..config(dir.path())
    };
    let power = Power::create(config).unwrap();
    let services: Vec<&str> = power.services().iter().map(|s| s.name()).collect();
    assert_eq!(services, ["server.Greeter"]);
}

#[tokio::test]
async fn test_registered_once_across_roots() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    classpath(first.path(), &["server/Greeter.svc"]);
    classpath(second.path(), &["server/Greeter.svc"]);

    let config = config(first.path()).with_classpath([first.path(), second.path(), first.path()]);
    let power = Power::create(config).unwrap();
    assert_eq!(power.services().len(), 1);
    assert_eq!(
        power
            .method_names()
            .iter()
            .filter(|m| m.starts_with("GreetService/"))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_empty_namespace_still_serves() {
    let dir = tempfile::tempdir().unwrap();
    let config = PowerConfig {
        namespace: "nothing.here".to_string(),
        ..config(dir.path())
    };
    let power = Arc::new(Power::create(config).unwrap());
    assert!(power.services().is_empty());

    power.start(CancellationToken::new()).await.unwrap();
    assert_eq!(power.state(), Lifecycle::Running);
    power.stop().await;
}

#[tokio::test]
async fn test_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = PowerConfig {
        port: 0,
        ..config(dir.path())
    };
    let err = Power::create(config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_serve_and_stop() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let power = Arc::new(Power::create(config(dir.path())).unwrap());
    let addr = power.start(CancellationToken::new()).await.unwrap();
    assert_eq!(addr.port(), power.port());
    assert_eq!(power.local_addr(), Some(addr));
    assert_eq!(power.state(), Lifecycle::Running);

    let ctx = client_ctx(&power);
    let client = Client::default();
    let rsp = client.greet(&ctx, &"World".to_string()).await.unwrap();
    assert_eq!(rsp, "Hello World");

    power.stop().await;
    assert_eq!(power.state(), Lifecycle::Stopped);

    let fresh = client_ctx(&power);
    client
        .greet(&fresh, &"again".to_string())
        .await
        .unwrap_err();
}

#[tokio::test]
async fn test_start_twice() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let power = Arc::new(Power::create(config(dir.path())).unwrap());
    power.start(CancellationToken::new()).await.unwrap();
    let err = power.start(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert_eq!(power.state(), Lifecycle::Running);

    power.stop().await;
    let err = power.start(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_bind_failure() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let occupied = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let config = PowerConfig {
        port: occupied.local_addr().unwrap().port(),
        ..config(dir.path())
    };
    let power = Arc::new(Power::create(config).unwrap());

    let err = power.start(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TcpBindFailed);
    assert_eq!(power.state(), Lifecycle::Built);
    assert_eq!(power.local_addr(), None);

    drop(occupied);
    power.start(CancellationToken::new()).await.unwrap();
    power.stop().await;
}

#[tokio::test]
async fn test_concurrent_stop() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let power = Arc::new(Power::create(config(dir.path())).unwrap());
    let shutdown = CancellationToken::new();
    power.start(shutdown.clone()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(power.stop(), power.stop(), async {
            shutdown.cancel();
            power.block_until_shutdown().await;
        });
    })
    .await
    .unwrap();
    assert_eq!(power.state(), Lifecycle::Stopped);

    power.stop().await;
    assert_eq!(power.state(), Lifecycle::Stopped);
}

#[tokio::test]
async fn test_block_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let power = Arc::new(Power::create(config(dir.path())).unwrap());
    let shutdown = CancellationToken::new();
    power.start(shutdown.clone()).await.unwrap();

    let blocked = tokio::spawn({
        let power = power.clone();
        async move {
            power.block_until_shutdown().await;
            power.state()
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    shutdown.cancel();
    let state = tokio::time::timeout(Duration::from_secs(5), blocked)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, Lifecycle::Stopped);
}

#[tokio::test]
async fn test_running_calls_finish_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    classpath(dir.path(), &["server/Greeter.svc"]);

    let power = Arc::new(Power::create(config(dir.path())).unwrap());
    power.start(CancellationToken::new()).await.unwrap();

    let ctx = client_ctx(&power);
    let call = tokio::spawn({
        let ctx = ctx.clone();
        async move { Client::default().nap(&ctx, &300).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    power.stop().await;
    assert_eq!(call.await.unwrap(), Ok(300));
}
