use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use power::{Client, Context, Lifecycle, Power, PowerConfig, services::MetaService};
use power_demo::{HelloRequest, HelloService};
use tokio_util::sync::CancellationToken;

fn sample_classpath() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("classpath")
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_hello_world() {
    let config = PowerConfig::new(free_port(), "server").with_classpath([sample_classpath()]);
    let power = Arc::new(Power::create(config).unwrap());
    let services: Vec<&str> = power.services().iter().map(|s| s.name()).collect();
    assert_eq!(services, ["server.HelloServer"]);

    let shutdown = CancellationToken::new();
    power.start(shutdown.clone()).await.unwrap();

    let ctx = Context::create().with_addr(SocketAddr::from(([127, 0, 0, 1], power.port())));
    let client = Client::default();
    let rsp = client
        .hello(&ctx, &HelloRequest {
            name: "World".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(rsp.greeting, "Hello World");

    let methods = client.list_methods(&ctx, &()).await.unwrap();
    assert!(methods.contains(&"HelloService/hello".to_string()));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), power.block_until_shutdown())
        .await
        .unwrap();
    assert_eq!(power.state(), Lifecycle::Stopped);
}

#[tokio::test]
async fn test_classpath_without_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let config = PowerConfig::new(free_port(), "server").with_classpath([dir.path()]);
    let power = Power::create(config).unwrap();
    assert!(power.services().is_empty());
    assert!(!power.method_names().contains(&"HelloService/hello".to_string()));
}
