use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use power::{Power, PowerConfig, cancel_on_signal, default_classpath};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listen port.
    #[arg(default_value_t = 9000)]
    pub port: u16,

    /// Namespace holding the services.
    #[arg(long, default_value = power_demo::NAMESPACE)]
    pub namespace: String,

    /// Classpath entry, a directory or a zip archive. Repeatable. Defaults
    /// to $POWER_CLASSPATH, then the working directory.
    #[arg(long = "classpath", short = 'c')]
    pub classpath: Vec<PathBuf>,

    /// Only scan the namespace itself, not its sub-namespaces.
    #[arg(long, default_value_t = false)]
    pub flat: bool,

    /// Grace period for running calls on shutdown, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub grace_ms: u64,
}

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> power::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let classpath = if args.classpath.is_empty() {
        default_classpath()
    } else {
        args.classpath
    };
    let config = PowerConfig {
        recursive: !args.flat,
        shutdown_grace: Duration::from_millis(args.grace_ms),
        ..PowerConfig::new(args.port, args.namespace)
    }
    .with_classpath(classpath);

    let power = Arc::new(Power::create(config)?);
    tracing::info!(
        "Serving {:?} with methods {:?}",
        power.services(),
        power.method_names()
    );

    let shutdown = CancellationToken::new();
    power.start(shutdown.clone()).await?;
    cancel_on_signal(shutdown);

    power.block_until_shutdown().await;
    Ok(())
}
