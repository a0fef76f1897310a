use clap::Parser;
use power::{Client, Context, services::MetaService};
use power_demo::{HelloRequest, HelloService};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server address.
    #[arg(default_value = "127.0.0.1:9000")]
    pub addr: std::net::SocketAddr,

    /// Who to greet.
    #[arg(long, default_value = "World")]
    pub name: String,

    /// List the server's services instead of calling `hello`.
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Use `MessagePack`
    #[arg(long, default_value_t = false)]
    pub use_msgpack: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();
    let ctx = Context::create().with_addr(args.addr);
    let client = Client {
        use_msgpack: args.use_msgpack,
        ..Default::default()
    };

    if args.list {
        match client.list_methods(&ctx, &()).await {
            Ok(methods) => methods.iter().for_each(|m| println!("{m}")),
            Err(err) => eprintln!("request failed: {err}"),
        }
        return;
    }

    match client.hello(&ctx, &HelloRequest { name: args.name }).await {
        Ok(rsp) => println!("{}", rsp.greeting),
        Err(err) => eprintln!("request failed: {err}"),
    }
}
