//! Reference bot client entry point.

use clap::Parser;
use log::info;

/// Command-line arguments for client configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address in format "host:port"
    #[arg(short = 's', long, default_value = "127.0.0.1:9876")]
    server: String,

    /// Display name to register under
    #[arg(short, long, default_value = "BasicBot")]
    name: String,

    /// Token from an earlier session to log back in with
    #[arg(short, long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client =
        client::network::Client::connect(&args.server, &args.name, args.token).await?;
    client.run().await
}
