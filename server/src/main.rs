//! Blackjack server entry point.

use std::sync::Arc;

use clap::Parser;
use log::info;

use server::config::Config;
use server::network::Server;
use server::persist::MemoryStore;
use server::table::Table;

/// Command-line arguments for server configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let table = Arc::new(Table::new(Config::default(), Arc::new(MemoryStore::new())));
    let server = Server::bind(&addr, table).await?;
    info!("Blackjack table open on {}", addr);
    server.run().await?;
    Ok(())
}
