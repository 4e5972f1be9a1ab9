mod body;
mod collision;
mod fall;
mod movement;
mod network;

use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name to join with
    #[arg(short = 'n', long, default_value = "")]
    name: String,

    /// Room to join or create
    #[arg(short = 'r', long, default_value = "default")]
    room: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting headless client...");
    info!("Connecting to: {}", args.server);

    let mut client = network::Client::new(&args.server, &args.name, &args.room).await?;

    client.run().await?;

    Ok(())
}
