//! Chat relay client.
//!
//! Connects to the relay server, announces a username and sends messages
//! read from stdin. Messages from other clients are printed between prompts.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin irori-client -- --username alice
//! cargo run --bin irori-client -- -H 127.0.0.1 -p 1234
//! ```

use clap::Parser;

use irori_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "irori-client")]
#[command(about = "TCP chat relay client", long_about = None)]
struct Args {
    /// Username announced to the server (prompted for when omitted)
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Server host address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "1234")]
    port: u16,
}

fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = irori_client::run_client(&args.host, args.port, args.username) {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
