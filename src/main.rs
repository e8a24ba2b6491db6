//! hubdeck - binary entry point. All logic lives in the library.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use hubdeck_app::{EngineOptions, HostContext};

/// Discover and control embedded hub devices over WebSocket and MQTT
#[derive(Parser, Debug)]
#[command(name = "hubdeck", version)]
#[command(about = "Discover and control embedded hub devices", long_about = None)]
struct Args {
    /// Directory holding the persisted config, device list and settings.toml
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Behave as a client served over TLS (plain WebSocket discovery is skipped)
    #[arg(long)]
    secure_origin: bool,

    /// Address of the hub serving this client on an embedded deployment
    #[arg(long, value_name = "IP")]
    embedded_host: Option<Ipv4Addr>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    hubdeck_core::logging::init()?;

    let options = EngineOptions {
        data_dir: args.data_dir,
        host: HostContext {
            secure_origin: args.secure_origin,
            embedded_host: args.embedded_host,
        },
    };

    hubdeck::run_headless(options).await?;
    Ok(())
}
