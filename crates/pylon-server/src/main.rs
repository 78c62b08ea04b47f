//! Pylon bouncer binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default datastore path
//! pylon-server --bind 0.0.0.0:6667
//!
//! # Set the access password, then start
//! pylon-server --set-password hunter2 --datastore pylon.redb
//! ```

use clap::Parser;
use pylon_server::{Bouncer, BouncerConfig, Datastore, RedbDatastore};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pylon IRC bouncer
#[derive(Parser, Debug)]
#[command(name = "pylon-server")]
#[command(about = "Pylon IRC bouncer")]
#[command(version)]
struct Args {
    /// Address to listen on for IRC clients
    #[arg(short, long, default_value = "0.0.0.0:6667")]
    bind: String,

    /// Path to the datastore file
    #[arg(short, long, default_value = "pylon.redb")]
    datastore: String,

    /// Set the access password before starting
    #[arg(long)]
    set_password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Pylon bouncer starting");

    let datastore = RedbDatastore::open(&args.datastore)?;

    if let Some(password) = args.set_password {
        datastore.set_password(&password)?;
        tracing::info!("access password updated");
    }

    let config = BouncerConfig { bind_address: args.bind };
    let bouncer = Bouncer::bind(config, datastore).await?;

    tracing::info!("listening for clients on {}", bouncer.local_addr()?);

    bouncer.run().await?;

    Ok(())
}
