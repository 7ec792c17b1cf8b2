use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use netprobe::logging;
use netprobe::service::{signals, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "netprobe", version)]
#[command(about = "Network probe agent publishing DNS and ping health to Home Assistant over MQTT")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(default_value = "probe.yaml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log = logging::init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start runtime")?;

    runtime.block_on(async move {
        info!(version = netprobe::VERSION, config = %args.config.display(), "starting");
        let signals = signals::listen().context("cannot install signal handlers")?;
        Supervisor::builder()
            .config_path(args.config)
            .log_handle(log)
            .build()
            .run(signals)
            .await?;
        Ok(())
    })
}
