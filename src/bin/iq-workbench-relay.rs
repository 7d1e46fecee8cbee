use std::path::PathBuf;

use clap::Parser;
use iq_workbench::config::{Config, DEFAULT_ENV_FILE};
use iq_workbench::error::Result;
use iq_workbench::relay::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "iq-workbench-relay")]
#[command(about = "Streams chat turns from a Letta agent over POST /chat")]
struct Cli {
    #[arg(long, env = "WORKBENCH_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "WORKBENCH_PORT", default_value_t = 3000)]
    port: u16,

    #[arg(long, env = "WORKBENCH_ENV_FILE", default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    iq_workbench::logging::init_tracing("iq_workbench_relay");
    let cli = Cli::parse();
    let config = Config::load(Some(&cli.env_file))?;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    };
    relay::run_with_shutdown(&cli.host, cli.port, AppState::from_config(&config), shutdown).await
}
