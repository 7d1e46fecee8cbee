use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use iq_workbench::config::{Config, API_KEY_VAR, DEFAULT_ENV_FILE};
use iq_workbench::providers::letta::LettaClient;
use iq_workbench::provisioning;

#[derive(Parser, Debug)]
#[command(name = "iq-workbench-setup")]
#[command(about = "Creates the Letta agent and records its id in the env file")]
struct Cli {
    #[arg(long, env = "WORKBENCH_ENV_FILE", default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    iq_workbench::logging::init_tracing("iq_workbench_setup");
    let cli = Cli::parse();

    let config = match Config::load(Some(&cli.env_file)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Setup failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    let Some(api_key) = config.api_key().map(str::to_string) else {
        eprintln!("{API_KEY_VAR} is required.");
        eprintln!("  1. Create an account at https://app.letta.com");
        eprintln!("  2. Create an API key at https://app.letta.com/api-keys");
        eprintln!(
            "  3. Export {API_KEY_VAR} or add it to {}",
            cli.env_file.display()
        );
        return ExitCode::FAILURE;
    };

    let client = LettaClient::new(&api_key, Some(config.base_url().to_string()));
    match provisioning::provision(&client, &cli.env_file, &api_key).await {
        Ok(report) => {
            println!("Agent created: {}", report.agent);
            println!("Saved LETTA_AGENT_ID to {}", report.env_path.display());
            match report.greeting {
                Some(greeting) => println!("Agent says: {greeting}"),
                None => println!("Agent answered without an assistant message"),
            }
            println!("Setup complete. Start the relay with: iq-workbench-relay");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Setup failed: {err}");
            ExitCode::FAILURE
        }
    }
}
