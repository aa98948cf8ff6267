//! cmek-it: runs the CMEK verification scenarios.
//!
//! # Usage
//!
//! ```text
//! cmek-it init --project-id my-project --kms-key-name projects/.../cryptoKeys/k > cmek.toml
//! cmek-it run --config cmek.toml --scenario table --wait-for-key-status
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "cmek-it",
    about = "CMEK verification harness",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run scenarios against the sandbox control plane.
    Run {
        /// Harness configuration (TOML). Without it a sandbox scaffold is used.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Scenario to run: all, instance-cluster, table or backup.
        #[arg(short, long, default_value = "all")]
        scenario: String,

        /// Wait for the table key status to converge before checking it.
        #[arg(long)]
        wait_for_key_status: bool,

        /// Encryption-info reads before the sandbox reports a key version.
        #[arg(long, default_value = "0")]
        convergence_reads: u32,

        /// Transient UNAVAILABLE failures per table in the sandbox.
        #[arg(long, default_value = "0")]
        transient_failures: u32,

        /// Record backoff sleeps instead of waiting them out.
        #[arg(long)]
        skip_sleep: bool,

        /// Print reports and logs as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print a scaffolded configuration.
    Init {
        #[arg(long, default_value = commands::run::SANDBOX_PROJECT)]
        project_id: String,

        #[arg(long, default_value = commands::run::SANDBOX_KEY)]
        kms_key_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json_logs = matches!(cli.command, Command::Run { json: true, .. });
    init_tracing(json_logs);

    match cli.command {
        Command::Run {
            config,
            scenario,
            wait_for_key_status,
            convergence_reads,
            transient_failures,
            skip_sleep,
            json,
        } => {
            let options = commands::run::RunOptions {
                config,
                scenario,
                wait_for_key_status,
                convergence_reads,
                transient_failures,
                skip_sleep,
                json,
            };
            commands::run::run(options).await
        }
        Command::Init {
            project_id,
            kms_key_name,
        } => commands::init::init(&project_id, &kms_key_name),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cmek=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
