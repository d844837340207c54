//! `agent-checks` command-line entry point

use agent_checks_cli::{AgentConfig, Scheduler};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "agent-checks")]
#[command(about = "Poll OpenStack, Harbor and Go expvar endpoints and report their health")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured instance on its interval
    Run {
        /// Configuration file path
        #[arg(long, short, env = "AGENT_CHECKS_CONFIG")]
        config: PathBuf,

        /// Run each instance once and exit
        #[arg(long)]
        once: bool,
    },
    /// Check the configuration file and exit
    Validate {
        /// Configuration file path
        #[arg(long, short, env = "AGENT_CHECKS_CONFIG")]
        config: PathBuf,
    },
}

fn load(path: &Path) -> Result<AgentConfig> {
    let config = AgentConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(config: PathBuf, once: bool) -> Result<i32> {
    let config = load(&config)?;
    config.logging.initialize()?;

    let mut scheduler = Scheduler::from_config(&config)?;
    info!(
        instances = scheduler.len(),
        profile_memory = config.profiling.profile_memory,
        "agent-checks starting"
    );

    if once {
        let failed = scheduler.run_all_once().await;
        if failed > 0 {
            warn!(failed, "some check runs failed");
            return Ok(1);
        }
        return Ok(0);
    }

    tokio::select! {
        _ = scheduler.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for shutdown signal")?;
            info!("shutdown requested");
        }
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Run { config, once } => run(config, once).await,
        Command::Validate { config } => load(&config).map(|config| {
            println!(
                "configuration OK: {} openstack, {} harbor, {} go_expvar instance(s)",
                config.openstack.len(),
                config.harbor.len(),
                config.go_expvar.len()
            );
            0
        }),
    };

    match outcome {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}
