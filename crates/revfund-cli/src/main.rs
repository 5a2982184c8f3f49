//! Revenue fund CLI
//!
//! Replays scripted scenarios against an in-memory revenue fund.

mod scenario;

use anyhow::Context;
use clap::{Parser, Subcommand};
use revfund_engine::FundConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "revfund")]
#[command(version = "0.1.0")]
#[command(about = "Revenue accrual fund - replay claim scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print a JSON summary
    Replay {
        /// Fund configuration file; defaults when omitted
        #[arg(short, long, env = "REVFUND_CONFIG")]
        config: Option<PathBuf>,

        /// Scenario file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Stop at the first failing step
        #[arg(long)]
        fail_fast: bool,
    },

    /// Print the effective fund configuration as TOML
    Config {
        /// Fund configuration file; defaults when omitted
        #[arg(short, long, env = "REVFUND_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // logs go to stderr so stdout stays a clean JSON summary
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FundConfig> {
    match path {
        Some(path) => FundConfig::from_file(path)
            .with_context(|| format!("loading fund config {}", path.display())),
        None => {
            tracing::info!("No config given, using defaults");
            Ok(FundConfig::default())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Replay {
            config,
            scenario,
            fail_fast,
        } => {
            let fund_config = load_config(config.as_ref())?;
            let scenario = scenario::Scenario::from_file(&scenario)?;
            tracing::info!(
                "Replaying {} steps with fund {}",
                scenario.steps.len(),
                fund_config.fund_address
            );

            let summary = scenario::Replay::new(fund_config, &scenario)?.run(&scenario, fail_fast)?;
            let failed = summary.failed_steps();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if failed > 0 {
                tracing::warn!("{} step(s) failed", failed);
            }
        }

        Commands::Config { config } => {
            let fund_config = load_config(config.as_ref())?;
            print!("{}", fund_config.to_toml()?);
        }
    }

    Ok(())
}
