mod cli;
mod commands;
mod series;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use vigil_core::Config;
use vigil_pipeline::NodeRegistry;

use crate::cli::{CliArgs, Command};
use crate::commands::{RunOptions, RunReport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    vigil_core::config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    match CliArgs::parse().command {
        Command::Validate { path } => {
            let path = path.unwrap_or_else(|| config.plans.plans_dir.clone());
            let registry = NodeRegistry::with_builtins();
            let summaries = commands::validate(&path, &registry)?;
            for summary in &summaries {
                let order: Vec<String> = summary
                    .order
                    .iter()
                    .map(|name| {
                        if summary.embedded.contains(name) {
                            format!("({name})")
                        } else {
                            name.clone()
                        }
                    })
                    .collect();
                println!("OK    {}: {}", summary.name, order.join(" -> "));
            }
            info!(plans = summaries.len(), "validation passed");
        }
        Command::Run {
            plan,
            start,
            end,
            series,
            timeout,
            all_nodes,
        } => {
            let opts = RunOptions {
                plan,
                start,
                end,
                series,
                timeout,
            };
            match commands::run(&config, opts, all_nodes).await? {
                RunReport::Nodes(results) => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                RunReport::Merged(anomalies) => {
                    println!("{}", serde_json::to_string_pretty(&anomalies)?);
                }
            }
        }
    }

    Ok(())
}
