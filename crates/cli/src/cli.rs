use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Evaluate anomaly-detection plans and merge their anomalies.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Anomaly-detection plan engine")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load plans and print each one's execution order.
    Validate {
        /// A plan file, or a directory scanned recursively.
        /// Defaults to `VIGIL_PLANS_DIR`.
        path: Option<PathBuf>,
    },

    /// Evaluate one plan over a window and merge its anomalies.
    Run {
        /// Plan document (YAML or JSON).
        #[arg(long)]
        plan: PathBuf,

        /// Window start, RFC 3339 or epoch millis.
        #[arg(long)]
        start: String,

        /// Window end (exclusive), RFC 3339 or epoch millis.
        #[arg(long)]
        end: String,

        /// JSON file of time series served to DataFetcher nodes.
        #[arg(long)]
        series: Option<PathBuf>,

        /// Abort the evaluation after this period (e.g. `30s`, `PT5M`).
        #[arg(long)]
        timeout: Option<String>,

        /// Print every node's result instead of the merged anomalies.
        #[arg(long)]
        all_nodes: bool,
    },
}
