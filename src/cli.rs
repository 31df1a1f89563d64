use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use trustflow::{BackendKind, FlowAlgorithm};

/// Max-flow and arbitrage analysis over a trust network snapshot
#[derive(Parser)]
#[command(name = "trustflow", version, about)]
pub struct Cli {
    /// Trust edge CSV (overrides TRUSTS_CSV)
    #[arg(long, global = true)]
    pub trusts: Option<PathBuf>,

    /// Balance CSV (overrides BALANCES_CSV)
    #[arg(long, global = true)]
    pub balances: Option<PathBuf>,

    /// Solver backend: general | combinatorial
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// TOML config file; the environment is used when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone)]
pub struct QueryOptions {
    /// Upper bound on the returned flow, in thousandths of a token
    #[arg(long)]
    pub cutoff: Option<u64>,

    /// preflow_push | edmonds_karp | dinic
    #[arg(long)]
    pub algorithm: Option<FlowAlgorithm>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Maximum transferable value from SOURCE to SINK
    Flow {
        source: String,
        sink: String,

        #[command(flatten)]
        query: QueryOptions,
    },

    /// Round trip from START leaving with START_TOKEN and returning with END_TOKEN
    Arbitrage {
        start: String,
        start_token: String,
        end_token: String,

        #[command(flatten)]
        query: QueryOptions,
    },

    /// Graph size and a random sample of vertices
    Info {
        /// Number of vertices to sample (overrides NODE_INFO_SAMPLE)
        #[arg(long)]
        sample: Option<usize>,
    },
}

impl Command {
    pub fn wants_json(&self) -> bool {
        match self {
            Command::Flow { query, .. } | Command::Arbitrage { query, .. } => query.json,
            Command::Info { .. } => false,
        }
    }
}
