//! trustflow - Trust Network Flow Analyzer
//!
//! Run with: cargo run -- flow <SOURCE> <SINK>

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trustflow::{AddressFlowReport, Config, Coordinator};

mod cli;

use cli::{Cli, Command};

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" TRUSTFLOW - Trust Network Flow Analyzer").cyan().bold()
    );
    println!(
        "{}",
        style("    Max Flow | Path Decomposition | Arbitrage Cycles").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

/// Capacities are thousandths of a token
fn format_amount(amount: u64) -> String {
    format!("{}.{:03}", amount / 1000, amount % 1000)
}

fn print_report(title: &str, report: &AddressFlowReport) {
    println!(
        "{} {}: {}",
        style("✓").green(),
        title,
        style(format_amount(report.flow_value)).bold()
    );

    if report.paths.is_empty() {
        println!("   No paths");
        return;
    }

    println!();
    println!("   Paths ({}):", report.paths.len());
    for (i, path) in report.paths.iter().enumerate() {
        println!(
            "   {:>3}. {} [{}]  {}",
            i + 1,
            path.accounts.join(" → "),
            path.tokens.join(", "),
            format_amount(path.amount)
        );
    }

    println!();
    println!("   Transfers ({}):", report.edge_flows.len());
    for ((from, to), tokens) in &report.edge_flows {
        for (token, amount) in tokens {
            println!("     {} → {} : {} of {}", from, to, format_amount(*amount), token);
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(path) = &cli.trusts {
        config.trusts_csv = path.display().to_string();
    }
    if let Some(path) = &cli.balances {
        config.balances_csv = path.display().to_string();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    Ok(config)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let json = cli.command.wants_json();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_filter.parse()?),
        )
        .init();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    if !json {
        print_banner();
        config.print_summary();
        println!();
    }

    // =============================================
    // PHASE 1: THE CARTOGRAPHER
    // =============================================
    if !json {
        println!("{}", style("═══ PHASE 1: THE CARTOGRAPHER ═══").blue().bold());
        println!();
        println!("{}", style("Step 1.1: Loading snapshot...").blue());
    }
    let start = Instant::now();

    let coordinator = Coordinator::from_csv(&config.trusts_csv, &config.balances_csv, &config)?;

    info!("Snapshot loaded in {:?}", start.elapsed());
    if !json {
        println!(
            "{} Graph built in {:?}: {} vertices, {} edges, {} accounts",
            style("✓").green(),
            start.elapsed(),
            coordinator.num_vertices(),
            coordinator.num_edges(),
            coordinator.num_accounts()
        );
        println!();
    }

    // =============================================
    // PHASE 3: THE BRAIN
    // =============================================
    if !json {
        println!(
            "{}",
            style(format!("═══ PHASE 3: THE BRAIN ({} backend) ═══", coordinator.backend_kind()))
                .magenta()
                .bold()
        );
        println!();
    }
    let start = Instant::now();

    match &cli.command {
        Command::Flow { source, sink, query } => {
            let report = coordinator.analyze_flow(source, sink, query.algorithm, query.cutoff)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print_report(&format!("Max flow {} → {}", source, sink), &report);
            }
        }
        Command::Arbitrage { start: account, start_token, end_token, query } => {
            let report =
                coordinator.analyze_arbitrage(account, start_token, end_token, query.algorithm, query.cutoff)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print_report(
                    &format!("Arbitrage {} [{} → {}]", account, start_token, end_token),
                    &report,
                );
            }
        }
        Command::Info { sample } => {
            let sample = sample.unwrap_or(config.node_info_sample);
            println!("   Vertices: {}", coordinator.num_vertices());
            println!("   Edges:    {}", coordinator.num_edges());
            println!();
            println!("   Sample ({}):", sample);
            for line in coordinator.node_info(sample) {
                println!("     {}", line);
            }
        }
    }

    info!("Query finished in {:?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0.000");
        assert_eq!(format_amount(1_500), "1.500");
        assert_eq!(format_amount(42), "0.042");
    }

    #[test]
    fn test_cli_parses_flow() {
        let cli = Cli::try_parse_from([
            "trustflow",
            "--backend",
            "ortools",
            "flow",
            "0xa",
            "0xb",
            "--cutoff",
            "50",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(trustflow::BackendKind::Combinatorial));
        assert!(cli.command.wants_json());
        match cli.command {
            Command::Flow { source, sink, query } => {
                assert_eq!((source.as_str(), sink.as_str()), ("0xa", "0xb"));
                assert_eq!(query.cutoff, Some(50));
                assert!(query.algorithm.is_none());
            }
            _ => panic!("expected flow subcommand"),
        }
    }
}
