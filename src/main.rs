use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use matrix_pipeline::PipelineBuilder;
use std::path::PathBuf;

/// Stream matrix jobs from a file feed through staged worker pools.
#[derive(Parser, Debug)]
#[command(name = "matrix-pipeline", version, about)]
struct Cli {
    /// Feed file: one item-file path per line
    feed: PathBuf,

    /// Report file written by the sink
    #[arg(short, long, default_value = "report.out")]
    output: PathBuf,

    /// Dimension of the square input matrices
    #[arg(long, default_value_t = 10)]
    matrix_order: usize,

    /// Capacity of every inter-stage channel
    #[arg(long, default_value_t = 5)]
    channel_capacity: usize,

    /// Workers in the multiply stage
    #[arg(long, default_value_t = 5)]
    multiply_workers: usize,

    /// Workers in the column-sum stage
    #[arg(long, default_value_t = 4)]
    column_sum_workers: usize,

    /// Workers in the total stage
    #[arg(long, default_value_t = 3)]
    total_workers: usize,

    /// Log per-worker progress
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let report = PipelineBuilder::new()
        .matrix_order(cli.matrix_order)
        .channel_capacity(cli.channel_capacity)
        .workers(
            cli.multiply_workers,
            cli.column_sum_workers,
            cli.total_workers,
        )
        .build()
        .context("invalid pipeline configuration")?
        .run(&cli.feed, &cli.output)
        .with_context(|| format!("run failed for feed {}", cli.feed.display()))?;

    println!(
        "{} items completed ({} skipped at admission), report in {}",
        report.completed,
        report.skipped,
        cli.output.display()
    );
    Ok(())
}
