use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

mod anchors;
mod cli;
mod filter;
mod headers;
mod listing;
mod parser;
mod remote;
mod sanitize;
mod session;
mod utils;

use filter::PathRegex;

#[derive(Parser, Debug)]
#[clap(about, version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recursively index an open directory
    Index(IndexArgs),
    /// Parse a single listing page and print its entries
    List(ListArgs),
}

#[derive(Parser, Debug)]
pub struct IndexArgs {
    #[clap(long, default_value = "odindex")]
    pub user_agent: String,

    #[clap(long, default_value_t = 2)]
    pub threads: usize,

    #[clap(long, default_value_t = 3)]
    pub retry: usize,

    /// Keep entries that escape the parent directory scope.
    #[clap(long)]
    pub no_parent_check: bool,

    /// Relative paths matching these regexes are not crawled.
    #[clap(long)]
    pub exclude: Vec<PathRegex>,

    /// Relative paths matching these regexes are crawled even when excluded.
    #[clap(long)]
    pub include: Vec<PathRegex>,

    /// Write the inventory as JSON.
    #[clap(long)]
    pub output: Option<PathBuf>,

    #[clap(value_parser)]
    pub upstream: Url,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    #[clap(long, default_value = "odindex")]
    pub user_agent: String,

    #[clap(long, default_value_t = 3)]
    pub retry: usize,

    #[clap(long)]
    pub no_parent_check: bool,

    #[clap(value_parser)]
    pub upstream: Url,
}

fn main() {
    // https://github.com/tokio-rs/tracing/issues/735#issuecomment-957884930
    std::env::set_var(
        "RUST_LOG",
        format!("info,{}", std::env::var("RUST_LOG").unwrap_or_default()),
    );
    tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Index(args) => cli::index::index(args),
        Commands::List(args) => cli::list::list(args),
    }
}
