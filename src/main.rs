mod app;
mod cli;
mod config;
mod core;
mod executors;
mod modules;
mod utils;

use clap::Parser;
use colored::Colorize;

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = cli::args::Cli::parse();
    if let Err(failure) = app::run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), failure);
        std::process::exit(1);
    }
}
