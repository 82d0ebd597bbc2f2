use crate::utils::logging::LogLevel;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "lahma", version)]
#[command(about = "LahMa: Modular Security Toolkit", long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file (default: config/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// Override the configured log file; NONE disables file logging
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one toolkit module
    Run {
        #[arg(value_enum, ignore_case = true)]
        module: ModuleName,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleName {
    /// Generate and simulate deployment of honeypot bait rules
    Honeypot,
    /// Read-only connectivity checks against ESXi endpoints
    Esxi,
    /// Run the nuclei scanner against the configured URL
    Fuzz,
}
