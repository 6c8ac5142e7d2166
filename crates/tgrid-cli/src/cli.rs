use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tgrid",
    about = "Inspect and validate tgrid mapping documents",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a mapping document and report whether it is valid
    Validate(ValidateArgs),
    /// Show tables, keys and association layout of a mapping document
    Describe(DescribeArgs),
}

#[derive(Args)]
pub struct ValidateArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct DescribeArgs {
    pub path: PathBuf,
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}
