use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cask",
    about = "cask: content-addressed file collections over hashed blocks",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Block store directory
    #[arg(long, global = true, default_value = ".cask")]
    pub store: PathBuf,

    /// TOML file with collection settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured block size (bytes)
    #[arg(long, global = true)]
    pub block_size: Option<usize>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file or directory tree as a collection
    Put(PutArgs),
    /// Print a collection's normalized manifest
    Manifest(ManifestArgs),
    /// List the files in a collection
    Ls(LsArgs),
    /// Write one file of a collection to stdout
    Cat(CatArgs),
    /// Normalize a manifest file without touching the store
    Normalize(NormalizeArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
    /// Name of the first stream
    #[arg(long, default_value = ".")]
    pub stream: String,
    /// Directory levels that become their own streams (negative: all)
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    pub max_depth: i32,
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Collection locator, or a file holding manifest text
    pub collection: String,
}

#[derive(Args)]
pub struct LsArgs {
    pub collection: String,
}

#[derive(Args)]
pub struct CatArgs {
    pub collection: String,
    pub path: String,
}

#[derive(Args)]
pub struct NormalizeArgs {
    pub file: PathBuf,
}
