use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use cask_types::{ContentAddress, HashAlgorithm, Partition};

#[derive(Parser)]
#[command(
    name = "cask",
    about = "cask: content-addressed blob storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the blob server
    Serve(ServeArgs),
    /// Store a file in a local blob store
    Put(PutArgs),
    /// Copy a stored blob to a file or stdout
    Get(GetArgs),
    /// Print the content address of a file
    Hash(HashArgs),
    /// List stored blobs
    List(ListArgs),
    /// Write a default server configuration file
    InitConfig(InitConfigArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    /// Storage root
    #[arg(long, default_value = "cask-data")]
    pub root: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides `bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Overrides `storage_root`
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Args)]
pub struct PutArgs {
    /// File to store, or `-` for stdin
    pub file: PathBuf,
    #[arg(short, long, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
    /// Also place the blob in these partitions
    #[arg(short, long = "mirror", value_delimiter = ',')]
    pub mirrors: Vec<Partition>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct GetArgs {
    pub address: ContentAddress,
    /// Write here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct HashArgs {
    /// File to hash, or `-` for stdin
    pub file: PathBuf,
    #[arg(short, long, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only this algorithm; all when omitted
    #[arg(short, long)]
    pub algorithm: Option<HashAlgorithm>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct InitConfigArgs {
    #[arg(default_value = "cask.toml")]
    pub path: PathBuf,
}
