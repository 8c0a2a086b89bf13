//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hcdump",
    version,
    about = "Collect diagnostics from a hosted cluster and its control plane",
    long_about = None,
)]
pub struct Cli {
    /// Kubernetes context of the management cluster
    #[arg(long, global = true, env = "HCDUMP_CONTEXT")]
    pub context: Option<String>,

    /// Format of the final report
    #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum Command {
    /// Dump a hosted cluster, its control plane and optionally its guest cluster
    #[command(alias = "hostedcluster")]
    Cluster(DumpClusterArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DumpClusterArgs {
    /// Namespace of the HostedCluster
    #[arg(long, default_value = "clusters")]
    pub namespace: String,

    /// Name of the HostedCluster
    #[arg(long, default_value = "example")]
    pub name: String,

    /// Impersonate a user or service account while collecting
    #[arg(long = "as")]
    pub impersonate: Option<String>,

    /// Destination directory for dump files
    #[arg(long, env = "HCDUMP_ARTIFACT_DIR")]
    pub artifact_dir: PathBuf,

    /// Namespace holding agent platform resources
    #[arg(long)]
    pub agent_namespace: Option<String>,

    /// Also dump the guest cluster through a tunnel to its API server
    #[arg(long)]
    pub dump_guest_cluster: bool,

    /// Report container logs containing this text (repeatable)
    #[arg(long = "log-signature")]
    pub log_signatures: Vec<String>,
}
