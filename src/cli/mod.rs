//! CLI module for kubequest
//!
//! Provides kubectl-like subcommands:
//! - `kubequest serve` - Run the simulator API
//! - `kubequest simulate` - Play a scripted scenario locally
//! - `kubequest get` / `add` / `crash` / `delete` - Drive a running simulator
//! - `kubequest watch` - Stream snapshots from a running simulator
//! - `kubequest concepts` / `ask` - Learn the concepts, ask the tutor

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

/// Default simulator URL for remote commands
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "kubequest")]
#[command(about = "Learn Kubernetes by running a port full of ships and containers")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.kubequest/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Simulator URL for remote commands
    #[arg(
        long,
        global = true,
        env = "KUBEQUEST_SERVER",
        default_value = DEFAULT_SERVER_URL
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the simulator API server
    Serve(ServeArgs),

    /// Run a scripted scenario on a local cluster
    Simulate(SimulateArgs),

    /// Show cluster status
    Status,

    /// Get/list resources
    Get(GetArgs),

    /// Add a resource
    Add(AddArgs),

    /// Crash a node; it heals after the recovery delay
    Crash {
        /// Node id (e.g. node-1)
        node: String,
    },

    /// Delete a resource
    Delete(DeleteArgs),

    /// Show recent and queued recoveries
    Recoveries,

    /// Stream cluster snapshots as they change
    Watch,

    /// List the Kubernetes concepts
    Concepts,

    /// Ask Captain Kube a question
    Ask(AskArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Bind address for the server (overrides config)
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to a .env file for loading the tutor API key
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

/// Arguments for the simulate command
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Scenario to play
    #[arg(value_enum)]
    pub scenario: Scenario,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    #[command(subcommand)]
    pub resource: GetResource,
}

#[derive(Subcommand, Debug)]
pub enum GetResource {
    /// List nodes
    #[command(name = "nodes", visible_alias = "node", visible_alias = "no")]
    Nodes,

    /// List pods
    #[command(name = "pods", visible_alias = "pod", visible_alias = "po")]
    Pods,
}

/// Arguments for the add command
#[derive(Parser, Debug)]
pub struct AddArgs {
    #[command(subcommand)]
    pub resource: AddResource,
}

#[derive(Subcommand, Debug)]
pub enum AddResource {
    /// Launch a new ship
    #[command(name = "node", visible_alias = "no")]
    Node {
        /// Display name (generated if omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Load a new container
    #[command(name = "pod", visible_alias = "po")]
    Pod {
        /// Display name (generated if omitted)
        #[arg(long)]
        name: Option<String>,
    },
}

/// Arguments for the delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    #[command(subcommand)]
    pub resource: DeleteResource,
}

#[derive(Subcommand, Debug)]
pub enum DeleteResource {
    /// Delete a node and its pods
    #[command(name = "node", visible_alias = "no")]
    Node {
        /// Node id
        node: String,
    },
}

/// Arguments for the ask command
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Concept id to frame the answer (see `kubequest concepts`)
    #[arg(long)]
    pub concept: Option<String>,

    /// Path to a .env file for loading the tutor API key
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}
