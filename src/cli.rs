//! Command-line surface: `server new|connect|discover` starts a peer;
//! `client` is a small interactive session against a running peer.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "distorage", about = "Peer-to-peer distributed file storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a storage node.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Interactive client session against a running node.
    Client {
        /// Node to connect to; if omitted, the local subnet is scanned.
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServerAction {
    /// Start a brand-new cluster (this node is the sole member).
    New {
        /// Cluster join secret; prompted for interactively if omitted.
        secret: Option<String>,
    },
    /// Join an existing cluster through a known member.
    Connect {
        ip: String,
        secret: Option<String>,
    },
    /// Scan the local `/24` subnet for an existing cluster and join it.
    Discover {
        secret: Option<String>,
    },
}
