//! # CLI Interface
//!
//! `clap` derive definitions for `hypha-node`: `run`, `check-config` and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Hypha mesh node.
///
/// Runs one mesh node over an in-process simulated peer set and serves an
/// HTTP/WebSocket API for inspecting paths, topology, routes and growth.
#[derive(Parser, Debug)]
#[command(
    name = "hypha-node",
    about = "Hypha mesh node",
    version,
    propagate_version = true
)]
pub struct HyphaNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node and serve the API.
    Run(RunArgs),
    /// Load and validate a configuration file, then print the effective
    /// configuration.
    CheckConfig(CheckConfigArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Mesh configuration file (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "HYPHA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Identifier of this node in the mesh.
    #[arg(long, env = "HYPHA_NODE_ID", default_value = "hypha-local")]
    pub node_id: String,

    /// Port for the HTTP/WebSocket API.
    #[arg(long, env = "HYPHA_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Number of peers in the simulated network.
    #[arg(long, env = "HYPHA_SIMULATED_PEERS", default_value_t = 12)]
    pub simulated_peers: usize,

    /// Log output format.
    #[arg(long, value_enum, env = "HYPHA_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `check-config` subcommand.
#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    /// Mesh configuration file (TOML).
    #[arg(long, short = 'c', env = "HYPHA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        HyphaNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = HyphaNodeCli::parse_from(["hypha-node", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.api_port, 9841);
                assert_eq!(args.simulated_peers, 12);
                assert_eq!(args.log_format, LogFormat::Pretty);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn check_config_takes_a_path() {
        let cli = HyphaNodeCli::parse_from(["hypha-node", "check-config", "-c", "mesh.toml"]);
        match cli.command {
            Commands::CheckConfig(args) => {
                assert_eq!(args.config, Some(PathBuf::from("mesh.toml")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
