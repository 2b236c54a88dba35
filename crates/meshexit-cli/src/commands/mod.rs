//! Command implementations.

pub mod config;
pub mod exit_nodes;
pub mod routes;

use crate::credentials::Credentials;
use anyhow::Result;
use clap::Subcommand;
use meshexit_api::ControlPlaneClient;
use meshexit_core::ExitNodeSwitcher;

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Manage exit nodes
    #[command(subcommand)]
    ExitNodes(exit_nodes::ExitNodesCommand),

    /// Inspect routes visible to a peer
    #[command(subcommand)]
    Routes(routes::RoutesCommand),

    /// Manage API credentials
    #[command(subcommand)]
    Config(config::ConfigCommand),
}

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::ExitNodes(cmd) => exit_nodes::execute(cmd).await,
            Commands::Routes(cmd) => routes::execute(cmd).await,
            Commands::Config(cmd) => config::execute(cmd),
        }
    }
}

/// Build the switcher from resolved credentials.
pub(crate) fn build_switcher() -> Result<ExitNodeSwitcher<ControlPlaneClient>> {
    let creds = Credentials::resolve()?;
    let client = ControlPlaneClient::new(&creds.api_url, &creds.access_token)?;
    Ok(ExitNodeSwitcher::new(client))
}

/// The peer to operate on: an explicit name, or the local hostname.
pub(crate) fn peer_or_local(peer: Option<String>) -> Result<String> {
    match peer {
        Some(name) => Ok(name),
        None => Ok(hostname::get()?.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_parse_exit_nodes_list() {
        let cli = TestCli::parse_from(["test", "exit-nodes", "list", "--json"]);
        assert!(matches!(
            cli.command,
            Commands::ExitNodes(exit_nodes::ExitNodesCommand::List(_))
        ));
    }

    #[test]
    fn test_parse_exit_nodes_set() {
        let cli = TestCli::parse_from(["test", "exit-nodes", "set", "gateway-a", "--peer", "laptop"]);
        match cli.command {
            Commands::ExitNodes(exit_nodes::ExitNodesCommand::Set(args)) => {
                assert_eq!(args.exit_node, "gateway-a");
                assert_eq!(args.peer.as_deref(), Some("laptop"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_exit_nodes_rm_defaults_to_local_peer() {
        let cli = TestCli::parse_from(["test", "exit-nodes", "rm"]);
        match cli.command {
            Commands::ExitNodes(exit_nodes::ExitNodesCommand::Rm(args)) => {
                assert!(args.peer.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_exit_nodes_info() {
        let cli = TestCli::parse_from(["test", "exit-nodes", "info"]);
        assert!(matches!(
            cli.command,
            Commands::ExitNodes(exit_nodes::ExitNodesCommand::Info(_))
        ));
    }

    #[test]
    fn test_parse_routes_list() {
        let cli = TestCli::parse_from(["test", "routes", "list", "--peer", "laptop"]);
        assert!(matches!(
            cli.command,
            Commands::Routes(routes::RoutesCommand::List(_))
        ));
    }

    #[test]
    fn test_parse_config_set() {
        let cli = TestCli::parse_from([
            "test",
            "config",
            "set",
            "--api-url",
            "https://api.example.com",
            "--access-token",
            "nbp_secret",
        ]);
        match cli.command {
            Commands::Config(config::ConfigCommand::Set(args)) => {
                assert_eq!(args.api_url, "https://api.example.com");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
