//! `meshexit exit-nodes` subcommands.

use super::{build_switcher, peer_or_local};
use crate::render;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Debug, Clone, Subcommand)]
pub enum ExitNodesCommand {
    /// List all exit nodes
    List(ListArgs),

    /// Set the active exit node for a peer
    ///
    /// Creates the peer's distribution group if it is missing and moves it
    /// from any currently assigned exit node to the given one.
    Set(SetArgs),

    /// Remove a peer from all exit nodes
    Rm(RmArgs),

    /// Show a peer's distribution group and current assignments
    Info(InfoArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SetArgs {
    /// Name or hostname of the exit node to activate
    pub exit_node: String,

    /// Peer to manage (default: local hostname)
    #[arg(long)]
    pub peer: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RmArgs {
    /// Peer to remove from all exit nodes (default: local hostname)
    #[arg(long)]
    pub peer: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct InfoArgs {
    /// Peer to show info for (default: local hostname)
    #[arg(long)]
    pub peer: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(command: ExitNodesCommand) -> Result<()> {
    match command {
        ExitNodesCommand::List(args) => list(args).await,
        ExitNodesCommand::Set(args) => set(args).await,
        ExitNodesCommand::Rm(args) => rm(args).await,
        ExitNodesCommand::Info(args) => info(args).await,
    }
}

async fn list(args: ListArgs) -> Result<()> {
    let switcher = build_switcher()?;
    let nodes = switcher.list_exit_nodes().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else {
        render::exit_nodes(&nodes);
    }
    Ok(())
}

async fn set(args: SetArgs) -> Result<()> {
    let peer = peer_or_local(args.peer)?;
    let switcher = build_switcher()?;

    let outcome = switcher.switch(&peer, &args.exit_node).await?;
    render::switch_outcome(&outcome);
    Ok(())
}

async fn rm(args: RmArgs) -> Result<()> {
    let peer = peer_or_local(args.peer)?;
    let switcher = build_switcher()?;

    let outcome = switcher.remove(&peer).await?;
    render::remove_outcome(&peer, &outcome);
    Ok(())
}

async fn info(args: InfoArgs) -> Result<()> {
    let peer = peer_or_local(args.peer)?;
    let switcher = build_switcher()?;

    let info = switcher.peer_info(&peer).await?;
    let current = switcher.current_exit_node(&peer).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        render::peer_info(&info, current.as_ref());
    }
    Ok(())
}
