//! `meshexit routes` subcommands.

use super::{build_switcher, peer_or_local};
use crate::render;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Debug, Clone, Subcommand)]
pub enum RoutesCommand {
    /// List non-exit routes visible to a peer
    List(ListArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Peer to query routes for (default: local hostname)
    #[arg(long)]
    pub peer: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(command: RoutesCommand) -> Result<()> {
    match command {
        RoutesCommand::List(args) => list(args).await,
    }
}

async fn list(args: ListArgs) -> Result<()> {
    let peer = peer_or_local(args.peer)?;
    let switcher = build_switcher()?;

    let routes = switcher.peer_routes(&peer).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
    } else {
        render::peer_routes(&routes);
    }
    Ok(())
}
