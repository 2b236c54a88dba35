//! Structured operation outcomes.
//!
//! The core never writes to a display surface; every operation returns one
//! of these records and the presentation layer decides how to render it.
//! All of them serialize cleanly for `--json` output.

use crate::catalog::{Assignment, ExitNodeSummary, RouteStatus};
use crate::prober::Disruption;
use meshexit_api::{Peer, Route};
use serde::Serialize;

/// How a switch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStatus {
    /// The target route already carried the distribution group; nothing
    /// was mutated.
    AlreadyActive,
    Switched,
}

/// One exit node the peer was detached from during a switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detachment {
    /// Display name of the old gateway peer.
    pub exit_node: String,
    /// Present when the detach could not be confirmed and was presumed
    /// committed after a connectivity probe.
    pub disruption: Option<Disruption>,
}

/// Result of `switch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchOutcome {
    pub status: SwitchStatus,
    /// Display name of the target exit node.
    pub exit_node: String,
    pub detached: Vec<Detachment>,
    /// False when the attach timed out and is presumed to have landed over
    /// the rerouted path.
    pub attach_confirmed: bool,
}

/// Result of `remove`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RemoveOutcome {
    /// The peer has no distribution group, so it cannot be using any exit
    /// node.
    NotUsingExitNode,
    /// The group was stripped from the listed exit nodes (empty when the
    /// group existed but was assigned nowhere).
    Removed { exit_nodes: Vec<String> },
}

/// The peer's current exit node, resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentExitNode {
    pub peer_id: String,
    pub name: String,
}

/// An exit node with its gateway name resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitNode {
    pub peer_id: String,
    pub name: String,
    pub enabled_routes: usize,
    pub total_routes: usize,
    pub networks: Vec<RouteStatus>,
}

impl ExitNode {
    pub fn is_active(&self) -> bool {
        self.enabled_routes > 0
    }

    pub(crate) fn from_summary(summary: ExitNodeSummary, name: String) -> Self {
        Self {
            peer_id: summary.peer_id,
            name,
            enabled_routes: summary.enabled_routes,
            total_routes: summary.total_routes,
            networks: summary.networks,
        }
    }
}

/// A group as shown in the `info` view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub peer_count: usize,
}

/// An exit-node assignment with its gateway name resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAssignment {
    pub exit_node: String,
    #[serde(flatten)]
    pub assignment: Assignment,
}

/// Everything the `info` view needs about one peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerInfo {
    pub peer_name: String,
    pub group_name: String,
    /// The distribution group's id when it exists.
    pub group_id: Option<String>,
    /// Exit-node routes currently carrying the distribution group.
    pub assignments: Vec<ResolvedAssignment>,
    pub groups: Vec<GroupSummary>,
    pub exit_nodes: Vec<ExitNode>,
}

/// Non-exit routes visible to a peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRoutes {
    pub peer: Peer,
    pub routes: Vec<Route>,
}
