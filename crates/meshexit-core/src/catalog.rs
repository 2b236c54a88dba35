//! Exit-node catalog: pure views over a route snapshot.
//!
//! Nothing here talks to the control plane; callers fetch routes once and
//! derive whatever they need from that snapshot.

use meshexit_api::Route;
use serde::Serialize;

/// One route's network and enablement, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStatus {
    pub network: String,
    pub enabled: bool,
}

/// Aggregated view of one gateway peer's exit-node routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitNodeSummary {
    /// Gateway peer id.
    pub peer_id: String,
    pub enabled_routes: usize,
    pub total_routes: usize,
    pub networks: Vec<RouteStatus>,
}

impl ExitNodeSummary {
    /// An exit node with at least one enabled route is considered active.
    pub fn is_active(&self) -> bool {
        self.enabled_routes > 0
    }
}

/// An exit-node route carrying a particular distribution group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub route_id: String,
    /// Gateway peer id.
    pub peer_id: String,
    pub network: String,
    pub enabled: bool,
}

/// Group routes by gateway peer, in first-seen order.
pub fn exit_nodes(routes: &[Route]) -> Vec<ExitNodeSummary> {
    let mut summaries: Vec<ExitNodeSummary> = Vec::new();

    for route in routes.iter().filter(|r| r.is_exit_node()) {
        let Some(peer_id) = route.peer.as_deref() else {
            continue;
        };

        let summary = match summaries.iter_mut().find(|s| s.peer_id == peer_id) {
            Some(existing) => existing,
            None => {
                summaries.push(ExitNodeSummary {
                    peer_id: peer_id.to_string(),
                    enabled_routes: 0,
                    total_routes: 0,
                    networks: Vec::new(),
                });
                summaries.last_mut().expect("just pushed")
            }
        };

        summary.total_routes += 1;
        if route.enabled {
            summary.enabled_routes += 1;
        }
        summary.networks.push(RouteStatus {
            network: route.network.clone(),
            enabled: route.enabled,
        });
    }

    summaries
}

/// The gateway peer id of the unique enabled exit-node route that lists
/// `group_id`. Zero matches means no exit node; more than one is an
/// ambiguous state this tool should never have produced, also reported as
/// `None`.
pub(crate) fn current_exit_node<'a>(group_id: &str, routes: &'a [Route]) -> Option<&'a str> {
    let mut matches = routes
        .iter()
        .filter(|r| r.is_exit_node() && r.enabled && r.has_group(group_id));

    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    first.peer.as_deref()
}

/// All exit-node routes carrying `group_id`, enabled or not.
pub(crate) fn assignments(group_id: &str, routes: &[Route]) -> Vec<Assignment> {
    routes
        .iter()
        .filter(|r| r.is_exit_node() && r.has_group(group_id))
        .filter_map(|r| {
            Some(Assignment {
                route_id: r.id.clone(),
                peer_id: r.peer.clone()?,
                network: r.network.clone(),
                enabled: r.enabled,
            })
        })
        .collect()
}

/// Non-exit routes visible to a peer: routes naming the peer directly, or
/// distributed via groups (membership is not resolved here; group routes
/// are included as-is).
pub(crate) fn routes_for_peer<'a>(peer_id: &str, routes: &'a [Route]) -> Vec<&'a Route> {
    routes
        .iter()
        .filter(|r| !r.is_exit_node())
        .filter(|r| r.peers.iter().any(|p| p == peer_id) || !r.groups().is_empty())
        .collect()
}
