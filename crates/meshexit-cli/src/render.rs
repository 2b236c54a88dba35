//! Terminal rendering of core outcomes.
//!
//! The core returns structured outcomes; everything user-facing about them
//! happens here.

use crate::credentials;
use meshexit_api::ApiError;
use meshexit_core::{
    CurrentExitNode, ErrorKind, ExitNode, PeerInfo, PeerRoutes, RemoveOutcome, SwitchError,
    SwitchOutcome, SwitchStatus,
};

pub fn switch_outcome(outcome: &SwitchOutcome) {
    match outcome.status {
        SwitchStatus::AlreadyActive => {
            println!("Exit node '{}' was already active", outcome.exit_node);
        }
        SwitchStatus::Switched => {
            for detachment in &outcome.detached {
                match detachment.disruption {
                    None => println!("Removed from exit node '{}'", detachment.exit_node),
                    Some(disruption) => println!(
                        "Removed from exit node '{}' ({})",
                        detachment.exit_node, disruption
                    ),
                }
            }
            if outcome.attach_confirmed {
                println!("Exit node '{}' activated", outcome.exit_node);
            } else {
                println!(
                    "Route update timed out, likely from the path change; \
                     exit node '{}' presumed active",
                    outcome.exit_node
                );
            }
        }
    }
}

pub fn remove_outcome(peer_name: &str, outcome: &RemoveOutcome) {
    match outcome {
        RemoveOutcome::NotUsingExitNode => {
            println!("Peer '{peer_name}' is not using any exit node");
        }
        RemoveOutcome::Removed { exit_nodes } if exit_nodes.is_empty() => {
            println!("Peer '{peer_name}' was not assigned to any exit node");
        }
        RemoveOutcome::Removed { exit_nodes } => {
            println!(
                "Removed peer '{peer_name}' from exit node(s): {}",
                exit_nodes.join(", ")
            );
            println!("The routes remain active for other peers");
        }
    }
}

pub fn exit_nodes(nodes: &[ExitNode]) {
    if nodes.is_empty() {
        println!("No exit nodes found");
        return;
    }

    println!("Exit nodes ({} found):", nodes.len());
    for node in nodes {
        let marker = if node.is_active() { "ACTIVE" } else { "inactive" };
        println!();
        println!("  {} [{}]", node.name, marker);
        println!("    id: {}", node.peer_id);
        println!(
            "    routes: {} enabled / {} total",
            node.enabled_routes, node.total_routes
        );

        let mut networks: Vec<String> = node
            .networks
            .iter()
            .map(|n| {
                format!(
                    "{} ({})",
                    n.network,
                    if n.enabled { "enabled" } else { "disabled" }
                )
            })
            .collect();
        if networks.len() > 3 {
            let more = networks.len() - 3;
            networks.truncate(3);
            networks.push(format!("and {more} more"));
        }
        if !networks.is_empty() {
            println!("    networks: {}", networks.join(", "));
        }
    }
}

pub fn peer_info(info: &PeerInfo, current: Option<&CurrentExitNode>) {
    println!("Peer: {}", info.peer_name);
    println!("Distribution group: {}", info.group_name);
    match &info.group_id {
        Some(id) => println!("  exists (id: {id})"),
        None => println!("  does not exist yet; it is created on the first switch"),
    }

    match current {
        Some(node) => println!("Current exit node: {}", node.name),
        None => println!("Current exit node: none"),
    }

    if !info.assignments.is_empty() {
        println!();
        println!("Assignments:");
        for assignment in &info.assignments {
            println!(
                "  {} via {} [{}]",
                assignment.assignment.network,
                assignment.exit_node,
                if assignment.assignment.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
    }

    println!();
    println!("Groups:");
    for group in &info.groups {
        println!(
            "  {} (id: {}, {} peer{})",
            group.name,
            group.id,
            group.peer_count,
            if group.peer_count == 1 { "" } else { "s" }
        );
    }

    println!();
    exit_nodes(&info.exit_nodes);
}

pub fn peer_routes(routes: &PeerRoutes) {
    if routes.routes.is_empty() {
        println!("No routes found for peer '{}'", routes.peer.display_name());
        return;
    }

    println!(
        "Routes available for peer '{}' ({} found):",
        routes.peer.display_name(),
        routes.routes.len()
    );
    for route in &routes.routes {
        println!();
        println!("  {} (id: {})", route.network, route.id);
        if !route.description.is_empty() {
            println!("    description: {}", route.description);
        }
        println!("    enabled: {}", route.enabled);
        if !route.groups().is_empty() {
            println!("    groups: {}", route.groups().join(", "));
        }
        if !route.peers.is_empty() {
            println!("    peers: {}", route.peers.len());
        }
    }
}

/// Print an error with actionable hints matching its classification.
pub fn report_error(err: &anyhow::Error) {
    eprintln!("error: {err}");

    let kind = err
        .downcast_ref::<SwitchError>()
        .map(SwitchError::kind)
        .or_else(|| err.downcast_ref::<ApiError>().map(api_kind));

    if let Some(kind) = kind {
        for hint in hints(kind) {
            eprintln!("  {hint}");
        }
    } else if err.downcast_ref::<credentials::ConfigError>().is_some() {
        eprintln!("  run 'meshexit config show' to inspect the current configuration");
    }
}

fn api_kind(err: &ApiError) -> ErrorKind {
    match err {
        ApiError::Unauthorized => ErrorKind::Unauthorized,
        ApiError::PermissionDenied => ErrorKind::PermissionDenied,
        ApiError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
        ApiError::Timeout(_) => ErrorKind::Timeout,
        ApiError::Unreachable(_) => ErrorKind::Unreachable,
        _ => ErrorKind::Other,
    }
}

fn hints(kind: ErrorKind) -> &'static [&'static str] {
    match kind {
        ErrorKind::Unreachable => &[
            "the control plane could not be reached; this could mean:",
            "- the server is down or unreachable",
            "- you are not connected to the overlay network",
            "- the API URL is incorrect",
            "- a firewall is blocking the connection",
        ],
        ErrorKind::Unauthorized => &[
            "the access token was rejected",
            "check MESHEXIT_ACCESS_TOKEN or run 'meshexit config set'",
        ],
        ErrorKind::PermissionDenied => &[
            "the access token lacks admin/write permissions; options:",
            "- ask your administrator to create the distribution group for you",
            "- reuse an existing group (see 'meshexit exit-nodes info')",
            "- request a token with admin privileges",
        ],
        ErrorKind::ValidationRejected => &[
            "the server rejected the request data; this could mean:",
            "- a group id on the route no longer exists",
            "- a peer id is invalid",
            "- the route payload is missing a required field",
        ],
        ErrorKind::Timeout => &["the server might be slow or overloaded; try again"],
        ErrorKind::PeerNotFound | ErrorKind::RouteNotFound => {
            &["run 'meshexit exit-nodes list' to see what is available"]
        }
        ErrorKind::Other => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_with_hints_stays_actionable() {
        // Connection-level and auth failures must always carry guidance.
        assert!(!hints(ErrorKind::Unreachable).is_empty());
        assert!(!hints(ErrorKind::Unauthorized).is_empty());
        assert!(!hints(ErrorKind::PermissionDenied).is_empty());
        assert!(!hints(ErrorKind::ValidationRejected).is_empty());
    }

    #[test]
    fn test_api_kind_mapping() {
        assert_eq!(api_kind(&ApiError::Unauthorized), ErrorKind::Unauthorized);
        assert_eq!(
            api_kind(&ApiError::Unreachable("down".into())),
            ErrorKind::Unreachable
        );
    }
}
