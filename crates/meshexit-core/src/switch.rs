//! The switch engine.
//!
//! Moves a peer's distribution group from its current exit-node route(s)
//! to a target route in two strictly ordered phases: detach everything
//! else first, then attach the target. Detaching first means a failure in
//! the middle leaves the peer with no exit node rather than two.

use crate::catalog;
use crate::error::SwitchError;
use crate::membership::{self, peer_display_name};
use crate::outcome::{
    CurrentExitNode, Detachment, ExitNode, GroupSummary, PeerInfo, PeerRoutes, RemoveOutcome,
    ResolvedAssignment, SwitchOutcome, SwitchStatus,
};
use crate::prober::{ConnectivityProber, ProberConfig};
use meshexit_api::{ApiError, ControlPlane, RouteUpdate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing knobs for switch operations.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub prober: ProberConfig,
    /// Attach budget. Longer than a detach: the call is expected to land
    /// over the new path once detaches have taken effect, which can take a
    /// while to converge.
    pub attach_timeout: Duration,
    /// Budget for prober-free removals.
    pub remove_timeout: Duration,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            prober: ProberConfig::default(),
            attach_timeout: Duration::from_secs(30),
            remove_timeout: Duration::from_secs(60),
        }
    }
}

/// Exit-node operations against one control plane.
///
/// Each operation works on a fresh snapshot; nothing is cached across
/// calls. Concurrent operations for the same peer are not coordinated;
/// the server applies last-writer-wins.
pub struct ExitNodeSwitcher<C> {
    client: Arc<C>,
    config: SwitchConfig,
}

impl<C: ControlPlane + 'static> ExitNodeSwitcher<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, SwitchConfig::default())
    }

    pub fn with_config(client: C, config: SwitchConfig) -> Self {
        Self::shared(Arc::new(client), config)
    }

    /// Build from an already-shared client.
    pub fn shared(client: Arc<C>, config: SwitchConfig) -> Self {
        Self { client, config }
    }

    /// Point `peer_name`'s default traffic at `exit_node_name`.
    pub async fn switch(
        &self,
        peer_name: &str,
        exit_node_name: &str,
    ) -> Result<SwitchOutcome, SwitchError> {
        info!("switching '{}' to exit node '{}'", peer_name, exit_node_name);

        let peers = self.client.list_peers().await?;
        let exit_peer_id = membership::find_peer(&peers, exit_node_name)
            .map(|p| p.id.clone())
            .ok_or_else(|| SwitchError::PeerNotFound(exit_node_name.to_string()))?;
        let peer_id = membership::find_peer(&peers, peer_name)
            .map(|p| p.id.clone())
            .ok_or_else(|| SwitchError::PeerNotFound(peer_name.to_string()))?;

        let group_id = membership::ensure_membership(self.client.as_ref(), peer_name, &peer_id).await?;
        debug!("using distribution group {}", group_id);

        let routes = self.client.list_routes().await?;
        let target = routes
            .iter()
            .filter(|r| r.is_exit_node())
            .find(|r| r.peer.as_deref() == Some(exit_peer_id.as_str()))
            .ok_or_else(|| SwitchError::RouteNotFound(exit_node_name.to_string()))?;

        let exit_node = peer_display_name(&exit_peer_id, &peers);

        if target.has_group(&group_id) {
            info!("exit node '{}' was already active", exit_node);
            return Ok(SwitchOutcome {
                status: SwitchStatus::AlreadyActive,
                exit_node,
                detached: Vec::new(),
                attach_confirmed: true,
            });
        }

        // Detach phase. Removing our own route may cut the API path, so
        // each update goes through the prober.
        let prober = ConnectivityProber::new(Arc::clone(&self.client), self.config.prober.clone());
        let mut detached = Vec::new();
        for route in routes.iter().filter(|r| {
            r.is_exit_node()
                && r.has_group(&group_id)
                && r.peer.as_deref() != Some(exit_peer_id.as_str())
        }) {
            let name = peer_display_name(route.peer.as_deref().unwrap_or_default(), &peers);
            info!("detaching from exit node '{}'", name);

            let mut update = RouteUpdate::from_route(route);
            // The route stays enabled; it still serves other peers.
            update.groups.retain(|g| g != &group_id);

            let verdict = prober.apply(&route.id, update).await?;
            detached.push(Detachment {
                exit_node: name,
                disruption: verdict.disruption,
            });
        }

        // Attach phase.
        info!("activating exit node '{}'", exit_node);
        let mut update = RouteUpdate::from_route(target);
        update.groups.push(group_id.clone());
        update.enabled = true;

        let attach_confirmed = match self
            .client
            .update_route(&target.id, &update, self.config.attach_timeout)
            .await
        {
            Ok(_) => true,
            // The timeout itself is evidence the path changed mid-request;
            // the update almost certainly landed.
            Err(ApiError::Timeout(_)) => {
                warn!("attach timed out; presuming the route change succeeded");
                false
            }
            Err(err) => return Err(err.into()),
        };

        Ok(SwitchOutcome {
            status: SwitchStatus::Switched,
            exit_node,
            detached,
            attach_confirmed,
        })
    }

    /// Strip the peer's distribution group from every exit-node route.
    ///
    /// No prober here: with no subsequent attach to reconcile against, a
    /// timeout is a plain failure.
    pub async fn remove(&self, peer_name: &str) -> Result<RemoveOutcome, SwitchError> {
        let group_name = membership::distribution_group_name(peer_name);
        let groups = self.client.list_groups().await?;
        let Some(group) = groups.into_iter().find(|g| g.name == group_name) else {
            info!("no distribution group '{}', nothing to remove", group_name);
            return Ok(RemoveOutcome::NotUsingExitNode);
        };

        let peers = self.client.list_peers().await?;
        let routes = self.client.list_routes().await?;

        let mut removed = Vec::new();
        for route in routes
            .iter()
            .filter(|r| r.is_exit_node() && r.has_group(&group.id))
        {
            let mut update = RouteUpdate::from_route(route);
            update.groups.retain(|g| g != &group.id);

            self.client
                .update_route(&route.id, &update, self.config.remove_timeout)
                .await?;

            let name = peer_display_name(route.peer.as_deref().unwrap_or_default(), &peers);
            info!("removed '{}' from exit node '{}'", peer_name, name);
            removed.push(name);
        }

        Ok(RemoveOutcome::Removed {
            exit_nodes: removed,
        })
    }

    /// The unique enabled exit-node route carrying the peer's group, if
    /// any. Never creates the distribution group.
    pub async fn current_exit_node(
        &self,
        peer_name: &str,
    ) -> Result<Option<CurrentExitNode>, SwitchError> {
        let group_name = membership::distribution_group_name(peer_name);
        let groups = self.client.list_groups().await?;
        let Some(group) = groups.into_iter().find(|g| g.name == group_name) else {
            return Ok(None);
        };

        let routes = self.client.list_routes().await?;
        let Some(peer_id) = catalog::current_exit_node(&group.id, &routes).map(str::to_string)
        else {
            return Ok(None);
        };

        let peers = self.client.list_peers().await?;
        Ok(Some(CurrentExitNode {
            name: peer_display_name(&peer_id, &peers),
            peer_id,
        }))
    }

    /// All exit nodes known to the control plane.
    pub async fn list_exit_nodes(&self) -> Result<Vec<ExitNode>, SwitchError> {
        let routes = self.client.list_routes().await?;
        let peers = self.client.list_peers().await?;

        Ok(catalog::exit_nodes(&routes)
            .into_iter()
            .map(|summary| {
                let name = peer_display_name(&summary.peer_id, &peers);
                ExitNode::from_summary(summary, name)
            })
            .collect())
    }

    /// Distribution-group status, assignments and available exit nodes for
    /// one peer.
    pub async fn peer_info(&self, peer_name: &str) -> Result<PeerInfo, SwitchError> {
        let group_name = membership::distribution_group_name(peer_name);
        let groups = self.client.list_groups().await?;
        let peers = self.client.list_peers().await?;
        let routes = self.client.list_routes().await?;

        let group_id = groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.id.clone());

        let assignments = match &group_id {
            Some(id) => catalog::assignments(id, &routes)
                .into_iter()
                .map(|assignment| ResolvedAssignment {
                    exit_node: peer_display_name(&assignment.peer_id, &peers),
                    assignment,
                })
                .collect(),
            None => Vec::new(),
        };

        let group_summaries = groups
            .iter()
            .map(|g| GroupSummary {
                id: g.id.clone(),
                name: g.name.clone(),
                peer_count: g.peers.len(),
            })
            .collect();

        let exit_nodes = catalog::exit_nodes(&routes)
            .into_iter()
            .map(|summary| {
                let name = peer_display_name(&summary.peer_id, &peers);
                ExitNode::from_summary(summary, name)
            })
            .collect();

        Ok(PeerInfo {
            peer_name: peer_name.to_string(),
            group_name,
            group_id,
            assignments,
            groups: group_summaries,
            exit_nodes,
        })
    }

    /// Non-exit routes visible to a peer.
    pub async fn peer_routes(&self, peer_name: &str) -> Result<PeerRoutes, SwitchError> {
        let peers = self.client.list_peers().await?;
        let peer = membership::find_peer(&peers, peer_name)
            .cloned()
            .ok_or_else(|| SwitchError::PeerNotFound(peer_name.to_string()))?;

        let routes = self.client.list_routes().await?;
        let visible = catalog::routes_for_peer(&peer.id, &routes)
            .into_iter()
            .cloned()
            .collect();

        Ok(PeerRoutes {
            peer,
            routes: visible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::prober::Disruption;
    use crate::testing::{
        FakeControlPlane, RouteFailure, exit_route, exit_route_with_groups, group, peer,
    };

    fn mesh_peers() -> Vec<meshexit_api::Peer> {
        vec![
            peer("p-laptop", "laptop"),
            peer("p-gwa", "gateway-a"),
            peer("p-gwb", "gateway-b"),
        ]
    }

    /// A laptop currently routed through gateway-b, switching to
    /// gateway-a.
    fn scenario() -> Arc<FakeControlPlane> {
        Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![
                    exit_route("r1", "p-gwa", true),
                    exit_route_with_groups("r2", "p-gwb", true, &["g1"]),
                ]),
        )
    }

    fn switcher(fake: &Arc<FakeControlPlane>) -> ExitNodeSwitcher<FakeControlPlane> {
        ExitNodeSwitcher::shared(Arc::clone(fake), SwitchConfig::default())
    }

    #[tokio::test]
    async fn test_switch_scenario() {
        let fake = scenario();

        let outcome = switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        assert_eq!(outcome.status, SwitchStatus::Switched);
        assert_eq!(outcome.exit_node, "gateway-a");
        assert!(outcome.attach_confirmed);
        assert_eq!(outcome.detached.len(), 1);
        assert_eq!(outcome.detached[0].exit_node, "gateway-b");
        assert!(outcome.detached[0].disruption.is_none());

        let routes = fake.routes.lock().unwrap().clone();
        let r1 = routes.iter().find(|r| r.id == "r1").unwrap();
        let r2 = routes.iter().find(|r| r.id == "r2").unwrap();
        assert!(r1.enabled && r1.has_group("g1"));
        assert!(r2.enabled && !r2.has_group("g1"));

        let current = switcher(&fake)
            .current_exit_node("laptop")
            .await
            .unwrap()
            .expect("exit node set");
        assert_eq!(current.name, "gateway-a");
    }

    #[tokio::test]
    async fn test_switch_is_idempotent() {
        let fake = scenario();
        let switcher = switcher(&fake);

        switcher.switch("laptop", "gateway-a").await.unwrap();
        let mutations_after_first = fake.route_update_count();

        let second = switcher.switch("laptop", "gateway-a").await.unwrap();

        assert_eq!(second.status, SwitchStatus::AlreadyActive);
        assert!(second.detached.is_empty());
        assert_eq!(fake.route_update_count(), mutations_after_first);
    }

    #[tokio::test]
    async fn test_switch_maintains_exclusivity() {
        let fake = scenario();

        switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        let routes = fake.routes.lock().unwrap().clone();
        let carrying: Vec<&str> = routes
            .iter()
            .filter(|r| r.is_exit_node() && r.enabled && r.has_group("g1"))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(carrying, vec!["r1"]);
    }

    #[tokio::test]
    async fn test_detach_preserves_sibling_route_state() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![
                    exit_route("r1", "p-gwa", true),
                    exit_route_with_groups("r2", "p-gwb", true, &["g1", "g-other"]),
                ]),
        );

        switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        let routes = fake.routes.lock().unwrap().clone();
        let r2 = routes.iter().find(|r| r.id == "r2").unwrap();
        assert!(r2.enabled);
        assert!(r2.has_group("g-other"));
        assert!(!r2.has_group("g1"));
    }

    #[tokio::test]
    async fn test_updates_carry_all_route_fields() {
        let mut old_route = exit_route_with_groups("r2", "p-gwb", true, &["g1"]);
        old_route.description = "berlin exit".to_string();
        old_route.metric = 77;
        old_route.masquerade = false;
        old_route.network_id = Some("exit-b".to_string());
        old_route.domains = vec!["internal.example".to_string()];

        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![exit_route("r1", "p-gwa", false), old_route]),
        );

        switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        let updates = fake.route_updates.lock().unwrap().clone();
        let (_, detach) = updates.iter().find(|(id, _)| id == "r2").unwrap();
        assert_eq!(detach.description, "berlin exit");
        assert_eq!(detach.metric, 77);
        assert!(!detach.masquerade);
        assert_eq!(detach.network_id.as_deref(), Some("exit-b"));
        assert_eq!(detach.domains, vec!["internal.example"]);
        assert!(detach.enabled, "detach must not disable the route");

        let (_, attach) = updates.iter().find(|(id, _)| id == "r1").unwrap();
        assert!(attach.enabled, "attach must force-enable the target");
        assert_eq!(attach.groups, vec!["g1"]);
        assert_eq!(attach.network, "0.0.0.0/0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disrupted_detach_still_attaches() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![
                    exit_route("r1", "p-gwa", true),
                    exit_route_with_groups("r2", "p-gwb", true, &["g1"]),
                ])
                .with_route_failure("r2", RouteFailure::Hang),
        );

        let outcome = switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        assert_eq!(outcome.status, SwitchStatus::Switched);
        assert_eq!(
            outcome.detached[0].disruption,
            Some(Disruption::Reconnected)
        );

        // The attach ran despite the unconfirmable detach.
        let routes = fake.routes.lock().unwrap().clone();
        let r1 = routes.iter().find(|r| r.id == "r1").unwrap();
        assert!(r1.has_group("g1"));
    }

    #[tokio::test]
    async fn test_attach_timeout_is_presumed_success() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![exit_route("r1", "p-gwa", true)])
                .with_route_failure("r1", RouteFailure::Timeout),
        );

        let outcome = switcher(&fake).switch("laptop", "gateway-a").await.unwrap();

        assert_eq!(outcome.status, SwitchStatus::Switched);
        assert!(!outcome.attach_confirmed);
    }

    #[tokio::test]
    async fn test_genuine_detach_error_aborts_before_attach() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![
                    exit_route("r1", "p-gwa", true),
                    exit_route_with_groups("r2", "p-gwb", true, &["g1"]),
                ])
                .with_route_failure("r2", RouteFailure::Validation),
        );

        let err = switcher(&fake)
            .switch("laptop", "gateway-a")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationRejected);
        let routes = fake.routes.lock().unwrap().clone();
        let r1 = routes.iter().find(|r| r.id == "r1").unwrap();
        assert!(!r1.has_group("g1"), "attach must not run after a failed detach");
    }

    #[tokio::test]
    async fn test_switch_unknown_exit_node() {
        let fake = scenario();

        let err = switcher(&fake)
            .switch("laptop", "gateway-zz")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PeerNotFound);
    }

    #[tokio::test]
    async fn test_switch_peer_without_route() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![exit_route("r2", "p-gwb", true)]),
        );

        let err = switcher(&fake)
            .switch("laptop", "gateway-a")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RouteNotFound);
    }

    #[tokio::test]
    async fn test_remove_without_group_is_noop() {
        let fake = Arc::new(FakeControlPlane::new().with_peers(mesh_peers()));

        let outcome = switcher(&fake).remove("laptop").await.unwrap();

        assert_eq!(outcome, RemoveOutcome::NotUsingExitNode);
        assert_eq!(fake.route_update_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_strips_group_everywhere() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![
                    exit_route_with_groups("r1", "p-gwa", true, &["g1"]),
                    exit_route_with_groups("r2", "p-gwb", false, &["g1", "g-other"]),
                ]),
        );

        let outcome = switcher(&fake).remove("laptop").await.unwrap();

        match outcome {
            RemoveOutcome::Removed { exit_nodes } => {
                assert_eq!(exit_nodes, vec!["gateway-a", "gateway-b"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let routes = fake.routes.lock().unwrap().clone();
        for route in &routes {
            assert!(!route.has_group("g1"));
        }
        // Enablement is preserved either way.
        assert!(routes.iter().find(|r| r.id == "r1").unwrap().enabled);
        assert!(!routes.iter().find(|r| r.id == "r2").unwrap().enabled);
        assert!(routes.iter().find(|r| r.id == "r2").unwrap().has_group("g-other"));
    }

    #[tokio::test]
    async fn test_remove_with_unassigned_group() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_groups(vec![group("g1", "peer-laptop", &["p-laptop"])])
                .with_routes(vec![exit_route("r1", "p-gwa", true)]),
        );

        let outcome = switcher(&fake).remove("laptop").await.unwrap();

        assert_eq!(
            outcome,
            RemoveOutcome::Removed {
                exit_nodes: Vec::new()
            }
        );
        assert_eq!(fake.route_update_count(), 0);
    }

    #[tokio::test]
    async fn test_current_exit_node_without_group() {
        let fake = Arc::new(FakeControlPlane::new().with_peers(mesh_peers()));

        let current = switcher(&fake).current_exit_node("laptop").await.unwrap();
        assert!(current.is_none());
    }

    #[tokio::test]
    async fn test_list_exit_nodes_resolves_names() {
        let fake = scenario();

        let nodes = switcher(&fake).list_exit_nodes().await.unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "gateway-a");
        assert!(nodes[0].is_active());
        assert_eq!(nodes[1].name, "gateway-b");
    }

    #[tokio::test]
    async fn test_peer_info_reports_assignments() {
        let fake = scenario();

        let info = switcher(&fake).peer_info("laptop").await.unwrap();

        assert_eq!(info.group_name, "peer-laptop");
        assert_eq!(info.group_id.as_deref(), Some("g1"));
        assert_eq!(info.assignments.len(), 1);
        assert_eq!(info.assignments[0].exit_node, "gateway-b");
        assert!(info.assignments[0].assignment.enabled);
        assert_eq!(info.groups.len(), 1);
        assert_eq!(info.exit_nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_peer_info_without_group() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_peers(mesh_peers())
                .with_routes(vec![exit_route("r1", "p-gwa", true)]),
        );

        let info = switcher(&fake).peer_info("laptop").await.unwrap();

        assert!(info.group_id.is_none());
        assert!(info.assignments.is_empty());
        assert_eq!(info.exit_nodes.len(), 1);
    }
}
