//! In-memory control plane used by the core tests.

use async_trait::async_trait;
use meshexit_api::{ApiError, ControlPlane, Group, GroupPeer, Peer, Route, RouteUpdate};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Failure injected into `update_route` for a specific route id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFailure {
    /// Return a timeout without applying the update.
    Timeout,
    /// Return a connection failure without applying the update.
    Unreachable,
    /// Return a 422-class rejection.
    Validation,
    /// Never return; models a call stuck on a severed network path.
    Hang,
}

/// Records every mutation so tests can assert on exactly what was sent.
pub struct FakeControlPlane {
    pub peers: Mutex<Vec<Peer>>,
    pub groups: Mutex<Vec<Group>>,
    pub routes: Mutex<Vec<Route>>,
    /// (name, member ids) per create_group call.
    pub group_creates: Mutex<Vec<(String, Vec<String>)>>,
    /// (group id, name, member ids) per update_group call.
    pub group_updates: Mutex<Vec<(String, String, Vec<String>)>>,
    /// (route id, payload) per applied update_route call.
    pub route_updates: Mutex<Vec<(String, RouteUpdate)>>,
    created_groups: AtomicUsize,
    deny_group_writes: AtomicBool,
    probe_fails: AtomicBool,
    probe_count: AtomicUsize,
    route_failures: Mutex<HashMap<String, RouteFailure>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
            group_creates: Mutex::new(Vec::new()),
            group_updates: Mutex::new(Vec::new()),
            route_updates: Mutex::new(Vec::new()),
            created_groups: AtomicUsize::new(0),
            deny_group_writes: AtomicBool::new(false),
            probe_fails: AtomicBool::new(false),
            probe_count: AtomicUsize::new(0),
            route_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_peers(self, peers: Vec<Peer>) -> Self {
        *self.peers.lock().unwrap() = peers;
        self
    }

    pub fn with_groups(self, groups: Vec<Group>) -> Self {
        *self.groups.lock().unwrap() = groups;
        self
    }

    pub fn with_routes(self, routes: Vec<Route>) -> Self {
        *self.routes.lock().unwrap() = routes;
        self
    }

    pub fn with_route_failure(self, route_id: &str, failure: RouteFailure) -> Self {
        self.route_failures
            .lock()
            .unwrap()
            .insert(route_id.to_string(), failure);
        self
    }

    pub fn with_probe_failure(self) -> Self {
        self.probe_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn deny_group_writes(self) -> Self {
        self.deny_group_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn route_update_count(&self) -> usize {
        self.route_updates.lock().unwrap().len()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_peers(&self) -> Result<Vec<Peer>, ApiError> {
        Ok(self.peers.lock().unwrap().clone())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, ApiError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn list_routes(&self) -> Result<Vec<Route>, ApiError> {
        Ok(self.routes.lock().unwrap().clone())
    }

    async fn create_group(&self, name: &str, peer_ids: &[String]) -> Result<Group, ApiError> {
        if self.deny_group_writes.load(Ordering::SeqCst) {
            return Err(ApiError::PermissionDenied);
        }

        let id = format!("g-created-{}", self.created_groups.fetch_add(1, Ordering::SeqCst));
        let created = Group {
            id,
            name: name.to_string(),
            peers: peer_ids.iter().cloned().map(GroupPeer::Id).collect(),
        };
        self.group_creates
            .lock()
            .unwrap()
            .push((name.to_string(), peer_ids.to_vec()));
        self.groups.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_group(
        &self,
        group_id: &str,
        name: &str,
        peer_ids: &[String],
    ) -> Result<Group, ApiError> {
        if self.deny_group_writes.load(Ordering::SeqCst) {
            return Err(ApiError::PermissionDenied);
        }

        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| ApiError::NotFound(format!("group {group_id}")))?;
        group.name = name.to_string();
        group.peers = peer_ids.iter().cloned().map(GroupPeer::Id).collect();
        let updated = group.clone();
        drop(groups);

        self.group_updates.lock().unwrap().push((
            group_id.to_string(),
            name.to_string(),
            peer_ids.to_vec(),
        ));
        Ok(updated)
    }

    async fn update_route(
        &self,
        route_id: &str,
        update: &RouteUpdate,
        timeout: Duration,
    ) -> Result<Route, ApiError> {
        let failure = self.route_failures.lock().unwrap().get(route_id).copied();
        match failure {
            Some(RouteFailure::Timeout) => return Err(ApiError::Timeout(timeout)),
            Some(RouteFailure::Unreachable) => {
                return Err(ApiError::Unreachable("no route to host".to_string()));
            }
            Some(RouteFailure::Validation) => {
                return Err(ApiError::ValidationRejected {
                    status: 422,
                    detail: "group id does not exist".to_string(),
                });
            }
            Some(RouteFailure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(ApiError::Timeout(timeout));
            }
            None => {}
        }

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| r.id == route_id)
            .ok_or_else(|| ApiError::NotFound(format!("route {route_id}")))?;

        // Full replacement, like the real API.
        route.network = update.network.clone();
        route.description = update.description.clone();
        route.enabled = update.enabled;
        route.peer = Some(update.peer.clone());
        route.groups = Some(update.groups.clone());
        route.metric = update.metric;
        route.masquerade = update.masquerade;
        route.network_id = update.network_id.clone();
        route.domains = update.domains.clone();
        let applied = route.clone();
        drop(routes);

        self.route_updates
            .lock()
            .unwrap()
            .push((route_id.to_string(), update.clone()));
        Ok(applied)
    }

    async fn probe(&self) -> Result<(), ApiError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.probe_fails.load(Ordering::SeqCst) {
            Err(ApiError::Unreachable("network is unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn peer(id: &str, hostname: &str) -> Peer {
    Peer {
        id: id.to_string(),
        hostname: Some(hostname.to_string()),
        name: None,
        connected: true,
        ip: None,
    }
}

pub fn group(id: &str, name: &str, member_ids: &[&str]) -> Group {
    Group {
        id: id.to_string(),
        name: name.to_string(),
        peers: member_ids
            .iter()
            .map(|m| GroupPeer::Id(m.to_string()))
            .collect(),
    }
}

pub fn exit_route(id: &str, gateway_peer_id: &str, enabled: bool) -> Route {
    exit_route_with_groups(id, gateway_peer_id, enabled, &[])
}

pub fn exit_route_with_groups(
    id: &str,
    gateway_peer_id: &str,
    enabled: bool,
    groups: &[&str],
) -> Route {
    Route {
        id: id.to_string(),
        network: "0.0.0.0/0".to_string(),
        description: String::new(),
        enabled,
        peer: Some(gateway_peer_id.to_string()),
        peers: Vec::new(),
        groups: Some(groups.iter().map(|g| g.to_string()).collect()),
        metric: 9999,
        masquerade: true,
        network_id: None,
        domains: Vec::new(),
    }
}

pub fn plain_route(id: &str, network: &str) -> Route {
    Route {
        id: id.to_string(),
        network: network.to_string(),
        description: String::new(),
        enabled: true,
        peer: None,
        peers: Vec::new(),
        groups: None,
        metric: 9999,
        masquerade: true,
        network_id: None,
        domains: Vec::new(),
    }
}
