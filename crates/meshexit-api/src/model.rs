//! Typed records for control-plane objects.
//!
//! The API is tolerant about which fields it sends back: `groups` may be
//! missing or null, group members arrive either as bare id strings or as
//! embedded objects, and several route fields are optional. Defaults are
//! applied here so callers see one canonical shape.

use serde::{Deserialize, Serialize};

/// A network endpoint registered with the control plane.
///
/// Peers are read-only from this tool's point of view; they are fetched as
/// a snapshot per operation and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Server-assigned stable id.
    pub id: String,
    /// System hostname as reported by the peer.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Display name, may differ from the hostname.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the peer currently has a management session.
    #[serde(default)]
    pub connected: bool,
    /// Overlay IP, when assigned.
    #[serde(default)]
    pub ip: Option<String>,
}

impl Peer {
    /// Exact, case-sensitive match against either the hostname or the
    /// display name. Duplicate names across peers are possible; callers
    /// take the first match.
    pub fn matches_name(&self, name: &str) -> bool {
        self.hostname.as_deref() == Some(name) || self.name.as_deref() == Some(name)
    }

    /// Best name for display: hostname, then name, then the raw id.
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A group member as returned by the API: either a bare peer id or an
/// embedded peer object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupPeer {
    Id(String),
    Embedded(EmbeddedPeer),
}

/// Minimal embedded peer shape inside a group's member list. Extra fields
/// the server includes are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPeer {
    pub id: String,
}

impl GroupPeer {
    pub fn id(&self) -> &str {
        match self {
            GroupPeer::Id(id) => id,
            GroupPeer::Embedded(peer) => &peer.id,
        }
    }
}

/// A named set of peers. Membership is a set despite being transported as
/// a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub peers: Vec<GroupPeer>,
}

impl Group {
    /// Member peer ids, normalized from both member shapes.
    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn contains_peer(&self, peer_id: &str) -> bool {
        self.peers.iter().any(|p| p.id() == peer_id)
    }
}

fn default_metric() -> u32 {
    9999
}

fn default_masquerade() -> bool {
    true
}

/// A network route. Routes carrying a gateway `peer` are exit-node routes;
/// everything else is a plain prefix distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    /// Destination prefix in CIDR notation.
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    /// Gateway peer id. Present only on exit-node routes.
    #[serde(default)]
    pub peer: Option<String>,
    /// Peers the route is distributed to directly.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Groups whose members should traverse this route. May be missing or
    /// null on the wire; treated as empty.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default = "default_metric")]
    pub metric: u32,
    #[serde(default = "default_masquerade")]
    pub masquerade: bool,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Route {
    /// True when the route is bound to a gateway peer.
    pub fn is_exit_node(&self) -> bool {
        self.peer.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Group ids, with missing/null normalized to empty.
    pub fn groups(&self) -> &[String] {
        self.groups.as_deref().unwrap_or(&[])
    }

    pub fn has_group(&self, group_id: &str) -> bool {
        self.groups().iter().any(|g| g == group_id)
    }
}

/// Full replacement payload for `PUT /api/routes/{id}`.
///
/// The API has no partial patch: every field omitted from the payload is
/// cleared server-side. Build this from the fetched route and modify only
/// what the operation actually changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub network: String,
    pub description: String,
    pub enabled: bool,
    pub peer: String,
    pub groups: Vec<String>,
    pub metric: u32,
    pub masquerade: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    pub domains: Vec<String>,
}

impl RouteUpdate {
    /// Carry forward every field of an existing exit-node route.
    pub fn from_route(route: &Route) -> Self {
        Self {
            network: route.network.clone(),
            description: route.description.clone(),
            enabled: route.enabled,
            peer: route.peer.clone().unwrap_or_default(),
            groups: route.groups().to_vec(),
            metric: route.metric,
            masquerade: route.masquerade,
            network_id: route.network_id.clone(),
            domains: route.domains.clone(),
        }
    }
}
