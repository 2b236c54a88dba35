//! Distribution-group membership.
//!
//! Every managed peer gets a dedicated group named `peer-<hostname>` whose
//! only purpose is to tag the peer's traffic for route selection. The group
//! is created lazily on first switch and never deleted here. Member updates
//! are append-only: other peers someone placed in the group are left alone.

use crate::error::SwitchError;
use meshexit_api::{ApiError, ControlPlane, Peer};
use tracing::{debug, info};

/// Deterministic group name for a peer.
pub fn distribution_group_name(peer_name: &str) -> String {
    format!("peer-{peer_name}")
}

/// Exact, case-sensitive lookup by hostname or display name. Duplicate
/// names are possible; the first match wins and is not disambiguated
/// further.
pub fn find_peer<'a>(peers: &'a [Peer], name: &str) -> Option<&'a Peer> {
    peers.iter().find(|p| p.matches_name(name))
}

/// Display name for a peer id, falling back to the raw id.
pub(crate) fn peer_display_name(peer_id: &str, peers: &[Peer]) -> String {
    peers
        .iter()
        .find(|p| p.id == peer_id)
        .map(|p| p.display_name().to_string())
        .unwrap_or_else(|| peer_id.to_string())
}

/// Resolve a peer by name and make sure its distribution group exists and
/// contains it. Returns the group id.
///
/// Idempotent: with an already-conformant group this performs lookups only.
pub async fn ensure_peer_membership<C: ControlPlane>(
    client: &C,
    peer_name: &str,
) -> Result<String, SwitchError> {
    let peers = client.list_peers().await?;
    let peer_id = find_peer(&peers, peer_name)
        .map(|p| p.id.clone())
        .ok_or_else(|| SwitchError::PeerNotFound(peer_name.to_string()))?;

    ensure_membership(client, peer_name, &peer_id).await
}

/// Same as [`ensure_peer_membership`], with the peer already resolved.
pub(crate) async fn ensure_membership<C: ControlPlane>(
    client: &C,
    peer_name: &str,
    peer_id: &str,
) -> Result<String, SwitchError> {
    let group_name = distribution_group_name(peer_name);
    let groups = client.list_groups().await?;

    match groups.into_iter().find(|g| g.name == group_name) {
        None => {
            info!("creating distribution group '{}'", group_name);
            let created = client
                .create_group(&group_name, &[peer_id.to_string()])
                .await
                .map_err(|e| wrap_group_error(e, &group_name))?;
            Ok(created.id)
        }
        Some(group) if group.contains_peer(peer_id) => {
            debug!("peer already a member of '{}'", group_name);
            Ok(group.id)
        }
        Some(group) => {
            let mut members = group.peer_ids();
            members.push(peer_id.to_string());
            info!(
                "adding peer '{}' to distribution group '{}'",
                peer_name, group_name
            );
            let updated = client
                .update_group(&group.id, &group_name, &members)
                .await
                .map_err(|e| wrap_group_error(e, &group_name))?;
            Ok(updated.id)
        }
    }
}

fn wrap_group_error(err: ApiError, group_name: &str) -> SwitchError {
    match err {
        ApiError::PermissionDenied => SwitchError::GroupPermission {
            group: group_name.to_string(),
            source: err,
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{FakeControlPlane, group, peer};

    #[test]
    fn test_group_name() {
        assert_eq!(distribution_group_name("laptop"), "peer-laptop");
    }

    #[test]
    fn test_find_peer_exact_first_match() {
        let peers = vec![
            peer("p1", "laptop"),
            peer("p2", "laptop"),
            peer("p3", "gateway-a"),
        ];

        assert_eq!(find_peer(&peers, "laptop").map(|p| p.id.as_str()), Some("p1"));
        assert!(find_peer(&peers, "Laptop").is_none());
        assert!(find_peer(&peers, "desktop").is_none());
    }

    #[tokio::test]
    async fn test_creates_group_when_absent() {
        let fake = FakeControlPlane::new().with_peers(vec![peer("p1", "laptop")]);

        let group_id = ensure_peer_membership(&fake, "laptop").await.unwrap();

        assert_eq!(group_id, "g-created-0");
        let creates = fake.group_creates.lock().unwrap().clone();
        assert_eq!(creates, vec![("peer-laptop".to_string(), vec!["p1".to_string()])]);
    }

    #[tokio::test]
    async fn test_appends_peer_preserving_other_members() {
        let fake = FakeControlPlane::new()
            .with_peers(vec![peer("p1", "laptop")])
            .with_groups(vec![group("g1", "peer-laptop", &["p9"])]);

        let group_id = ensure_peer_membership(&fake, "laptop").await.unwrap();

        assert_eq!(group_id, "g1");
        let updates = fake.group_updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].2, vec!["p9".to_string(), "p1".to_string()]);
    }

    #[tokio::test]
    async fn test_conformant_group_is_noop() {
        let fake = FakeControlPlane::new()
            .with_peers(vec![peer("p1", "laptop")])
            .with_groups(vec![group("g1", "peer-laptop", &["p1"])]);

        let group_id = ensure_peer_membership(&fake, "laptop").await.unwrap();

        assert_eq!(group_id, "g1");
        assert!(fake.group_creates.lock().unwrap().is_empty());
        assert!(fake.group_updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let fake = FakeControlPlane::new().with_peers(vec![peer("p1", "laptop")]);

        let err = ensure_peer_membership(&fake, "desktop").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PeerNotFound);
    }

    #[tokio::test]
    async fn test_permission_denied_carries_group_name() {
        let fake = FakeControlPlane::new()
            .with_peers(vec![peer("p1", "laptop")])
            .deny_group_writes();

        let err = ensure_peer_membership(&fake, "laptop").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        match err {
            SwitchError::GroupPermission { group, .. } => assert_eq!(group, "peer-laptop"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
