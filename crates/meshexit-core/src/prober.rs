//! Disruption-tolerant route detaches.
//!
//! Removing a peer's own exit-node route can sever the network path the
//! HTTP call itself is riding on: the call hangs or fails even though the
//! server-side mutation succeeded or is in flight. The prober runs the
//! mutation on its own task so the caller owns a wall-clock deadline, and
//! falls back to an independent reachability probe when the call cannot be
//! confirmed.
//!
//! The verdict is a documented approximation: any probe response (an auth
//! error included) and even a failed probe mark the detach as committed,
//! because the typical cause of the hang is the expected self-disruption.
//! That trades certainty for liveness; outcomes carry the disruption
//! annotation so nothing downstream mistakes "presumed" for "confirmed".

use crate::error::SwitchError;
use meshexit_api::{ControlPlane, RouteUpdate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prober timings.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Per-call timeout handed to the route update itself.
    pub call_timeout: Duration,
    /// Wall-clock deadline after which the worker is abandoned.
    pub deadline: Duration,
    /// Settle time before probing, giving the data plane a moment to
    /// converge on the new path.
    pub grace: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(15),
            grace: Duration::from_secs(2),
        }
    }
}

/// Why a detach was presumed rather than confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disruption {
    /// The probe got an answer: the path is back up.
    Reconnected,
    /// The probe failed too; the network is still settling.
    NetworkChanged,
}

impl std::fmt::Display for Disruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disruption::Reconnected => write!(f, "network reconnected"),
            Disruption::NetworkChanged => write!(f, "network change detected"),
        }
    }
}

/// Outcome of one probed detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachVerdict {
    pub committed: bool,
    /// `None` when the update completed normally.
    pub disruption: Option<Disruption>,
}

/// Runs route updates that may cut the caller's own connectivity.
pub struct ConnectivityProber<C> {
    client: Arc<C>,
    config: ProberConfig,
}

impl<C: ControlPlane + 'static> ConnectivityProber<C> {
    pub fn new(client: Arc<C>, config: ProberConfig) -> Self {
        Self { client, config }
    }

    /// Apply a route update, tolerating self-inflicted disruption.
    ///
    /// The update runs on a separate task; the caller waits for whichever
    /// comes first, the result or the deadline. Once the deadline passes
    /// the worker is left to finish on its own and its result is
    /// discarded.
    ///
    /// Only connection-level failures (timeout, unreachable) take the
    /// probe path; any other error aborts and propagates.
    pub async fn apply(
        &self,
        route_id: &str,
        update: RouteUpdate,
    ) -> Result<DetachVerdict, SwitchError> {
        let client = Arc::clone(&self.client);
        let id = route_id.to_string();
        let call_timeout = self.config.call_timeout;

        let worker =
            tokio::spawn(async move { client.update_route(&id, &update, call_timeout).await });

        match tokio::time::timeout(self.config.deadline, worker).await {
            Ok(Ok(Ok(_route))) => {
                debug!("detach on route {} confirmed", route_id);
                Ok(DetachVerdict {
                    committed: true,
                    disruption: None,
                })
            }
            Ok(Ok(Err(err))) if err.is_disruption_candidate() => {
                info!("detach on route {} hit '{}', probing", route_id, err);
                Ok(self.presume_after_probe().await)
            }
            Ok(Ok(Err(err))) => Err(err.into()),
            Ok(Err(join_err)) => Err(SwitchError::Worker(join_err.to_string())),
            Err(_) => {
                // Worker still running; dropping the handle detaches it.
                warn!(
                    "detach on route {} exceeded {:?} deadline, probing",
                    route_id, self.config.deadline
                );
                Ok(self.presume_after_probe().await)
            }
        }
    }

    async fn presume_after_probe(&self) -> DetachVerdict {
        tokio::time::sleep(self.config.grace).await;

        let disruption = match self.client.probe().await {
            Ok(()) => Disruption::Reconnected,
            Err(_) => Disruption::NetworkChanged,
        };
        info!("detach presumed committed ({})", disruption);

        DetachVerdict {
            committed: true,
            disruption: Some(disruption),
        }
    }
}
