//! Error type for switch operations.

use meshexit_api::ApiError;
use thiserror::Error;

/// Failures surfaced by the switch core.
///
/// Resolution failures abort before any mutation. Mutation failures can
/// leave remote state partially updated; the control plane offers no
/// rollback primitive, so they are surfaced as-is.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("peer '{0}' not found in the mesh")]
    PeerNotFound(String),

    #[error("no exit-node route found for '{0}'")]
    RouteNotFound(String),

    /// Group creation/update was refused by the server. Never retried: a
    /// missing privilege does not fix itself.
    #[error("cannot create or update group '{group}': {source}")]
    GroupPermission {
        group: String,
        #[source]
        source: ApiError,
    },

    #[error("detach worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Machine-readable classification for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PeerNotFound,
    RouteNotFound,
    PermissionDenied,
    ValidationRejected,
    Unauthorized,
    Timeout,
    Unreachable,
    Other,
}

impl SwitchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchError::PeerNotFound(_) => ErrorKind::PeerNotFound,
            SwitchError::RouteNotFound(_) => ErrorKind::RouteNotFound,
            SwitchError::GroupPermission { .. } => ErrorKind::PermissionDenied,
            SwitchError::Worker(_) => ErrorKind::Other,
            SwitchError::Api(api) => match api {
                ApiError::PermissionDenied => ErrorKind::PermissionDenied,
                ApiError::Unauthorized => ErrorKind::Unauthorized,
                ApiError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
                ApiError::Timeout(_) => ErrorKind::Timeout,
                ApiError::Unreachable(_) => ErrorKind::Unreachable,
                ApiError::NotFound(_) => ErrorKind::RouteNotFound,
                _ => ErrorKind::Other,
            },
        }
    }
}
