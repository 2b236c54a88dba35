//! Control-plane API bindings for the mesh overlay.
//!
//! The control plane owns peers, groups and routes; this crate provides the
//! typed records for those objects, the [`ControlPlane`] contract the switch
//! core consumes, and an HTTP implementation of that contract over hyper
//! with rustls.
//!
//! All records are validated at this boundary: absent or null fields are
//! given their documented defaults so the rest of the workspace never deals
//! with raw untyped maps.

mod client;
mod model;

pub use client::{ApiError, ClientConfig, ControlPlane, ControlPlaneClient};
pub use model::{EmbeddedPeer, Group, GroupPeer, Peer, Route, RouteUpdate};
