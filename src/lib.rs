//! treegate -- metadata front end for a hierarchical object namespace.
//!
//! Requests name entries by path (`/<login>/stor/...`).  The gateway
//! resolves the entry and parent metadata, checks the operation's
//! preconditions, and reads or writes records in a metadata store.
//! Object content itself lives on storage nodes chosen by a placement
//! service.

use std::sync::Arc;

pub mod builder;
pub mod config;
pub mod context;
pub mod errors;
pub mod guards;
pub mod handlers;
pub mod headers;
pub mod identity;
pub mod listing;
pub mod metadata;
pub mod metrics;
pub mod path;
pub mod placement;
pub mod resolve;
pub mod roles;
pub mod server;

use crate::config::Config;
use crate::identity::IdentityService;
use crate::metadata::store::MetadataStore;
use crate::placement::PlacementService;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Metadata store holding namespace records.
    pub metadata: Arc<dyn MetadataStore>,
    /// Accounts, sub-users and roles.
    pub identity: Arc<dyn IdentityService>,
    /// Storage node selection for object content.
    pub placement: Arc<dyn PlacementService>,
}
