//! Trait definitions for the remote services.
//!
//! The runtime only talks to trakt and the show catalog through these traits,
//! so tests can swap in fakes.

use std::future::Future;

use episodic_core::models::{NewShow, OutboundFlagRecord, ShowStateMap};

/// A watched/collected tracking service (trakt).
pub trait TrackingService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Episodes the user has collected, keyed by show id.
    fn collected_shows(&self) -> impl Future<Output = Result<ShowStateMap, Self::Error>> + Send;

    /// Episodes the user has watched, keyed by show id.
    fn watched_shows(&self) -> impl Future<Output = Result<ShowStateMap, Self::Error>> + Send;

    /// Send one queued flag change.
    fn submit_flags(
        &self,
        record: &OutboundFlagRecord,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A source of show metadata and episode lists (TVDB).
pub trait ShowCatalog: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a show with all of its episodes. `Ok(None)` when the catalog
    /// does not know the id (any longer).
    fn fetch_show(
        &self,
        show_id: i64,
        language: &str,
    ) -> impl Future<Output = Result<Option<NewShow>, Self::Error>> + Send;
}
