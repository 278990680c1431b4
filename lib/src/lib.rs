//! Synchronization engine bridging a code-hosting Hub and a transactional,
//! Git-like versioned Store.
//!
//! Reads top to bottom in dependency order: [`entities`] are the value types
//! everything else is built from, [`snapshot`] collects them into one value
//! with set algebra and pruning, [`conversion`] maps a snapshot to and from a
//! Store tree, [`store`] is the trait contract the conversion and engine
//! layers run against, [`hub_client`]/[`hub_import`]/[`hub_export`] talk to
//! the Hub side, and [`engine`] orchestrates all of the above into ticks.

pub mod branch_view;
pub mod conversion;
pub mod engine;
pub mod entities;
pub mod hub_client;
pub mod hub_export;
pub mod hub_import;
pub mod prune;
pub mod snapshot;
pub mod store;

pub use branch_view::BranchView;
pub use engine::{EngineConfig, EngineError, RunPolicy, SyncEngine, SyncState};
pub use entities::{Commit, Event, PullRequest, PrState, Ref, Repo, Status, StatusState};
pub use hub_client::{HubClient, HubError, HubToken};
pub use snapshot::Snapshot;
