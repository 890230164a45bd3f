//! persisted registries of sector lifecycle

pub mod indexer;
mod locks;
pub mod rebuild;
pub mod snapup;
pub mod state;
pub mod worker;

pub use indexer::{SectorIndexer, TypedIndexer};
pub use rebuild::RebuildInfoManager;
pub use snapup::SnapUpManager;
pub use state::StateManager;
pub use worker::WorkerManager;
