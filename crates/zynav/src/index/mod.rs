//
// index/mod.rs
//
// Persistent symbol index: discovery, snapshots, refresh, and change watching
//

pub mod files;
pub mod service;
pub mod store;
pub mod watcher;

pub use files::FileStamp;
pub use service::{
    IndexService, IndexServiceState, RefreshOutcome, ServiceStatus, SymbolLocation,
};
pub use store::{BuildSummary, DirIndex, FileEntry, IndexKey, IndexStore, IndexSummary};
pub use watcher::{ChangeWatcher, Debouncer, EventFilter};
