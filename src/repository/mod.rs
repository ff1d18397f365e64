mod checkpoint;
mod database;
mod git_store;
mod store;

pub use checkpoint::{Checkpoint, CheckpointBackend, CheckpointStore, JsonCheckpoint};
pub use database::Database;
pub use git_store::GitStore;
pub use store::ObjectStore;

// Re-export the schema version for callers who need it
pub const SCHEMA_VERSION: &str = "1";
