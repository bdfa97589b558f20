//! Persistence for analysis history and user preferences.
//!
//! Both collections are stored as whole JSON blobs behind the [`BlobStore`]
//! port. Every mutation reads the current blob, applies its change and writes
//! the full blob back, so concurrent writers resolve as last-writer-wins.

mod blob;
mod history;
mod preferences;
mod snapshot;
mod sqlite;

pub use blob::{BlobStore, JsonDirBlobStore, MemoryBlobStore};
pub use history::{AppendOutcome, FeedbackOutcome, HistoryStore, ImportSummary};
pub use preferences::PreferencesStore;
pub use snapshot::{
    export_history, read_history_snapshot, ExportFileDigest, ExportManifest,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use sqlite::{SchemaStatus, SqliteBlobStore};

pub const HISTORY_KEY: &str = "failsense-history";
pub const PREFERENCES_KEY: &str = "failsense-preferences";
