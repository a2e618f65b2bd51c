//! # Repograph - relational index of a Go repository
//!
//! Repograph turns a working tree into a queryable SQLite model:
//! - packages, files, declarations ("symbols") and imports
//! - intra-module call dependencies, resolved through import aliases
//! - a content fingerprint and VCS state to detect when the index is stale
//!
//! Every sync is a full rebuild committed in a single transaction: readers
//! see either the previous index or the new one, never a mix.

pub mod collect;
pub mod config;
pub mod extract;
pub mod filter;
pub mod fingerprint;
pub mod module;
pub mod staleness;
pub mod storage;
pub mod symbol;
pub mod sync;
pub mod vcs;

// Re-exports for convenient access
pub use collect::{SourceFile, collect_files};
pub use module::ModuleInfo;
pub use staleness::{Staleness, StaleReason, check_staleness};
pub use storage::SqliteStore;
pub use symbol::{DepKind, Symbol, SymbolDependency, SymbolKind};
pub use sync::{CancelFlag, Diff, SyncOptions, SyncResult, sync, sync_with};

use std::path::PathBuf;

/// Result type alias for Repograph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Repograph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no go.mod found in {start} or any parent directory")]
    ModuleNotFound { start: PathBuf },

    #[error("malformed manifest {manifest}: {reason}")]
    ModuleMalformed { manifest: PathBuf, reason: String },

    #[error("failed to collect {path}: {source}")]
    Collection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path} at line {line}: {message}")]
    Parse {
        path: String,
        line: u32,
        message: String,
    },

    #[error("write failed ({statement}): {source}")]
    Write {
        statement: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("sync cancelled")]
    Cancelled,

    #[error("worker error: {0}")]
    Worker(String),
}

/// Attaches the failing statement to a rusqlite error raised during a rebuild.
pub(crate) trait WriteContext<T> {
    fn statement(self, statement: &'static str) -> Result<T>;
}

impl<T> WriteContext<T> for rusqlite::Result<T> {
    fn statement(self, statement: &'static str) -> Result<T> {
        self.map_err(|source| Error::Write { statement, source })
    }
}
