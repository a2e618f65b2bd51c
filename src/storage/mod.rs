//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - packages(path, name, import_path, file_count, line_count)
//! - files(package_id, path, language, lines, hash)
//! - symbols(file_id, kind, name, signature, body, line_start, line_end, exported, receiver)
//! - imports(from_file_id, to_path, to_package_id, alias, import_type)
//! - symbol_deps(symbol_id, dep_name, dep_package, dep_kind)
//! - sync_state(single row: last sync time, revision, dirty, file count, fingerprint)

pub mod schema;
pub mod sqlite;

pub use sqlite::{
    ImportRow, IndexSnapshot, IndexStats, IndexWriter, LANGUAGE, PackageRow, SqliteStore, StoredSymbol, SyncState,
};
