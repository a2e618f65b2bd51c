//! SQLite storage implementation

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::Serialize;

use super::schema;
use crate::extract::ClassifiedImport;
use crate::symbol::{DepKind, Symbol, SymbolDependency, SymbolKind};
use crate::{Error, Result, WriteContext};

/// Language tag stored on every file row
pub const LANGUAGE: &str = "go";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage for the repository index
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Start a full rebuild.
    ///
    /// The transaction takes the write lock immediately, so a second writer
    /// waits (up to the busy timeout) instead of interleaving. Dropping the
    /// writer without [`IndexWriter::commit`] rolls everything back.
    pub fn begin_rebuild(&mut self) -> Result<IndexWriter<'_>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(IndexWriter { tx })
    }

    // ========== Read Operations ==========

    /// Row counts of every index table
    pub fn stats(&self) -> Result<IndexStats> {
        query_stats(&self.conn)
    }

    /// The last committed sync, if any
    pub fn sync_state(&self) -> Result<Option<SyncState>> {
        query_sync_state(&self.conn)
    }

    /// `relative path -> content hash` for every indexed file
    pub fn file_hashes(&self) -> Result<HashMap<String, String>> {
        query_file_hashes(&self.conn)
    }

    /// All packages ordered by path
    pub fn list_packages(&self) -> Result<Vec<PackageRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, name, import_path, file_count, line_count FROM packages ORDER BY path",
        )?;
        let packages = stmt
            .query_map([], |row| {
                Ok(PackageRow {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    name: row.get(2)?,
                    import_path: row.get(3)?,
                    file_count: row.get::<_, i64>(4)? as usize,
                    line_count: row.get::<_, i64>(5)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    /// Find symbols by name
    pub fn find_symbols_by_name(&self, name: &str) -> Result<Vec<StoredSymbol>> {
        self.query_symbols("WHERE s.name = ?1 ORDER BY f.path, s.line_start", name)
    }

    /// Find all symbols in a file
    pub fn symbols_in_file(&self, path: &str) -> Result<Vec<StoredSymbol>> {
        self.query_symbols("WHERE f.path = ?1 ORDER BY s.line_start", path)
    }

    fn query_symbols(&self, filter: &str, arg: &str) -> Result<Vec<StoredSymbol>> {
        let sql = format!(
            "SELECT s.id, f.path, s.kind, s.name, s.signature, s.body, s.line_start, s.line_end, s.exported, s.receiver
             FROM symbols s JOIN files f ON f.id = s.file_id {filter}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let symbols = stmt
            .query_map([arg], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    /// Dependencies recorded for a symbol, sorted
    pub fn deps_of_symbol(&self, symbol_id: i64) -> Result<Vec<SymbolDependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT dep_name, dep_package, dep_kind FROM symbol_deps WHERE symbol_id = ?1
             ORDER BY dep_name, dep_package, dep_kind",
        )?;
        let deps = stmt
            .query_map([symbol_id], |row| {
                let kind: String = row.get(2)?;
                let kind: DepKind = kind.parse().map_err(|e: Error| {
                    rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
                })?;
                Ok(SymbolDependency::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, kind))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// Imports of one file, in path order
    pub fn imports_of_file(&self, path: &str) -> Result<Vec<ImportRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.to_path, i.to_package_id, i.alias, i.import_type
             FROM imports i JOIN files f ON f.id = i.from_file_id
             WHERE f.path = ?1 ORDER BY i.to_path",
        )?;
        let imports = stmt
            .query_map([path], |row| {
                Ok(ImportRow {
                    to_path: row.get(0)?,
                    to_package_id: row.get(1)?,
                    alias: row.get(2)?,
                    import_type: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(imports)
    }
}

/// Write side of a rebuild. All statements run inside one IMMEDIATE
/// transaction; nothing is visible to other connections until `commit`.
pub struct IndexWriter<'a> {
    tx: Transaction<'a>,
}

impl IndexWriter<'_> {
    /// Capture what the index looks like before it is cleared.
    pub fn snapshot(&self) -> Result<IndexSnapshot> {
        let stats = query_stats(&self.tx)?;
        Ok(IndexSnapshot {
            files: query_file_hashes(&self.tx)?,
            symbols: stats.symbols,
            packages: stats.packages,
            previous_sync: query_sync_state(&self.tx)?,
        })
    }

    /// Delete every row of every index table. `sync_state` is kept.
    pub fn clear(&self) -> Result<()> {
        for table in schema::INDEX_TABLES {
            self.tx
                .execute(&format!("DELETE FROM {table}"), [])
                .statement("clear index")?;
        }
        Ok(())
    }

    pub fn insert_package(&self, path: &str, name: &str, import_path: &str, now: &str) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO packages (path, name, import_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )
            .and_then(|mut stmt| stmt.execute(params![path, name, import_path, now]))
            .statement("insert package")?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn insert_file(&self, package_id: i64, path: &str, lines: usize, hash: &str, now: &str) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO files (package_id, path, language, lines, hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            )
            .and_then(|mut stmt| stmt.execute(params![package_id, path, LANGUAGE, lines as i64, hash, now]))
            .statement("insert file")?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn insert_import(&self, file_id: i64, import: &ClassifiedImport, to_package_id: Option<i64>) -> Result<()> {
        self.tx
            .prepare_cached(
                "INSERT INTO imports (from_file_id, to_path, to_package_id, alias, import_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    file_id,
                    import.spec.path,
                    to_package_id,
                    import.spec.alias,
                    import.import_type.as_str(),
                ])
            })
            .statement("insert import")?;
        Ok(())
    }

    /// Insert a symbol and return its assigned id.
    pub fn insert_symbol(&self, file_id: i64, symbol: &Symbol) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO symbols (file_id, kind, name, signature, body, line_start, line_end, exported, receiver)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    file_id,
                    symbol.kind.as_str(),
                    symbol.name,
                    symbol.signature,
                    symbol.body,
                    symbol.line_start,
                    symbol.line_end,
                    symbol.exported,
                    symbol.receiver,
                ])
            })
            .statement("insert symbol")?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn insert_dependency(&self, symbol_id: i64, dep: &SymbolDependency) -> Result<()> {
        self.tx
            .prepare_cached(
                "INSERT INTO symbol_deps (symbol_id, dep_name, dep_package, dep_kind)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .and_then(|mut stmt| stmt.execute(params![symbol_id, dep.name, dep.package, dep.kind.as_str()]))
            .statement("insert symbol dependency")?;
        Ok(())
    }

    /// Recompute `file_count` and `line_count` of every package from its files.
    pub fn update_package_counts(&self, now: &str) -> Result<()> {
        self.tx
            .execute(
                "UPDATE packages SET
                    file_count = (SELECT COUNT(*) FROM files WHERE files.package_id = packages.id),
                    line_count = (SELECT COALESCE(SUM(lines), 0) FROM files WHERE files.package_id = packages.id),
                    updated_at = ?1",
                [now],
            )
            .statement("update package counts")?;
        Ok(())
    }

    pub fn write_sync_state(&self, state: &SyncState) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO sync_state (id, last_sync_at, last_sync_revision, last_sync_dirty, indexed_file_count, index_fingerprint)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    last_sync_at = excluded.last_sync_at,
                    last_sync_revision = excluded.last_sync_revision,
                    last_sync_dirty = excluded.last_sync_dirty,
                    indexed_file_count = excluded.indexed_file_count,
                    index_fingerprint = excluded.index_fingerprint",
                params![
                    state.synced_at.to_rfc3339(),
                    state.revision,
                    state.dirty,
                    state.indexed_files as i64,
                    state.fingerprint,
                ],
            )
            .statement("write sync state")?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().statement("commit")
    }
}

fn count(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count as usize)
}

fn query_stats(conn: &Connection) -> Result<IndexStats> {
    Ok(IndexStats {
        packages: count(conn, "packages")?,
        files: count(conn, "files")?,
        symbols: count(conn, "symbols")?,
        imports: count(conn, "imports")?,
        symbol_deps: count(conn, "symbol_deps")?,
    })
}

fn query_file_hashes(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT path, hash FROM files")?;
    let hashes = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<String, String>>>()?;
    Ok(hashes)
}

fn query_sync_state(conn: &Connection) -> Result<Option<SyncState>> {
    let state = conn
        .query_row(
            "SELECT last_sync_at, last_sync_revision, last_sync_dirty, indexed_file_count, index_fingerprint
             FROM sync_state WHERE id = 1",
            [],
            |row| {
                let synced_at: String = row.get(0)?;
                let synced_at = DateTime::parse_from_rfc3339(&synced_at)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                    })?;
                Ok(SyncState {
                    synced_at,
                    revision: row.get(1)?,
                    dirty: row.get(2)?,
                    indexed_files: row.get::<_, i64>(3)? as usize,
                    fingerprint: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

/// Helper to convert a joined symbols/files row to a StoredSymbol
fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<StoredSymbol> {
    let kind_str: String = row.get(2)?;
    let kind: SymbolKind = kind_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredSymbol {
        id: row.get(0)?,
        file_path: row.get(1)?,
        kind,
        name: row.get(3)?,
        signature: row.get(4)?,
        body: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        exported: row.get(8)?,
        receiver: row.get(9)?,
    })
}

/// Persisted outcome of the last successful sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub synced_at: DateTime<Utc>,
    pub revision: String,
    pub dirty: bool,
    pub indexed_files: usize,
    pub fingerprint: String,
}

/// Index contents captured at the start of a rebuild, used for diffing
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub files: HashMap<String, String>,
    pub symbols: usize,
    pub packages: usize,
    pub previous_sync: Option<SyncState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub import_path: String,
    pub file_count: usize,
    pub line_count: usize,
}

#[derive(Debug, Clone)]
pub struct StoredSymbol {
    pub id: i64,
    pub file_path: String,
    pub kind: SymbolKind,
    pub name: String,
    pub signature: String,
    pub body: String,
    pub line_start: u32,
    pub line_end: u32,
    pub exported: bool,
    pub receiver: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub to_path: String,
    pub to_package_id: Option<i64>,
    pub alias: String,
    pub import_type: String,
}

/// Database statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub packages: usize,
    pub files: usize,
    pub symbols: usize,
    pub imports: usize,
    pub symbol_deps: usize,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Index Statistics:")?;
        writeln!(f, "  Packages: {}", self.packages)?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.symbols)?;
        writeln!(f, "  Imports: {}", self.imports)?;
        write!(f, "  Dependencies: {}", self.symbol_deps)
    }
}
