//! Database schema definitions

/// SQL to create the packages table
pub const CREATE_PACKAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    import_path TEXT NOT NULL,
    file_count INTEGER NOT NULL DEFAULT 0,
    line_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the files table
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_id INTEGER NOT NULL REFERENCES packages(id),
    path TEXT NOT NULL UNIQUE,
    language TEXT NOT NULL,
    lines INTEGER NOT NULL,
    hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the symbols table
/// `(file_id, kind, name, receiver)` keeps methods apart from same-named functions
pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id),
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT NOT NULL,
    body TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    exported INTEGER NOT NULL,
    receiver TEXT NOT NULL DEFAULT '',
    UNIQUE(file_id, kind, name, receiver)
)
"#;

/// SQL to create the imports table
pub const CREATE_IMPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_file_id INTEGER NOT NULL REFERENCES files(id),
    to_path TEXT NOT NULL,
    to_package_id INTEGER REFERENCES packages(id),
    alias TEXT NOT NULL DEFAULT '',
    import_type TEXT NOT NULL,
    UNIQUE(from_file_id, to_path)
)
"#;

/// SQL to create the symbol_deps table
/// Only intra-module calls are stored here
pub const CREATE_SYMBOL_DEPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbol_deps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol_id INTEGER NOT NULL REFERENCES symbols(id),
    dep_name TEXT NOT NULL,
    dep_package TEXT NOT NULL,
    dep_kind TEXT NOT NULL
)
"#;

/// SQL to create the sync_state table (single row, id = 1)
pub const CREATE_SYNC_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_sync_at TEXT NOT NULL,
    last_sync_revision TEXT NOT NULL DEFAULT '',
    last_sync_dirty INTEGER NOT NULL DEFAULT 0,
    indexed_file_count INTEGER NOT NULL DEFAULT 0,
    index_fingerprint TEXT NOT NULL DEFAULT ''
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_files_package ON files(package_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind)",
    "CREATE INDEX IF NOT EXISTS idx_imports_to_package ON imports(to_package_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbol_deps_symbol ON symbol_deps(symbol_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbol_deps_target ON symbol_deps(dep_package, dep_name)",
];

/// Index tables in delete order (children first).
pub const INDEX_TABLES: &[&str] = &["symbol_deps", "symbols", "imports", "files", "packages"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PACKAGES_TABLE,
        CREATE_FILES_TABLE,
        CREATE_SYMBOLS_TABLE,
        CREATE_IMPORTS_TABLE,
        CREATE_SYMBOL_DEPS_TABLE,
        CREATE_SYNC_STATE_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
