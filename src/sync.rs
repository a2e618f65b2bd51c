//! Sync orchestration - one full, transactional rebuild of the index
//!
//! 1. Resolve the module and collect eligible files; fingerprint them.
//! 2. Probe git (failures only degrade the recorded state).
//! 3. Parse and extract every file. Workers may run in parallel; any parse
//!    error aborts here, before the store is touched.
//! 4. In one IMMEDIATE transaction: snapshot the old index, clear it, insert
//!    packages, files, imports, symbols and dependencies, aggregate package
//!    counts, write the sync state, diff against the snapshot, commit.
//!
//! Any error drops the transaction, leaving the previous index in place.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collect::{SourceFile, collect_files};
use crate::extract::{ExtractedFile, GoParser, extract_file};
use crate::fingerprint::tree_fingerprint;
use crate::module::ModuleInfo;
use crate::storage::{IndexSnapshot, IndexWriter, SqliteStore, SyncState};
use crate::{Error, Result, vcs};

/// Cooperative cancellation shared between the caller and a running sync.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Extra gitignore-style exclude patterns
    pub excludes: Vec<String>,
    pub cancel: CancelFlag,
    /// Parse worker threads; 1 parses on the calling thread's schedule
    pub workers: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            cancel: CancelFlag::new(),
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Outcome of a successful sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub indexed_files: usize,
    pub indexed_symbols: usize,
    pub indexed_packages: usize,
    pub fingerprint: String,
    pub revision: String,
    pub dirty: bool,
    pub synced_at: DateTime<Utc>,
    /// Absent when no index had been committed before this sync
    pub diff: Option<Diff>,
}

/// Change summary against the previously committed index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub files_added: usize,
    pub files_removed: usize,
    pub files_modified: usize,
    pub symbols_before: usize,
    pub symbols_after: usize,
    pub packages_before: usize,
    pub packages_after: usize,
}

impl Diff {
    fn compute(before: &IndexSnapshot, files: &[SourceFile], symbols_after: usize, packages_after: usize) -> Option<Self> {
        before.previous_sync.as_ref()?;

        let mut diff = Diff {
            symbols_before: before.symbols,
            symbols_after,
            packages_before: before.packages,
            packages_after,
            ..Default::default()
        };

        let current: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        for file in files {
            match before.files.get(&file.relative_path) {
                None => diff.files_added += 1,
                Some(hash) if *hash != file.hash => diff.files_modified += 1,
                Some(_) => {}
            }
        }
        diff.files_removed = before.files.keys().filter(|p| !current.contains(p.as_str())).count();

        Some(diff)
    }
}

/// Rebuild the index for the module containing `start`.
pub fn sync(store: &mut SqliteStore, start: &Path) -> Result<SyncResult> {
    sync_with(store, start, &SyncOptions::default())
}

pub fn sync_with(store: &mut SqliteStore, start: &Path, options: &SyncOptions) -> Result<SyncResult> {
    let started = Instant::now();

    let module = ModuleInfo::resolve(start)?;
    tracing::info!("Syncing module {} at {}", module.path, module.root.display());

    let files = collect_files(&module.root, &options.excludes, &options.cancel)?;
    let fingerprint = tree_fingerprint(&files);
    let vcs = vcs::probe(&module.root, &options.cancel)?;

    let extracted = extract_all(&files, &module, options)?;
    tracing::debug!("Extracted {} files in {:?}", files.len(), started.elapsed());

    let writer = store.begin_rebuild()?;
    let snapshot = writer.snapshot()?;
    writer.clear()?;

    let synced_at = Utc::now();
    let now = synced_at.to_rfc3339();

    let package_ids = insert_packages(&writer, &module, &files, &extracted, &now)?;

    let mut indexed_symbols = 0;
    for (file, parsed) in files.iter().zip(&extracted) {
        options.cancel.check()?;
        indexed_symbols += write_file(&writer, &package_ids, file, parsed, &now)?;
    }

    writer.update_package_counts(&now)?;

    let state = SyncState {
        synced_at,
        revision: vcs.revision,
        dirty: vcs.dirty,
        indexed_files: files.len(),
        fingerprint,
    };
    writer.write_sync_state(&state)?;

    let diff = Diff::compute(&snapshot, &files, indexed_symbols, package_ids.len());

    options.cancel.check()?;
    writer.commit()?;

    tracing::info!(
        "Indexed {} files, {} symbols, {} packages in {:?}",
        files.len(),
        indexed_symbols,
        package_ids.len(),
        started.elapsed()
    );

    Ok(SyncResult {
        indexed_files: state.indexed_files,
        indexed_symbols,
        indexed_packages: package_ids.len(),
        fingerprint: state.fingerprint,
        revision: state.revision,
        dirty: state.dirty,
        synced_at,
        diff,
    })
}

/// Parse every file, preserving input order in the output.
fn extract_all(files: &[SourceFile], module: &ModuleInfo, options: &SyncOptions) -> Result<Vec<ExtractedFile>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let workers = options.workers.clamp(1, files.len());
    let chunk_size = files.len().div_ceil(workers);

    let chunks = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move |_| -> Result<Vec<ExtractedFile>> {
                    let mut parser = GoParser::new()?;
                    let mut out = Vec::with_capacity(chunk.len());
                    for file in chunk {
                        options.cancel.check()?;
                        out.push(extract_file(&mut parser, file, module)?);
                    }
                    Ok(out)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| Error::Worker("parse worker panicked".to_string()))
                    .and_then(|result| result)
            })
            .collect::<Result<Vec<_>>>()
    })
    .map_err(|_| Error::Worker("parse worker panicked".to_string()))??;

    Ok(chunks.into_iter().flatten().collect())
}

/// One package row per source directory, named after the first file's
/// `package` clause. Returns `directory -> package id`.
fn insert_packages(
    writer: &IndexWriter<'_>,
    module: &ModuleInfo,
    files: &[SourceFile],
    extracted: &[ExtractedFile],
    now: &str,
) -> Result<BTreeMap<String, i64>> {
    let mut names: BTreeMap<&str, &str> = BTreeMap::new();
    for (file, parsed) in files.iter().zip(extracted) {
        names.entry(file.package_path()).or_insert(parsed.package_name.as_str());
    }

    let mut ids = BTreeMap::new();
    for (path, name) in names {
        let id = writer.insert_package(path, name, &module.import_path(path), now)?;
        ids.insert(path.to_string(), id);
    }
    Ok(ids)
}

/// Insert one file with its imports, symbols and dependencies. Returns the
/// number of symbols written.
fn write_file(
    writer: &IndexWriter<'_>,
    package_ids: &BTreeMap<String, i64>,
    file: &SourceFile,
    parsed: &ExtractedFile,
    now: &str,
) -> Result<usize> {
    let package_id = package_ids
        .get(file.package_path())
        .copied()
        .ok_or_else(|| Error::Worker(format!("no package row for {}", file.relative_path)))?;
    let file_id = writer.insert_file(package_id, &file.relative_path, file.lines, &file.hash, now)?;

    for import in &parsed.imports {
        let to_package_id = import
            .local_package
            .as_deref()
            .and_then(|pkg| package_ids.get(pkg).copied());
        writer.insert_import(file_id, import, to_package_id)?;
    }

    for symbol in &parsed.symbols {
        let symbol_id = writer.insert_symbol(file_id, symbol)?;
        for dep in &symbol.deps {
            writer.insert_dependency(symbol_id, dep)?;
        }
    }

    Ok(parsed.symbols.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{DepKind, SymbolDependency, SymbolKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Repo {
        dir: TempDir,
    }

    impl Repo {
        fn new() -> Self {
            let repo = Self { dir: TempDir::new().unwrap() };
            repo.write("go.mod", "module example.com/m\n\ngo 1.22\n");
            repo
        }

        fn root(&self) -> PathBuf {
            self.dir.path().to_path_buf()
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn remove(&self, rel: &str) {
            std::fs::remove_file(self.dir.path().join(rel)).unwrap();
        }
    }

    fn scenario() -> Repo {
        let repo = Repo::new();
        repo.write(
            "a/a.go",
            "package a\n\nimport bpkg \"example.com/m/b\"\n\nfunc F() {\n\tbpkg.G()\n}\n",
        );
        repo.write("b/b.go", "package b\n\nfunc G() {}\n");
        repo
    }

    fn options() -> SyncOptions {
        SyncOptions { workers: 2, ..Default::default() }
    }

    #[test]
    fn test_example_scenario() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let first = sync_with(&mut store, &repo.root(), &options()).unwrap();
        assert_eq!(first.indexed_files, 2);
        assert_eq!(first.indexed_packages, 2);
        assert_eq!(first.indexed_symbols, 2);
        assert!(first.diff.is_none());

        let f = &store.find_symbols_by_name("F").unwrap()[0];
        assert_eq!(
            store.deps_of_symbol(f.id).unwrap(),
            vec![SymbolDependency::new("G", "b", DepKind::Func)]
        );
        assert_eq!(store.stats().unwrap().symbol_deps, 1);

        let imports = store.imports_of_file("a/a.go").unwrap();
        let b = store.list_packages().unwrap().into_iter().find(|p| p.path == "b").unwrap();
        assert_eq!(imports[0].alias, "bpkg");
        assert_eq!(imports[0].to_package_id, Some(b.id));
        assert_eq!(b.import_path, "example.com/m/b");

        let second = sync_with(&mut store, &repo.root(), &options()).unwrap();
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.indexed_files, first.indexed_files);
        assert_eq!(second.indexed_symbols, first.indexed_symbols);
        assert_eq!(
            second.diff,
            Some(Diff {
                symbols_before: 2,
                symbols_after: 2,
                packages_before: 2,
                packages_after: 2,
                ..Default::default()
            })
        );

        repo.write("b/b.go", "package b\n\nfunc G() {\n\tprintln(\"g\")\n}\n");
        let third = sync_with(&mut store, &repo.root(), &options()).unwrap();
        let diff = third.diff.unwrap();
        assert_eq!(diff.files_modified, 1);
        assert_eq!((diff.files_added, diff.files_removed), (0, 0));
        assert_ne!(third.fingerprint, first.fingerprint);
        assert_eq!(third.indexed_symbols, first.indexed_symbols);
    }

    #[test]
    fn test_diff_accounting() {
        let repo = Repo::new();
        repo.write("one.go", "package m\n\nfunc One() {}\n");
        repo.write("two.go", "package m\n\nfunc Two() {}\n");
        repo.write("three.go", "package m\n\nfunc Three() {}\n");
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(sync(&mut store, &repo.root()).unwrap().indexed_files, 3);

        repo.remove("one.go");
        repo.write("two.go", "package m\n\nfunc Two() int { return 2 }\n");
        repo.write("four.go", "package m\n\nfunc Four() {}\n");

        let result = sync(&mut store, &repo.root()).unwrap();
        let diff = result.diff.unwrap();
        assert_eq!((diff.files_added, diff.files_removed, diff.files_modified), (1, 1, 1));
        assert_eq!((diff.symbols_before, diff.symbols_after), (3, 3));
        assert_eq!(store.file_hashes().unwrap().len(), 3);
        assert!(store.find_symbols_by_name("One").unwrap().is_empty());
    }

    #[test]
    fn test_failed_sync_leaves_index_untouched() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let baseline = sync(&mut store, &repo.root()).unwrap();
        let stats_before = store.stats().unwrap();
        let state_before = store.sync_state().unwrap();

        repo.write("b/broken.go", "package b\n\nfunc Broken( {\n");
        let err = sync(&mut store, &repo.root()).unwrap_err();
        match err {
            Error::Parse { path, .. } => assert_eq!(path, "b/broken.go"),
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(store.stats().unwrap(), stats_before);
        assert_eq!(store.sync_state().unwrap(), state_before);
        assert_eq!(state_before.unwrap().fingerprint, baseline.fingerprint);
    }

    #[test]
    fn test_top_level_statement_leaves_index_untouched() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        sync(&mut store, &repo.root()).unwrap();
        let stats_before = store.stats().unwrap();
        let state_before = store.sync_state().unwrap();

        repo.write("b/bad.go", "package b\n\nx := 5\n");
        let err = sync(&mut store, &repo.root()).unwrap_err();
        assert!(matches!(err, Error::Parse { ref path, line: 3, .. } if path == "b/bad.go"));

        assert_eq!(store.stats().unwrap(), stats_before);
        assert_eq!(store.sync_state().unwrap(), state_before);
        assert!(store.list_packages().unwrap().iter().all(|p| !p.name.is_empty()));
    }

    #[test]
    fn test_filtered_files_are_not_indexed() {
        let repo = scenario();
        repo.write("a/a_test.go", "package a\n\nfunc TestF() {}\n");
        repo.write("a/gen.go", "// Code generated by mockgen. DO NOT EDIT.\n\npackage a\n\nfunc Gen() {}\n");
        repo.write("vendor/x/x.go", "package x\n\nfunc X() {}\n");
        repo.write("b/testdata/fixture.go", "package fixture\n\nfunc Fixture() {}\n");
        repo.write(".repograph/cache.go", "package cache\n");

        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = sync(&mut store, &repo.root()).unwrap();
        assert_eq!(result.indexed_files, 2);

        let mut paths: Vec<String> = store.file_hashes().unwrap().into_keys().collect();
        paths.sort();
        assert_eq!(paths, vec!["a/a.go", "b/b.go"]);
    }

    #[test]
    fn test_external_calls_produce_no_edges() {
        let repo = Repo::new();
        repo.write(
            "main.go",
            "package main\n\nimport (\n\t\"fmt\"\n\tstr \"strings\"\n)\n\nfunc main() {\n\tfmt.Println(str.ToUpper(\"x\"))\n}\n",
        );

        let mut store = SqliteStore::open_in_memory().unwrap();
        sync(&mut store, &repo.root()).unwrap();

        assert_eq!(store.stats().unwrap().symbol_deps, 0);
        let imports = store.imports_of_file("main.go").unwrap();
        assert_eq!(imports.len(), 2);
        assert!(imports.iter().all(|i| i.import_type == "external" && i.to_package_id.is_none()));
    }

    #[test]
    fn test_method_and_function_rows() {
        let repo = Repo::new();
        repo.write(
            "srv/srv.go",
            "package srv\n\ntype Server struct{}\n\nfunc (s *Server) Close() {}\n\nfunc Close() {}\n",
        );

        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = sync(&mut store, &repo.root()).unwrap();
        assert_eq!(result.indexed_symbols, 3);

        let closes = store.find_symbols_by_name("Close").unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0].kind, SymbolKind::Method);
        assert_eq!(closes[0].receiver, "*Server");
        assert_eq!(closes[1].kind, SymbolKind::Func);
    }

    #[test]
    fn test_package_aggregates_and_root_package() {
        let repo = Repo::new();
        repo.write("main.go", "package main\n\nimport \"example.com/m/util\"\n\nfunc main() { util.Do() }\n");
        repo.write("util/a.go", "package util\n\nfunc Do() {}\n");
        repo.write("util/b.go", "package util\n\nfunc helper() {}\n");
        repo.write("missing.go", "package main\n\nimport \"example.com/m/nothing\"\n");

        let mut store = SqliteStore::open_in_memory().unwrap();
        sync(&mut store, &repo.root()).unwrap();

        let packages = store.list_packages().unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].path, ".");
        assert_eq!(packages[0].name, "main");
        assert_eq!(packages[0].import_path, "example.com/m");
        assert_eq!(packages[1].file_count, 2);
        assert_eq!(packages[1].line_count, 6);

        let imports = store.imports_of_file("missing.go").unwrap();
        assert_eq!(imports[0].import_type, "local");
        assert_eq!(imports[0].to_package_id, None);

        let main = &store.find_symbols_by_name("main").unwrap()[0];
        assert_eq!(
            store.deps_of_symbol(main.id).unwrap(),
            vec![SymbolDependency::new("Do", "util", DepKind::Func)]
        );
    }

    #[test]
    fn test_sync_from_subdirectory() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = sync(&mut store, &repo.root().join("a")).unwrap();
        assert_eq!(result.indexed_files, 2);
    }

    #[test]
    fn test_cancelled_sync_writes_nothing() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let options = SyncOptions::default();
        options.cancel.cancel();

        let err = sync_with(&mut store, &repo.root(), &options).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(store.sync_state().unwrap().is_none());
        assert_eq!(store.stats().unwrap().files, 0);
    }

    #[test]
    fn test_malformed_manifest_aborts_before_writes() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        sync(&mut store, &repo.root()).unwrap();

        repo.write("go.mod", "go 1.22\n");
        let err = sync(&mut store, &repo.root()).unwrap_err();
        assert!(matches!(err, Error::ModuleMalformed { .. }));
        assert_eq!(store.stats().unwrap().files, 2);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let repo = scenario();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = sync(&mut store, &repo.root()).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["indexedFiles"], 2);
        assert!(json["diff"].is_null());
        assert!(json["syncedAt"].is_string());
    }
}
