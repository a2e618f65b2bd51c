//! File collection - walks the repository and keeps the eligible Go sources
//!
//! A file is eligible when it has the `.go` extension, is not a `_test.go`
//! file, is not marked as generated, and does not live under a skipped
//! directory (see [`IgnoreFilter`]). The returned list is sorted by relative
//! path; the tree fingerprint depends on that order.

use crate::filter::IgnoreFilter;
use crate::sync::CancelFlag;
use crate::{Error, Result};
use ignore::WalkBuilder;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

pub const SOURCE_EXTENSION: &str = "go";
pub const TEST_SUFFIX: &str = "_test.go";

/// How far into a file the generated-code marker is searched for.
const GENERATED_SCAN_BYTES: usize = 4096;

/// An eligible source file read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the repository root, always `/`-separated
    pub relative_path: String,
    pub content: String,
    /// BLAKE3 hex digest of the raw bytes
    pub hash: String,
    pub lines: usize,
}

impl SourceFile {
    /// Repository-relative directory of this file; `"."` for the root.
    pub fn package_path(&self) -> &str {
        match self.relative_path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        }
    }
}

/// Walk `root` and return every eligible file, sorted by relative path.
///
/// Any traversal or read failure aborts collection. `cancel` is checked
/// before every walked entry.
pub fn collect_files(root: &Path, excludes: &[String], cancel: &CancelFlag) -> Result<Vec<SourceFile>> {
    let filter = Arc::new(IgnoreFilter::new(root, excludes));
    let walk_filter = Arc::clone(&filter);

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && walk_filter.skip_dir(entry.path()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        cancel.check()?;
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        if !is_source_name(path) || filter.is_excluded(path, false) {
            continue;
        }

        let bytes = std::fs::read(path).map_err(|source| Error::Collection {
            path: path.to_path_buf(),
            source,
        })?;

        if is_generated(&bytes) {
            tracing::debug!("Skipping generated file {}", path.display());
            continue;
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        files.push(SourceFile {
            path: path.to_path_buf(),
            relative_path: relative_slash_path(root, path),
            hash: blake3::hash(&bytes).to_hex().to_string(),
            lines: content.lines().count(),
            content,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    tracing::debug!("Collected {} eligible files under {}", files.len(), root.display());
    Ok(files)
}

/// `.go` files that are not tests.
fn is_source_name(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION) && !name.ends_with(TEST_SUFFIX)
}

/// Detects the standard `// Code generated ... DO NOT EDIT.` header.
pub fn is_generated(content: &[u8]) -> bool {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| {
        Regex::new(r"(?m)^// Code generated .* DO NOT EDIT\.\r?$").expect("static regex is valid")
    });

    let head = &content[..content.len().min(GENERATED_SCAN_BYTES)];
    marker.is_match(head)
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, err: ignore::Error) -> Error {
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other(message));
    Error::Collection {
        path: root.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_filters_and_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "main.go", "package main\n\nfunc main() {}\n");
        write(root, "b/b.go", "package b\n");
        write(root, "a/a.go", "package a\n");
        write(root, "a/a_test.go", "package a\n");
        write(root, "a/zz_gen.go", "// Code generated by stringer. DO NOT EDIT.\n\npackage a\n");
        write(root, "vendor/x/x.go", "package x\n");
        write(root, "a/testdata/t.go", "package t\n");
        write(root, ".hidden/h.go", "package h\n");
        write(root, ".repograph/stale.go", "package s\n");
        write(root, "README.md", "# readme\n");

        let files = collect_files(root, &[], &CancelFlag::new()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a/a.go", "b/b.go", "main.go"]);

        let main = &files[2];
        assert_eq!(main.lines, 3);
        assert_eq!(main.package_path(), ".");
        assert_eq!(files[0].package_path(), "a");
        assert_eq!(main.hash, blake3::hash(b"package main\n\nfunc main() {}\n").to_hex().to_string());
    }

    #[test]
    fn test_user_excludes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "api/api.go", "package api\n");
        write(root, "mocks/m.go", "package mocks\n");
        write(root, "api/store_mock.go", "package api\n");

        let excludes = vec!["mocks/".to_string(), "*_mock.go".to_string()];
        let files = collect_files(root, &excludes, &CancelFlag::new()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["api/api.go"]);
    }

    #[test]
    fn test_cancel_stops_walk() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/a.go", "package a\n");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = collect_files(dir.path(), &[], &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_generated_marker_position() {
        assert!(is_generated(b"// Code generated by protoc-gen-go. DO NOT EDIT.\npackage pb\n"));
        assert!(is_generated(b"// +build linux\n\n// Code generated by x. DO NOT EDIT.\r\npackage p\n"));
        assert!(!is_generated(b"package p\n// Code generated elsewhere, edit freely\n"));

        let mut late = "package p\n".repeat(1000).into_bytes();
        late.extend_from_slice(b"// Code generated by x. DO NOT EDIT.\n");
        assert!(!is_generated(&late));
    }
}
