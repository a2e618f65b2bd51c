//! Module resolution - finds `go.mod` and reads the module path

use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub const MANIFEST: &str = "go.mod";
const MODULE_KEYWORD: &str = "module";

/// The repository root and its canonical import-path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub root: PathBuf,
    pub path: String,
}

impl ModuleInfo {
    /// Locate the nearest `go.mod` at or above `start` and read its module path.
    pub fn resolve(start: &Path) -> Result<Self> {
        let root = find_root(start)?;
        let path = read_module_path(&root.join(MANIFEST))?;
        Ok(Self { root, path })
    }

    /// Import path of a repository-relative package directory.
    pub fn import_path(&self, package_path: &str) -> String {
        if package_path == "." || package_path.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, package_path)
        }
    }

    /// Map an import path under this module to its package directory;
    /// `None` for imports from outside the module.
    pub fn local_package(&self, import_path: &str) -> Option<String> {
        if import_path == self.path {
            return Some(".".to_string());
        }
        import_path
            .strip_prefix(self.path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }
}

/// Walk upward from `start` until a directory containing `go.mod` is found.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    let start = start.canonicalize().map_err(|_| Error::ModuleNotFound {
        start: start.to_path_buf(),
    })?;

    let root = start
        .ancestors()
        .find(|dir| dir.join(MANIFEST).is_file())
        .map(Path::to_path_buf);
    root.ok_or(Error::ModuleNotFound { start })
}

/// Read the value of the first `module` directive in a manifest.
pub fn read_module_path(manifest: &Path) -> Result<String> {
    let content = std::fs::read_to_string(manifest).map_err(|e| Error::ModuleMalformed {
        manifest: manifest.to_path_buf(),
        reason: e.to_string(),
    })?;

    parse_module_path(&content).ok_or_else(|| Error::ModuleMalformed {
        manifest: manifest.to_path_buf(),
        reason: "missing or empty module directive".to_string(),
    })
}

fn parse_module_path(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|line| {
        line.strip_prefix(MODULE_KEYWORD)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })?;

    let value = line[MODULE_KEYWORD.len()..].trim();
    // Trailing line comment, then optional quoting.
    let value = value.split("//").next().unwrap_or("").trim();
    let value = value.trim_matches(|c| c == '"' || c == '`');
    (!value.is_empty()).then(|| value.to_string())
}
