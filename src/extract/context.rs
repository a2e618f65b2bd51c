//! Per-file resolution context
//!
//! Built once for each file from its import block and handed to the
//! extractor. It answers one question: when the body calls `x.Name()`, is `x`
//! a package inside this module, a package outside it, or a local value?

use std::collections::HashMap;

use crate::module::ModuleInfo;

/// An import statement as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Unquoted import path
    pub path: String,
    /// Explicit name given in the import, empty when implicit
    pub alias: String,
    pub line: u32,
}

/// Whether an import points inside the current module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportType {
    Local,
    External,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Local => "local",
            ImportType::External => "external",
        }
    }
}

impl std::fmt::Display for ImportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An import after classification against the module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedImport {
    pub spec: ImportSpec,
    pub import_type: ImportType,
    /// Package directory for local imports
    pub local_package: Option<String>,
}

impl ClassifiedImport {
    pub fn classify(spec: ImportSpec, module: &ModuleInfo) -> Self {
        let local_package = module.local_package(&spec.path);
        let import_type = if local_package.is_some() {
            ImportType::Local
        } else {
            ImportType::External
        };
        Self {
            spec,
            import_type,
            local_package,
        }
    }

    /// Name the imported package is referred to by in this file, if any.
    ///
    /// Blank (`_`) and dot (`.`) imports bind no name.
    pub fn binding(&self) -> Option<&str> {
        match self.spec.alias.as_str() {
            "_" | "." => None,
            "" => Some(default_alias(&self.spec.path)),
            explicit => Some(explicit),
        }
    }
}

/// What an import alias refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A package directory inside this module
    Local(String),
    /// Anything outside the module: standard library or third party
    External,
}

/// Immutable per-file state threaded into extraction.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    package_path: String,
    aliases: HashMap<String, ImportTarget>,
}

impl ResolutionContext {
    pub fn new(package_path: impl Into<String>, imports: &[ClassifiedImport]) -> Self {
        let mut aliases = HashMap::new();
        for import in imports {
            let Some(name) = import.binding() else {
                continue;
            };
            let target = match &import.local_package {
                Some(pkg) => ImportTarget::Local(pkg.clone()),
                None => ImportTarget::External,
            };
            aliases.entry(name.to_string()).or_insert(target);
        }

        Self {
            package_path: package_path.into(),
            aliases,
        }
    }

    /// Repository-relative directory of the file being extracted
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    pub fn resolve_alias(&self, name: &str) -> Option<&ImportTarget> {
        self.aliases.get(name)
    }
}

/// The package name Go code conventionally uses for an import path when no
/// explicit name is given.
///
/// Skips a trailing major-version element (`/v2`), drops a `go-` prefix and
/// stops at the first character that cannot appear in an identifier, so
/// `gopkg.in/yaml.v3` binds `yaml`.
pub fn default_alias(import_path: &str) -> &str {
    let mut segments = import_path.rsplit('/');
    let mut last = segments.next().unwrap_or(import_path);
    if is_major_version(last) {
        last = segments.next().unwrap_or(last);
    }

    let last = last.strip_prefix("go-").unwrap_or(last);
    let end = last
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(last.len(), |(i, _)| i);
    &last[..end]
}

fn is_major_version(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn module() -> ModuleInfo {
        ModuleInfo {
            root: PathBuf::from("/repo"),
            path: "example.com/app".to_string(),
        }
    }

    fn spec(path: &str, alias: &str) -> ImportSpec {
        ImportSpec {
            path: path.to_string(),
            alias: alias.to_string(),
            line: 3,
        }
    }

    #[test]
    fn test_default_alias() {
        assert_eq!(default_alias("fmt"), "fmt");
        assert_eq!(default_alias("net/http"), "http");
        assert_eq!(default_alias("github.com/jackc/pgx/v5"), "pgx");
        assert_eq!(default_alias("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(default_alias("github.com/mattn/go-isatty"), "isatty");
        assert_eq!(default_alias("example.com/app/internal/db"), "db");
    }

    #[test]
    fn test_classification() {
        let local = ClassifiedImport::classify(spec("example.com/app/store", ""), &module());
        assert_eq!(local.import_type, ImportType::Local);
        assert_eq!(local.local_package.as_deref(), Some("store"));

        let external = ClassifiedImport::classify(spec("example.com/application", ""), &module());
        assert_eq!(external.import_type, ImportType::External);
        assert_eq!(external.local_package, None);
    }

    #[test]
    fn test_context_aliases() {
        let imports: Vec<ClassifiedImport> = [
            spec("example.com/app/store", "db"),
            spec("example.com/app/util", ""),
            spec("strings", ""),
            spec("example.com/app/side", "_"),
            spec("example.com/app/dot", "."),
        ]
        .into_iter()
        .map(|s| ClassifiedImport::classify(s, &module()))
        .collect();

        let ctx = ResolutionContext::new("cmd/server", &imports);
        assert_eq!(ctx.package_path(), "cmd/server");
        assert_eq!(ctx.resolve_alias("db"), Some(&ImportTarget::Local("store".to_string())));
        assert_eq!(ctx.resolve_alias("util"), Some(&ImportTarget::Local("util".to_string())));
        assert_eq!(ctx.resolve_alias("strings"), Some(&ImportTarget::External));
        assert_eq!(ctx.resolve_alias("store"), None);
        assert_eq!(ctx.resolve_alias("_"), None);
        assert_eq!(ctx.resolve_alias("side"), None);
        assert_eq!(ctx.resolve_alias("dot"), None);
    }
}
