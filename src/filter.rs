use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

use crate::config::STATE_DIR;

/// Directory names that never hold indexable sources.
const SKIPPED_DIRS: &[&str] = &["vendor", "testdata", "node_modules", STATE_DIR];

/// Decides which directories the collector descends into.
///
/// Built-in rules drop hidden directories, vendored dependencies, test
/// fixtures and our own state directory. User patterns from the config are
/// matched with gitignore semantics relative to the repository root.
pub struct IgnoreFilter {
    inner: Gitignore,
}

impl IgnoreFilter {
    pub fn new(root: &Path, extra_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        for pattern in extra_excludes {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("ignoring invalid exclude pattern {:?}: {}", pattern, e);
            }
        }

        let inner = builder.build().unwrap_or_else(|e| {
            tracing::warn!("failed to build exclude matcher: {}", e);
            Gitignore::empty()
        });

        Self { inner }
    }

    /// Whether a directory (other than the root) should be skipped entirely.
    pub fn skip_dir(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.starts_with('.') || SKIPPED_DIRS.contains(&name) || self.is_excluded(path, true)
    }

    /// Whether a path matches one of the user's exclude patterns.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched(path, is_dir).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dirs() {
        let root = Path::new("/repo");
        let filter = IgnoreFilter::new(root, &[]);

        assert!(filter.skip_dir(&root.join(".git")));
        assert!(filter.skip_dir(&root.join("vendor")));
        assert!(filter.skip_dir(&root.join("pkg/testdata")));
        assert!(filter.skip_dir(&root.join(".repograph")));
        assert!(!filter.skip_dir(&root.join("internal")));
    }

    #[test]
    fn test_user_patterns() {
        let root = Path::new("/repo");
        let filter = IgnoreFilter::new(root, &["gen/".to_string(), "*_mock.go".to_string()]);

        assert!(filter.skip_dir(&root.join("gen")));
        assert!(filter.is_excluded(&root.join("svc/store_mock.go"), false));
        assert!(!filter.is_excluded(&root.join("svc/store.go"), false));
    }
}
