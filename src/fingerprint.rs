//! Tree fingerprint - one digest summarising every eligible file

use crate::collect::SourceFile;

/// Separates fields fed into the hasher so `("ab", "c")` and `("a", "bc")`
/// cannot produce the same stream.
const SEPARATOR: &[u8] = &[0];

/// Fold `(relative path, content hash)` of each file into a single BLAKE3 digest.
///
/// `files` must already be sorted by relative path, as returned by
/// [`collect_files`](crate::collect::collect_files).
pub fn tree_fingerprint(files: &[SourceFile]) -> String {
    debug_assert!(files.windows(2).all(|w| w[0].relative_path <= w[1].relative_path));

    let mut hasher = blake3::Hasher::new();
    for file in files {
        hasher.update(file.relative_path.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(file.hash.as_bytes());
        hasher.update(SEPARATOR);
    }
    hasher.finalize().to_hex().to_string()
}
