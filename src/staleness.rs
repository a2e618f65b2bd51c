//! Staleness detection
//!
//! Compares the working tree against the last committed sync without parsing
//! anything: files are re-collected and fingerprinted, git is probed, and the
//! result is checked against the stored `sync_state` row.

use std::path::Path;

use serde::Serialize;

use crate::collect::collect_files;
use crate::fingerprint::tree_fingerprint;
use crate::module::ModuleInfo;
use crate::storage::SqliteStore;
use crate::sync::CancelFlag;
use crate::{Result, vcs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StaleReason {
    FingerprintChanged,
    FileCountChanged,
    RevisionChanged,
    DirtyChanged,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StaleReason::FingerprintChanged => "file contents changed",
            StaleReason::FileCountChanged => "file count changed",
            StaleReason::RevisionChanged => "revision changed",
            StaleReason::DirtyChanged => "working tree state changed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Staleness {
    NeverSynced,
    Fresh,
    Stale { reasons: Vec<StaleReason> },
}

impl Staleness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Staleness::Fresh)
    }
}

/// Check whether the index still reflects the module containing `start`.
pub fn check_staleness(store: &SqliteStore, start: &Path, excludes: &[String]) -> Result<Staleness> {
    let Some(state) = store.sync_state()? else {
        return Ok(Staleness::NeverSynced);
    };

    let module = ModuleInfo::resolve(start)?;
    let cancel = CancelFlag::new();
    let files = collect_files(&module.root, excludes, &cancel)?;
    let fingerprint = tree_fingerprint(&files);
    let vcs = vcs::probe(&module.root, &cancel)?;

    let mut reasons = Vec::new();
    if fingerprint != state.fingerprint {
        reasons.push(StaleReason::FingerprintChanged);
    }
    if files.len() != state.indexed_files {
        reasons.push(StaleReason::FileCountChanged);
    }
    if vcs.revision != state.revision {
        reasons.push(StaleReason::RevisionChanged);
    }
    if vcs.dirty != state.dirty {
        reasons.push(StaleReason::DirtyChanged);
    }

    if reasons.is_empty() {
        Ok(Staleness::Fresh)
    } else {
        tracing::debug!("Index is stale: {:?}", reasons);
        Ok(Staleness::Stale { reasons })
    }
}
