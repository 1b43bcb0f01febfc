//! Identity-stable file diffing.
//!
//! Files are matched across polls by [`FileIdentity`] only. Download URLs
//! and source-side file ids are volatile and never take part, so a file whose
//! URL changed is neither added nor deleted.

use std::collections::{HashMap, HashSet};

use mirrorsync_core::{FileIdentity, RecordStatus, SourceFile};

/// Changes needed to move the target from the old file set to the new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Files present now whose identity was not present before.
    pub to_add: Vec<SourceFile>,
    /// Previously present files whose identity is gone.
    pub to_delete: Vec<SourceFile>,
    /// Same identity, new or different digest. Replaced in place.
    pub hash_change: Vec<SourceFile>,
    /// A snapshot contained duplicate identities, so no pairing was guessed
    /// and the diff is a full delete of the old set plus a full add.
    pub ambiguous: bool,
}

impl FileDiff {
    /// Treat every file as an addition.
    #[must_use]
    pub fn all_added(files: &[SourceFile]) -> Self {
        Self {
            to_add: files.to_vec(),
            ..Self::default()
        }
    }

    /// Whether nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty() && self.hash_change.is_empty()
    }

    /// Total number of file operations in this diff.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_delete.len() + self.hash_change.len()
    }
}

/// Diff appropriate for a record's status.
///
/// A `new` record has no baseline, so every file is an addition without any
/// set comparison.
#[must_use]
pub fn diff_for_status(status: RecordStatus, old: &[SourceFile], new: &[SourceFile]) -> FileDiff {
    match status {
        RecordStatus::New => FileDiff::all_added(new),
        _ => diff_files(old, new),
    }
}

/// Compute the file-level diff between two snapshots.
#[must_use]
pub fn diff_files(old: &[SourceFile], new: &[SourceFile]) -> FileDiff {
    if has_duplicate_identities(old) || has_duplicate_identities(new) {
        return FileDiff {
            to_add: new.to_vec(),
            to_delete: old.to_vec(),
            hash_change: Vec::new(),
            ambiguous: true,
        };
    }

    let old_by_identity: HashMap<FileIdentity, &SourceFile> =
        old.iter().map(|f| (f.identity(), f)).collect();
    let new_identities: HashSet<FileIdentity> = new.iter().map(SourceFile::identity).collect();

    let mut diff = FileDiff::default();

    for file in new {
        match old_by_identity.get(&file.identity()) {
            None => diff.to_add.push(file.clone()),
            Some(previous) if digest_changed(previous, file) => {
                diff.hash_change.push(file.clone());
            }
            Some(_) => {}
        }
    }

    diff.to_delete = old
        .iter()
        .filter(|f| !new_identities.contains(&f.identity()))
        .cloned()
        .collect();

    diff
}

/// A digest that appeared or changed is a content change. A digest that
/// disappeared, or was never there, is not.
fn digest_changed(previous: &SourceFile, current: &SourceFile) -> bool {
    match (&previous.digest, &current.digest) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => old != new,
    }
}

fn has_duplicate_identities(files: &[SourceFile]) -> bool {
    let mut seen = HashSet::with_capacity(files.len());
    files.iter().any(|f| !seen.insert(f.identity()))
}
