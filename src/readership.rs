//! Membership toggle: reconciles a user's read set against a submitted one.
//!
//! A submission is the complete set of books the user should have marked as
//! read once the request is applied. Books missing from it are un-marked.

use crate::db::{Database, User};
use crate::error::Result;
use std::collections::BTreeSet;

/// Changes needed to turn the current read set into the submitted one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadershipDiff {
    /// Book IDs to mark as read.
    pub added: BTreeSet<i64>,
    /// Book IDs to un-mark.
    pub removed: BTreeSet<i64>,
}

impl ReadershipDiff {
    /// True when the submission matches the current state.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute the symmetric difference between the current and submitted sets.
pub fn diff(current: &BTreeSet<i64>, submitted: &BTreeSet<i64>) -> ReadershipDiff {
    ReadershipDiff {
        added: submitted.difference(current).copied().collect(),
        removed: current.difference(submitted).copied().collect(),
    }
}

/// Readership service over the `book_readers` join table.
#[derive(Clone)]
pub struct Readership {
    db: Database,
}

impl Readership {
    /// Create a new readership service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Book IDs the user has marked as read.
    pub fn current(&self, user: &User) -> Result<BTreeSet<i64>> {
        self.db.get_readership(&user.id)
    }

    /// Replace the user's read set with `ids`.
    ///
    /// Fails with `NotFound` without changing anything if any ID does not
    /// name an existing book.
    pub fn submit(
        &self,
        user: &User,
        ids: impl IntoIterator<Item = i64>,
    ) -> Result<ReadershipDiff> {
        let submitted: BTreeSet<i64> = ids.into_iter().collect();
        let changes = self.db.set_readership(&user.id, &submitted)?;

        tracing::debug!(
            user = %user.username,
            added = ?changes.added,
            removed = ?changes.removed,
            "Readership updated"
        );

        Ok(changes)
    }
}
