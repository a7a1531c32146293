//! Lazy history walk, newest author time first.

use chrono::{DateTime, FixedOffset};
use gitfacts_core::{CommitRecord, GitfactsError, ObjectId};
use git2::{ErrorCode, Oid};
use std::collections::{BinaryHeap, HashSet};

use crate::{commit_record, git_err, oid, Repository};

/// Bounds for a history walk.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Commit to start from. HEAD when unset.
    pub from: Option<ObjectId>,
    /// Skip commits authored before this instant.
    pub since: Option<DateTime<FixedOffset>>,
    /// Skip commits authored after this instant.
    pub until: Option<DateTime<FixedOffset>>,
}

/// Commits reachable from a start commit, newest author time first.
///
/// Parents are queued in a max-heap keyed by author time, so merges of
/// branches are interleaved by date and every commit is produced once. The
/// output is non-increasing only while author time never grows along
/// ancestry; a rebased or cherry-picked commit keeps its old author date on
/// top of a newer parent and is produced before that parent. Bounds filter
/// commits but never end the walk, since an ancestor of an out-of-range
/// commit may still be in range.
pub struct History {
    repo: Repository,
    queue: BinaryHeap<Pending>,
    seen: HashSet<Oid>,
    since: Option<i64>,
    until: Option<i64>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    when: i64,
    oid: Oid,
}

impl History {
    pub(crate) fn new(repo: Repository, options: HistoryOptions) -> Result<Self, GitfactsError> {
        let start = match options.from {
            Some(id) => oid(&id)?,
            None => oid(&repo.head()?)?,
        };
        let when = repo
            .inner
            .find_commit(start)
            .map_err(git_err("failed to read start commit"))?
            .author()
            .when()
            .seconds();

        let mut history = Self {
            repo,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            since: options.since.map(|t| t.timestamp()),
            until: options.until.map(|t| t.timestamp()),
        };
        history.seen.insert(start);
        history.queue.push(Pending { when, oid: start });
        Ok(history)
    }
}

impl Iterator for History {
    type Item = Result<CommitRecord, GitfactsError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Pending { when, oid }) = self.queue.pop() {
            let commit = match self.repo.inner.find_commit(oid) {
                Ok(commit) => commit,
                Err(e) => return Some(Err(git_err("failed to read commit")(e))),
            };
            for parent in commit.parent_ids() {
                if !self.seen.insert(parent) {
                    continue;
                }
                match self.repo.inner.find_commit(parent) {
                    Ok(p) => self.queue.push(Pending {
                        when: p.author().when().seconds(),
                        oid: parent,
                    }),
                    // Shallow clones end here.
                    Err(e) if e.code() == ErrorCode::NotFound => {
                        tracing::debug!("history: parent {} missing, skipping", parent);
                    }
                    Err(e) => return Some(Err(git_err("failed to read parent commit")(e))),
                }
            }

            if self.until.is_some_and(|until| when > until)
                || self.since.is_some_and(|since| when < since)
            {
                continue;
            }
            return Some(commit_record(&commit));
        }
        None
    }
}
