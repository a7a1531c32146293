//! gitfacts-git: git object store access for gitfacts.
//!
//! Wraps a `git2` repository and exposes exactly what the relations need:
//! HEAD resolution, commit point lookups, a lazy author-time ordered history
//! walk, a lazy walk over the files of one commit's tree, and blob reads.
//!
//! # Architecture
//!
//! - **history** — Lazy reverse-chronological walk with since/until bounds
//! - **tree** — Explicit-stack depth-first walk over a commit's files
//! - **fixture** — Builds small repositories for tests

pub mod fixture;
mod history;
mod tree;

pub use history::{History, HistoryOptions};
pub use tree::TreeFiles;

use chrono::{DateTime, FixedOffset};
use gitfacts_core::{BlobSource, CommitRecord, GitfactsError, ObjectId};
use git2::{ErrorCode, Oid};
use std::path::{Path, PathBuf};

/// A git repository opened from disk.
pub struct Repository {
    inner: git2::Repository,
    path: PathBuf,
}

impl Repository {
    /// Open the repository rooted at `path` (a work tree or a bare repository).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GitfactsError> {
        let path = path.as_ref();
        let inner = git2::Repository::open(path).map_err(|e| {
            GitfactsError::Git(format!(
                "failed to open repository at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        tracing::debug!("opened repository at {}", path.display());
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit id HEAD points at.
    pub fn head(&self) -> Result<ObjectId, GitfactsError> {
        let commit = self
            .inner
            .head()
            .and_then(|reference| reference.peel_to_commit())
            .map_err(git_err("failed to resolve HEAD"))?;
        object_id(commit.id())
    }

    /// Point lookup. Unknown objects and non-commits are `None`, not errors.
    pub fn find_commit(&self, id: ObjectId) -> Result<Option<CommitRecord>, GitfactsError> {
        match self.inner.find_object(oid(&id)?, None) {
            Ok(object) => match object.into_commit() {
                Ok(commit) => commit_record(&commit).map(Some),
                Err(_) => Ok(None),
            },
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(git_err("failed to look up commit")(e)),
        }
    }

    /// Look up a commit that must exist.
    pub fn resolve_commit(&self, id: ObjectId) -> Result<CommitRecord, GitfactsError> {
        let commit = self.commit(id)?;
        commit_record(&commit)
    }

    /// Raw content of a blob.
    pub fn blob(&self, id: ObjectId) -> Result<Vec<u8>, GitfactsError> {
        let blob = self.object(id, "blob")?.into_blob().map_err(|_| {
            GitfactsError::WrongKind(format!("object with hash {:?} is not a blob", id.to_string()))
        })?;
        Ok(blob.content().to_vec())
    }

    /// Lazily walk the files in the tree of `commit`.
    pub fn files(&self, commit: ObjectId) -> Result<TreeFiles<'_>, GitfactsError> {
        let tree = self
            .commit(commit)?
            .tree()
            .map_err(git_err("failed to read commit tree"))?;
        Ok(TreeFiles::new(self, tree))
    }

    /// Walk history newest-first. The walk owns the repository handle.
    pub fn history(self, options: HistoryOptions) -> Result<History, GitfactsError> {
        History::new(self, options)
    }

    fn commit(&self, id: ObjectId) -> Result<git2::Commit<'_>, GitfactsError> {
        self.object(id, "commit")?.into_commit().map_err(|_| {
            GitfactsError::WrongKind(format!("object with hash {:?} is not a commit", id.to_string()))
        })
    }

    fn object(&self, id: ObjectId, what: &str) -> Result<git2::Object<'_>, GitfactsError> {
        self.inner.find_object(oid(&id)?, None).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                GitfactsError::NotFound(format!("{what} with hash {:?} not found", id.to_string()))
            } else {
                GitfactsError::Git(format!("failed to read object {id}: {}", e.message()))
            }
        })
    }
}

impl BlobSource for Repository {
    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, GitfactsError> {
        self.blob(*id)
    }
}

// ── Conversions ─────────────────────────────────────────────────────────────

pub(crate) fn git_err(context: &'static str) -> impl Fn(git2::Error) -> GitfactsError {
    move |e| GitfactsError::Git(format!("{context}: {}", e.message()))
}

pub(crate) fn oid(id: &ObjectId) -> Result<Oid, GitfactsError> {
    Oid::from_bytes(id.as_bytes()).map_err(git_err("invalid object id"))
}

pub(crate) fn object_id(oid: Oid) -> Result<ObjectId, GitfactsError> {
    ObjectId::try_from(oid.as_bytes())
}

pub(crate) fn commit_record(commit: &git2::Commit<'_>) -> Result<CommitRecord, GitfactsError> {
    let author = commit.author();
    Ok(CommitRecord {
        hash: object_id(commit.id())?,
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
        author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
        author_when: timestamp(author.when())?,
        parents: commit.parent_count(),
    })
}

fn timestamp(time: git2::Time) -> Result<DateTime<FixedOffset>, GitfactsError> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).ok_or_else(|| {
        GitfactsError::Git(format!("invalid signature offset {}", time.offset_minutes()))
    })?;
    let utc = DateTime::from_timestamp(time.seconds(), 0)
        .ok_or_else(|| GitfactsError::Git(format!("invalid signature time {}", time.seconds())))?;
    Ok(utc.with_timezone(&offset))
}
