use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::{BlobSource, GitfactsError};

// ── Object Ids ──────────────────────────────────────────────────────────────

const OID_LEN: usize = 20;

/// Content hash of a git object (SHA-1, 20 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_LEN]);

impl ObjectId {
    /// Raw length in bytes.
    pub const LEN: usize = OID_LEN;

    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// True for exactly 40 hex digits, in either case.
    pub fn is_hash(s: &str) -> bool {
        s.len() == Self::LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = GitfactsError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            GitfactsError::Validation(format!("object id must be 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }
}

impl std::str::FromStr for ObjectId {
    type Err = GitfactsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_hash(s) {
            return Err(GitfactsError::Validation(format!("invalid hash {s:?}")));
        }
        let mut raw = [0u8; Self::LEN];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| GitfactsError::Validation(format!("invalid hash {s:?}: {e}")))?;
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Commits ─────────────────────────────────────────────────────────────────

/// One commit as exposed by the `commits` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    pub hash: ObjectId,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_when: DateTime<FixedOffset>,
    /// Number of parent commits (0 for a root, 2+ for merges).
    pub parents: usize,
}

// ── Files ───────────────────────────────────────────────────────────────────

/// Git file mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Submodule,
}

impl FileMode {
    /// Map a raw tree entry mode. Trees themselves have no `FileMode`.
    pub fn from_raw(mode: u32) -> Option<Self> {
        match mode {
            0o100644 | 0o100664 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Submodule),
            _ => None,
        }
    }

    /// Regular or executable file content (not a link or submodule).
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "0100644"),
            Self::Executable => write!(f, "0100755"),
            Self::Symlink => write!(f, "0120000"),
            Self::Submodule => write!(f, "0160000"),
        }
    }
}

/// A file in the tree of one commit, with lazy access to its content.
pub struct File<'a> {
    /// Slash-separated path within the tree.
    pub name: String,
    pub blob: ObjectId,
    pub mode: FileMode,
    source: &'a dyn BlobSource,
}

impl<'a> File<'a> {
    pub fn new(name: impl Into<String>, blob: ObjectId, mode: FileMode, source: &'a dyn BlobSource) -> Self {
        Self {
            name: name.into(),
            blob,
            mode,
            source,
        }
    }

    /// Read the full blob content.
    pub fn contents(&self) -> Result<Vec<u8>, GitfactsError> {
        self.source.read_blob(&self.blob)
    }

    /// Last path component.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn entry(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            blob: self.blob,
            mode: self.mode,
        }
    }
}

impl fmt::Debug for File<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("blob", &self.blob)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Owned identity of a file, detached from any blob source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub blob: ObjectId,
    pub mode: FileMode,
}

// ── Facts ───────────────────────────────────────────────────────────────────

/// One observation emitted by a scanner, keyed `@<domain>/<subsystem>/<kind>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub key: String,
    pub value: serde_json::Value,
}

impl Fact {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A fact together with the commit, file and scanner it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub commit: ObjectId,
    pub file_name: String,
    pub file_blob: ObjectId,
    pub scanner: String,
    pub key: String,
    pub value: serde_json::Value,
}
