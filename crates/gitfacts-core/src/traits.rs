use crate::{GitfactsError, ObjectId};

// ── Traits ──────────────────────────────────────────────────────────────────

/// Read access to blob content by object id.
pub trait BlobSource {
    /// Return the raw bytes of the blob, or `NotFound` / `WrongKind`.
    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, GitfactsError>;
}
