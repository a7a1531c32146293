//! Scanner trait: the capability every fact extractor provides.

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};

/// A pluggable extractor that recognizes files and emits facts from them.
///
/// Scanners are shared across queries, so they must be `Send + Sync` and
/// keep no per-scan state.
pub trait Scanner: Send + Sync {
    /// Unique registry name (e.g., "docker/dockerfile").
    fn name(&self) -> &str;

    /// Whether this scanner wants `file`. Runs once per file per scanner, so it
    /// must be cheap and must not read the blob.
    fn supports(&self, file: &File<'_>) -> bool;

    /// Extract facts from `file`. Long-running scanners should poll `ctx`.
    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError>;
}
