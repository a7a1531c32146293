//! `files`: one metadata fact per file.

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};
use serde_json::json;

pub const KEY_META: &str = "@files/meta";

/// Emits `@files/meta` with the path and git mode of every file.
pub struct FileMetaScanner;

impl crate::Scanner for FileMetaScanner {
    fn name(&self) -> &str {
        "files"
    }

    fn supports(&self, _file: &File<'_>) -> bool {
        true
    }

    fn scan(&self, _ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        Ok(vec![Fact::new(
            KEY_META,
            json!({ "name": file.name, "mode": file.mode.to_string() }),
        )])
    }
}
