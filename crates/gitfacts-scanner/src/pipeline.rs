//! Fact extraction pipeline: files × scanners → fact rows.

use gitfacts_core::{CancelToken, FactRow, File, FileEntry, GitfactsError, ObjectId};
use serde::Serialize;

use crate::filter::{FilePredicate, ScannerPredicate};
use crate::registry::Registry;

/// Every file and every fact of one commit.
#[derive(Debug, Clone, Serialize)]
pub struct Index {
    pub commit: ObjectId,
    pub files: Vec<FileEntry>,
    pub facts: Vec<FactRow>,
}

/// Dispatches the files of one commit to the registered scanners.
pub struct Pipeline<'r> {
    registry: &'r Registry,
    files: FilePredicate,
    scanners: ScannerPredicate,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            files: FilePredicate::any(),
            scanners: ScannerPredicate::any(),
        }
    }

    pub fn with_files(mut self, files: FilePredicate) -> Self {
        self.files = files;
        self
    }

    pub fn with_scanners(mut self, scanners: ScannerPredicate) -> Self {
        self.scanners = scanners;
        self
    }

    /// Scan `files` of `commit` and flatten every emitted fact into rows.
    ///
    /// Files are visited in iteration order and scanners in registration
    /// order, so the result order is reproducible. The first scanner failure
    /// aborts the run.
    pub fn run<'a, I>(&self, ctx: &CancelToken, commit: ObjectId, files: I) -> Result<Vec<FactRow>, GitfactsError>
    where
        I: IntoIterator<Item = Result<File<'a>, GitfactsError>>,
    {
        let mut rows = Vec::new();
        let mut visited = 0usize;
        for file in files {
            ctx.check()?;
            let file = file?;
            visited += 1;
            self.scan_file(ctx, commit, &file, &mut rows)?;
        }
        tracing::debug!(
            "pipeline: commit {} visited {} files, produced {} facts",
            commit,
            visited,
            rows.len()
        );
        Ok(rows)
    }

    /// Like [`run`](Self::run), but also records every file of the tree.
    pub fn index<'a, I>(&self, ctx: &CancelToken, commit: ObjectId, files: I) -> Result<Index, GitfactsError>
    where
        I: IntoIterator<Item = Result<File<'a>, GitfactsError>>,
    {
        let mut index = Index {
            commit,
            files: Vec::new(),
            facts: Vec::new(),
        };
        for file in files {
            ctx.check()?;
            let file = file?;
            index.files.push(file.entry());
            self.scan_file(ctx, commit, &file, &mut index.facts)?;
        }
        tracing::info!(
            "indexed commit {}: {} files, {} facts",
            commit,
            index.files.len(),
            index.facts.len()
        );
        Ok(index)
    }

    fn scan_file(
        &self,
        ctx: &CancelToken,
        commit: ObjectId,
        file: &File<'_>,
        rows: &mut Vec<FactRow>,
    ) -> Result<(), GitfactsError> {
        if !self.files.accepts(&file.name) {
            return Ok(());
        }
        for scanner in self.registry.iter() {
            let name = scanner.name();
            if !self.scanners.accepts(name) || !scanner.supports(file) {
                continue;
            }
            let facts = scanner
                .scan(ctx, file)
                .map_err(|err| err.in_scanner(name, &file.name))?;
            rows.extend(facts.into_iter().map(|fact| FactRow {
                commit,
                file_name: file.name.clone(),
                file_blob: file.blob,
                scanner: name.to_string(),
                key: fact.key,
                value: fact.value,
            }));
        }
        Ok(())
    }
}
