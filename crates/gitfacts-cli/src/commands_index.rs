//! `gitfacts index` and `gitfacts scanners`.

use gitfacts_core::{CancelToken, GitfactsConfig, ObjectId};
use gitfacts_git::Repository;
use gitfacts_scanner::{Index, Pipeline, Registry};
use std::path::Path;

pub(crate) fn cmd_scanners(config: &GitfactsConfig) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config.scanners)?;
    for name in registry.names() {
        println!("{name}");
    }
    Ok(())
}

pub(crate) fn cmd_index(config: &GitfactsConfig, repo: &Path, commit: Option<&str>) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config.scanners)?;
    let index = build_index(&registry, repo, commit)?;
    println!("{}", serde_json::to_string_pretty(&index)?);
    Ok(())
}

/// Index `commit` (HEAD when unset) of the repository at `repo`.
pub(crate) fn build_index(registry: &Registry, repo: &Path, commit: Option<&str>) -> anyhow::Result<Index> {
    let repo = Repository::open(repo)?;
    let commit = match commit {
        Some(hash) => repo.resolve_commit(hash.parse::<ObjectId>()?)?.hash,
        None => repo.head()?,
    };
    let index = Pipeline::new(registry).index(&CancelToken::new(), commit, repo.files(commit)?)?;
    Ok(index)
}
