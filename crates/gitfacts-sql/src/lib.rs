//! gitfacts-sql: SQLite surface for gitfacts.
//!
//! Registers two eponymous virtual tables on a `rusqlite` connection:
//!
//! - **commits** — history of the repository, newest author time first;
//!   `hash = ?` is a point lookup, `author_when <= ? / >= ?` bound the walk.
//! - **facts** — facts extracted from the tree of one commit; requires
//!   `commit_hash = ?` and narrows on `file_name` (`=`, `GLOB`) and
//!   `scanner` (`=`, `LIKE`).
//!
//! plus the `yaml_to_json(text)` and `read_blob(hash)` scalar functions.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use gitfacts_scanner::Registry;
//! use gitfacts_sql::{register, Environment};
//!
//! let conn = rusqlite::Connection::open_in_memory()?;
//! let _interrupt = register(&conn, Environment::new(".", Registry::builtin()?))?;
//! let count: i64 = conn.query_row("SELECT count(*) FROM commits", [], |r| r.get(0))?;
//! println!("{count} commits");
//! # Ok(())
//! # }
//! ```

pub mod commits;
pub mod facts;
pub mod functions;
pub mod plan;

use gitfacts_core::{CancelToken, GitfactsError};
use gitfacts_git::Repository;
use gitfacts_scanner::Registry;
use rusqlite::vtab::eponymous_only_module;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub use plan::{IndexPlan, PlanError};

/// What the tables and functions of one registration share.
pub struct Environment {
    repo: PathBuf,
    registry: Arc<Registry>,
    root: Mutex<CancelToken>,
}

impl Environment {
    pub fn new(repo: impl Into<PathBuf>, registry: Registry) -> Self {
        Self::with_registry(repo, Arc::new(registry))
    }

    pub fn with_registry(repo: impl Into<PathBuf>, registry: Arc<Registry>) -> Self {
        Self {
            repo: repo.into(),
            registry,
            root: Mutex::new(CancelToken::new()),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Open a fresh handle on the repository. Each query gets its own.
    pub fn open_repository(&self) -> Result<Repository, GitfactsError> {
        Repository::open(&self.repo)
    }

    /// A token for one query, cancelled by the next [`interrupt`](Self::interrupt).
    pub fn token(&self) -> CancelToken {
        self.root.lock().unwrap_or_else(PoisonError::into_inner).child()
    }

    /// Cancel every query started so far. Later queries are unaffected.
    pub fn interrupt(&self) {
        let previous = {
            let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *root)
        };
        previous.cancel();
        tracing::debug!("interrupted in-flight fact queries");
    }
}

/// Cancels in-flight `facts` queries from any thread.
#[derive(Clone)]
pub struct InterruptHandle {
    env: Arc<Environment>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.env.interrupt();
    }
}

/// Register the `commits` and `facts` tables and the scalar functions.
pub fn register(conn: &Connection, env: Environment) -> rusqlite::Result<InterruptHandle> {
    let env = Arc::new(env);
    conn.create_module(
        "commits",
        eponymous_only_module::<commits::CommitsTab>(),
        Some(Arc::clone(&env)),
    )?;
    conn.create_module(
        "facts",
        eponymous_only_module::<facts::FactsTab>(),
        Some(Arc::clone(&env)),
    )?;
    functions::register(conn, &env)?;
    tracing::debug!(
        "registered gitfacts tables for {} with {} scanners",
        env.repo.display(),
        env.registry.len()
    );
    Ok(InterruptHandle { env })
}
