//! gitfacts-scanner: fact extraction for gitfacts.
//!
//! Turns the files of one commit into fact rows. Each file is offered to
//! every registered scanner; scanners that claim it read the blob and emit
//! facts keyed `@<domain>/<subsystem>/<kind>`.
//!
//! # Architecture
//!
//! - **scanner** — Trait every scanner implements (`supports` + `scan`)
//! - **registry** — Ordered, duplicate-free set of scanners built at startup
//! - **filter** — File-name (exact/glob) and scanner-name (exact/LIKE) predicates
//! - **pipeline** — Files × scanners dispatch, flattening facts into rows
//! - **syntax** — Owned syntax trees with post-order walk and find
//! - **fanout** — Concurrent extraction routines with shared cancellation
//! - **scanners** — Built-in scanners (files, Dockerfile, go.mod, npm, Cargo)

pub mod fanout;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod scanner;
pub mod scanners;
pub mod syntax;

pub use filter::{FilePredicate, FileRule, ScannerPredicate, ScannerRule};
pub use pipeline::{Index, Pipeline};
pub use registry::Registry;
pub use scanner::Scanner;
