//! `docker/dockerfile`: structural extraction from Dockerfiles.
//!
//! The file is parsed once into a [`SyntaxTree`](crate::syntax::SyntaxTree),
//! then every routine in [`ROUTINES`] runs concurrently over it through
//! [`fanout::run`](crate::fanout::run).

pub mod extract;
pub mod parser;

use gitfacts_core::{CancelToken, Fact, File, GitfactsError};

use crate::fanout::{self, Routine};

/// Extraction routines, run concurrently over each parsed Dockerfile.
pub const ROUTINES: &[Routine] = &[extract::base_images, extract::exposed_ports, extract::labels];

/// Emits base images, exposed ports and labels of Dockerfiles.
pub struct DockerfileScanner;

impl crate::Scanner for DockerfileScanner {
    fn name(&self) -> &str {
        "docker/dockerfile"
    }

    fn supports(&self, file: &File<'_>) -> bool {
        file.mode.is_file()
            && (file.name.ends_with("Dockerfile") || file.base_name().starts_with("Dockerfile."))
    }

    fn scan(&self, ctx: &CancelToken, file: &File<'_>) -> Result<Vec<Fact>, GitfactsError> {
        ctx.check()?;
        let source = crate::scanners::text(file.contents()?);
        let tree = parser::parse(&source);
        tracing::debug!(
            "{}: parsed {} instructions",
            file.name,
            tree.root().children().len()
        );
        fanout::run(ctx, &tree, ROUTINES).into_result()
    }
}
