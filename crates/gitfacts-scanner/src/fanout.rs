//! Run several extraction routines over one syntax tree in parallel.
//!
//! Routines share a child of the caller's [`CancelToken`] and one
//! zero-capacity fact channel. The first routine to fail records its error
//! and cancels the group; the others stop at their next emission. The
//! channel only disconnects once every routine has returned and dropped its
//! sender, so no routine can ever send into a closed stream.

use crossbeam_channel::Sender;
use gitfacts_core::{CancelToken, Fact, GitfactsError};
use std::sync::Mutex;

use crate::syntax::SyntaxTree;

/// An extraction routine: walk `tree` and emit facts through `out`.
pub type Routine = fn(&SyntaxTree, &Emitter) -> Result<(), GitfactsError>;

/// Sending half handed to each routine.
pub struct Emitter {
    ctx: CancelToken,
    out: Sender<Fact>,
}

impl Emitter {
    /// Send one fact, or fail with `Cancelled` if the group is cancelled first.
    pub fn emit(&self, fact: Fact) -> Result<(), GitfactsError> {
        self.ctx.check()?;
        crossbeam_channel::select! {
            send(self.out, fact) -> sent => sent.map_err(|_| {
                GitfactsError::Internal("fact stream closed before routine finished".into())
            }),
            recv(self.ctx.done()) -> _ => Err(GitfactsError::Cancelled),
        }
    }

    /// Token of the group, for routines that poll between emissions.
    pub fn token(&self) -> &CancelToken {
        &self.ctx
    }
}

/// Everything the group produced: facts drained before the stream closed,
/// and the first failure, if any.
#[derive(Debug)]
pub struct Extraction {
    pub facts: Vec<Fact>,
    pub error: Option<GitfactsError>,
}

impl Extraction {
    pub fn into_result(self) -> Result<Vec<Fact>, GitfactsError> {
        match self.error {
            Some(err) => {
                tracing::debug!("extraction failed, discarding {} drained facts", self.facts.len());
                Err(err)
            }
            None => Ok(self.facts),
        }
    }
}

/// Run `routines` concurrently over `tree` and collect their facts.
pub fn run(parent: &CancelToken, tree: &SyntaxTree, routines: &[Routine]) -> Extraction {
    let ctx = parent.child();
    let first_error: Mutex<Option<GitfactsError>> = Mutex::new(None);
    let (tx, rx) = crossbeam_channel::bounded::<Fact>(0);
    let mut facts = Vec::new();

    std::thread::scope(|scope| {
        for routine in routines {
            let emitter = Emitter {
                ctx: ctx.clone(),
                out: tx.clone(),
            };
            let first_error = &first_error;
            scope.spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    routine(tree, &emitter)
                }))
                .unwrap_or_else(|_| Err(GitfactsError::Internal("extraction routine panicked".into())));
                if let Err(err) = result {
                    let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    drop(slot);
                    emitter.ctx.cancel();
                }
            });
        }
        drop(tx);
        facts.extend(rx.iter());
    });

    let error = first_error.into_inner().unwrap_or_else(|e| e.into_inner());
    Extraction { facts, error }
}
