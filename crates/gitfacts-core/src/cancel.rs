//! Cooperative cancellation shared by a query and the work it fans out to.
//!
//! A [`CancelToken`] is cheap to clone. Cancelling it flips a flag and
//! disconnects the [`done`](CancelToken::done) channel, so threads parked in a
//! `crossbeam_channel::select!` on it wake immediately. Child tokens are
//! cancelled together with their parent but never the other way round.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::GitfactsError;

#[derive(Clone)]
pub struct CancelToken {
    state: Arc<State>,
}

struct State {
    cancelled: AtomicBool,
    // Dropped on cancel; nothing is ever sent through it.
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    children: Mutex<Vec<Weak<State>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = crossbeam_channel::bounded(0);
        Self {
            state: Arc::new(State {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                done,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derive a token that is cancelled whenever this one is.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut children = lock(&self.state.children);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.state));
        }
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this token and every token derived from it. Idempotent.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), GitfactsError> {
        if self.is_cancelled() {
            Err(GitfactsError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A channel that becomes disconnected (and therefore always ready) on cancel.
    pub fn done(&self) -> &Receiver<()> {
        &self.state.done
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl State {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(lock(&self.trigger).take());
        let children = std::mem::take(&mut *lock(&self.children));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
