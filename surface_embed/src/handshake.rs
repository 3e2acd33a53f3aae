//! One-shot creation signal between the host thread and the creator thread.

use crate::{Error, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Fires once when surface construction has finished, successfully or not.
///
/// The first call to [`succeed`](Handshake::succeed) or
/// [`fail`](Handshake::fail) fixes the outcome. Later calls, and
/// [`notify`](Handshake::notify), only wake waiters again.
#[derive(Default)]
pub struct Handshake {
    state: Mutex<HandshakeState>,
    cond: Condvar,
}

#[derive(Default)]
struct HandshakeState {
    outcome: Option<core::result::Result<(), String>>,
    notifications: u64,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call decided the outcome.
    pub fn succeed(&self) -> bool {
        self.complete(Ok(()))
    }

    /// Returns `true` if this call decided the outcome.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.complete(Err(reason.into()))
    }

    /// Wakes waiters without touching the outcome.
    pub fn notify(&self) {
        let mut state = self.lock();
        state.notifications += 1;
        drop(state);
        self.cond.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Number of times the signal has been raised, outcome or not.
    pub fn notifications(&self) -> u64 {
        self.lock().notifications
    }

    /// Blocks until an outcome is set. A failed construction comes back as
    /// [`Error::Construction`].
    pub fn wait(&self) -> Result<()> {
        let state = self
            .cond
            .wait_while(self.lock(), |state| state.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match &state.outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(Error::Construction(reason.clone())),
            None => unreachable!("wait_while returned without an outcome"),
        }
    }

    fn complete(&self, outcome: core::result::Result<(), String>) -> bool {
        let mut state = self.lock();
        state.notifications += 1;
        let decided = state.outcome.is_none();
        if decided {
            state.outcome = Some(outcome);
        }
        drop(state);
        self.cond.notify_all();
        decided
    }

    fn lock(&self) -> MutexGuard<'_, HandshakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fails the handshake when dropped, unless something else completed it
/// first. Held by the creator thread so an unwinding thread still releases
/// the host.
pub(crate) struct FailOnDrop<'a> {
    pub(crate) handshake: &'a Handshake,
}

impl Drop for FailOnDrop<'_> {
    fn drop(&mut self) {
        if self
            .handshake
            .fail("creator thread exited before the surface was embedded")
        {
            tracing::error!("creator thread exited without completing the handshake");
        }
    }
}
