use crate::marshal::Inbox;
use crate::{Display, Handshake, Surface};
use core::sync::atomic::{AtomicU8, Ordering};
use std::cell::RefCell;
use tracing::{debug, trace};

/// Where the creator thread's message loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Dispatching UI events and marshaled calls.
    Running = 1,
    /// Nothing was pending; the thread is parked in [`Display::sleep`].
    IdleWait = 2,
    /// The surface is gone and the display has been released.
    Disposed = 3,
}

impl LoopState {
    pub(crate) fn load(cell: &AtomicU8) -> Option<LoopState> {
        match cell.load(Ordering::Acquire) {
            1 => Some(LoopState::Running),
            2 => Some(LoopState::IdleWait),
            3 => Some(LoopState::Disposed),
            _ => None,
        }
    }

    fn store(self, cell: &AtomicU8) {
        cell.store(self as u8, Ordering::Release);
    }
}

/// Events dispatched in a row before a waiting marshaled call gets a turn.
const EVENT_BUDGET: u32 = 32;

/// Pumps events until the surface is disposed, then releases the display.
///
/// Calls normally run from the display's call pump, in queue order with
/// the events around them. Calls the pump did not reach run here: after
/// the event queue empties, or after [`EVENT_BUDGET`] events in a row. Calls still queued once the surface is gone
/// are dropped, which their callers see as [`Error::Closed`](crate::Error::Closed).
pub(crate) fn run<D, S>(
    display: &mut D,
    surface: &RefCell<S>,
    inbox: &Inbox<S>,
    handshake: &Handshake,
    state: &AtomicU8,
) where
    D: Display,
    S: Surface,
{
    let mut current = LoopState::Running;
    current.store(state);
    debug!("message loop started");

    let mut budget = EVENT_BUDGET;
    loop {
        let next = step(display, surface, inbox, handshake, state, &mut budget);
        if next != current {
            trace!(from = ?current, to = ?next, "message loop transition");
            current = next;
        }
        if current == LoopState::Disposed {
            break;
        }
    }

    let dropped = inbox.discard();
    if dropped != 0 {
        debug!(dropped, "dropped calls queued after the surface was disposed");
    }
    display.dispose();
    current.store(state);
    debug!("message loop finished, display disposed");
}

fn step<D, S>(
    display: &mut D,
    surface: &RefCell<S>,
    inbox: &Inbox<S>,
    handshake: &Handshake,
    state: &AtomicU8,
    budget: &mut u32,
) -> LoopState
where
    D: Display,
    S: Surface,
{
    if surface.borrow().is_disposed() {
        return LoopState::Disposed;
    }

    if *budget > 0 && display.read_and_dispatch() {
        *budget -= 1;
        return LoopState::Running;
    }

    let starved = *budget == 0;
    *budget = EVENT_BUDGET;

    if let Some(call) = inbox.try_next() {
        call(&mut *surface.borrow_mut());
        return LoopState::Running;
    }

    if starved {
        // Events are most likely still pending.
        return LoopState::Running;
    }

    // Nothing queued. Raise the signal again for anyone who missed it.
    handshake.notify();
    LoopState::IdleWait.store(state);
    display.sleep();
    LoopState::Running.store(state);
    LoopState::IdleWait
}
