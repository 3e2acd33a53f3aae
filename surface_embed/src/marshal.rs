//! Synchronous calls from any thread onto the creator thread.

use crate::{CallPump, Error, Result, Surface, Wake};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{mpsc, Arc};
use std::thread::{self, ThreadId};
use tracing::{error, trace};

pub(crate) type Call<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Host side of the call channel. Cheap to share; every call blocks until
/// the creator thread has run it.
pub(crate) struct Marshal<S> {
    calls: mpsc::Sender<Call<S>>,
    waker: Arc<dyn Wake>,
    creator: ThreadId,
}

/// Creator side of the call channel. Dropping it closes the container.
pub(crate) struct Inbox<S> {
    calls: mpsc::Receiver<Call<S>>,
}

/// A queued call whose result has not been collected yet.
pub(crate) struct Pending<R> {
    reply: mpsc::Receiver<std::thread::Result<R>>,
}

/// Creates both halves. Must be called on the creator thread.
pub(crate) fn channel<S>(waker: Arc<dyn Wake>) -> (Marshal<S>, Inbox<S>) {
    let (tx, rx) = mpsc::channel::<Call<S>>();
    let marshal = Marshal {
        calls: tx,
        waker,
        creator: thread::current().id(),
    };
    (marshal, Inbox { calls: rx })
}

impl<S: 'static> Marshal<S> {
    pub(crate) fn sync_exec<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if thread::current().id() == self.creator {
            return Err(Error::CreatorThread);
        }
        self.submit(f)?.wait()
    }

    /// Queues `f` and wakes the creator thread without waiting for it.
    pub(crate) fn submit<R, F>(&self, f: F) -> Result<Pending<R>>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel::<std::thread::Result<R>>(1);
        let call: Call<S> = Box::new(move |surface: &mut S| {
            let output = catch_unwind(AssertUnwindSafe(|| f(surface)));
            if output.is_err() {
                error!("marshaled call panicked on the creator thread");
            }
            // Nobody may be waiting any more; the result is dropped then.
            let _ = reply_tx.send(output);
        });

        self.calls.send(call).map_err(|_| Error::Closed)?;
        trace!("sync_exec: queued call, waking creator thread");
        self.waker.wake();
        Ok(Pending { reply: reply_rx })
    }
}

impl<R> Pending<R> {
    pub(crate) fn wait(self) -> Result<R> {
        match self.reply.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::CallPanicked),
            // The loop exited with our call still queued.
            Err(_) => Err(Error::Closed),
        }
    }
}

impl<S> Inbox<S> {
    pub(crate) fn try_next(&self) -> Option<Call<S>> {
        self.calls.try_recv().ok()
    }

    /// Drops every queued call; their callers get [`Error::Closed`].
    pub(crate) fn discard(&self) -> usize {
        let mut dropped = 0;
        while self.try_next().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// Builds the pump a [`Display`](crate::Display) runs when its wake is
/// delivered. It backs off while a call already holds the surface, and
/// stops once the surface is disposed.
pub(crate) fn pump<S: Surface + 'static>(
    surface: Rc<RefCell<S>>,
    inbox: Rc<Inbox<S>>,
) -> CallPump {
    Rc::new(move || {
        let Ok(mut surface) = surface.try_borrow_mut() else {
            trace!("call pump re-entered, leaving calls to the outer loop");
            return;
        };
        while !surface.is_disposed() {
            let Some(call) = inbox.try_next() else {
                break;
            };
            call(&mut *surface);
        }
    })
}
