//! The seam between the container and a concrete windowing backend.
//!
//! Everything here except [`Wake`] and [`Backend`] itself lives on the
//! creator thread and is never touched from anywhere else.

use crate::{Bounds, NativeHandle, Result, SetPosFlags, WindowStyle, ZOrder};
use core::any::Any;
use std::rc::Rc;
use std::sync::Arc;

/// Whatever the backend wants to hand the host alongside the native handle.
pub type GraphicObject = Arc<dyn Any + Send + Sync>;

/// Runs every marshaled call that is waiting for the creator thread.
pub type CallPump = Rc<dyn Fn()>;

/// Native window-level operations used while embedding a surface.
pub trait Windowing {
    fn window_style(&self, window: NativeHandle) -> Result<WindowStyle>;

    fn set_window_style(&self, window: NativeHandle, style: WindowStyle) -> Result<()>;

    fn set_parent(&self, child: NativeHandle, parent: NativeHandle) -> Result<()>;

    fn set_window_pos(
        &self,
        window: NativeHandle,
        z_order: ZOrder,
        bounds: Bounds,
        flags: SetPosFlags,
    ) -> Result<()>;
}

/// Wakes a sleeping [`Display`]. Callable from any thread.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

/// The event context of the creator thread.
pub trait Display: Windowing + Sized {
    /// Creates a fresh event context bound to the calling thread.
    fn new() -> Result<Self>;

    /// Dispatches at most one pending event. Returns `false` if nothing
    /// was pending.
    fn read_and_dispatch(&mut self) -> bool;

    /// Blocks the thread until an event arrives or a [`Wake`] fires.
    fn sleep(&mut self);

    fn waker(&self) -> Arc<dyn Wake>;

    /// Hands the display a way to run queued calls from inside its own
    /// dispatching, including nested loops it does not control. A display
    /// that keeps this should invoke it whenever its [`Wake`] is delivered.
    fn install_call_pump(&mut self, _pump: CallPump) {}

    /// The display's internal message-dispatch window, if the backend has
    /// one. Needed by [`EmbeddingMode::MessageWindow`].
    fn message_window(&self) -> Option<NativeHandle> {
        None
    }

    /// Releases the event context. Called once, after the surface is gone.
    fn dispose(&mut self);
}

/// The window being embedded.
pub trait Surface {
    fn native_handle(&self) -> NativeHandle;

    /// Shows the surface for the first time.
    fn open(&mut self);

    fn set_visible(&mut self, visible: bool);

    fn is_visible(&self) -> bool;

    fn set_bounds(&mut self, bounds: Bounds);

    fn bounds(&self) -> Bounds;

    /// Whether the surface, or a control inside it, has keyboard focus.
    fn is_focus_control(&self) -> bool;

    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;

    fn graphic_object(&self) -> Option<GraphicObject> {
        None
    }
}

/// Builds the display and surface on the creator thread.
///
/// The backend value is moved onto the creator thread by
/// [`GraphicContainer::initialize`](crate::GraphicContainer::initialize).
pub trait Backend: Send + 'static {
    type Display: Display + 'static;
    type Surface: Surface + 'static;

    fn create_display(&mut self) -> Result<Self::Display> {
        Self::Display::new()
    }

    /// Returning `None` aborts initialization with a construction error.
    fn create_surface(&mut self, display: &mut Self::Display) -> Option<Self::Surface>;
}

/// Which native window ends up parented under the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Open the surface, strip its frame and reparent its own window.
    #[default]
    Direct,
    /// Reparent the display's message-dispatch window and raise the
    /// surface above it.
    MessageWindow,
}
