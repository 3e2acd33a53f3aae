//! A windowing backend with no windows.
//!
//! Every window lives in a shared [`HeadlessWorld`] that records the
//! windowing calls made against it, so the embedding sequence can be
//! inspected from any thread. Used by the test suite and by hosts that run
//! without a native windowing system.

use crate::{
    Backend, Bounds, CallPump, Display, Error, GraphicObject, NativeHandle, Result, SetPosFlags,
    Surface, Wake, WindowStyle, Windowing, ZOrder,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Win32 `ERROR_INVALID_WINDOW_HANDLE`, reused for unknown windows.
pub const ERROR_INVALID_WINDOW_HANDLE: u32 = 1400;

const FIRST_HANDLE: isize = 0x0001_0000;

/// An event waiting in the display queue.
pub type HeadlessEvent = Box<dyn FnOnce() + Send>;

/// Polled by a modal loop; the loop returns once it yields `true`.
pub type ModalDone = Box<dyn Fn() -> bool + Send>;

const MODAL_POLL: Duration = Duration::from_millis(5);

enum Queued {
    Event(HeadlessEvent),
    Modal(ModalDone),
    /// Posted by the waker; runs the installed call pump.
    RunCalls,
}

impl Queued {
    fn is_event(&self) -> bool {
        !matches!(self, Queued::RunCalls)
    }
}

/// One windowing call, as recorded by [`HeadlessWorld::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowingCall {
    SetStyle {
        window: NativeHandle,
        style: WindowStyle,
    },
    SetParent {
        child: NativeHandle,
        parent: NativeHandle,
    },
    SetWindowPos {
        window: NativeHandle,
        z_order: ZOrder,
        bounds: Bounds,
        flags: SetPosFlags,
    },
}

/// What the world knows about the surface, mirrored after every change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub handle: NativeHandle,
    pub opened: bool,
    pub visible: bool,
    pub bounds: Bounds,
    pub disposed: bool,
}

#[derive(Default)]
pub struct HeadlessWorld {
    windows: Mutex<WindowTable>,
    queue: Mutex<EventQueue>,
    queue_cond: Condvar,
}

#[derive(Default)]
struct WindowTable {
    next_handle: isize,
    styles: HashMap<NativeHandle, WindowStyle>,
    parents: HashMap<NativeHandle, NativeHandle>,
    calls: Vec<WindowingCall>,
    surface: Option<SurfaceSnapshot>,
    focus: Option<NativeHandle>,
    displays_created: usize,
    displays_disposed: usize,
}

#[derive(Default)]
struct EventQueue {
    items: VecDeque<Queued>,
    dispatched: usize,
}

impl HeadlessWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a window with the given style and returns its handle.
    pub fn create_window(&self, style: WindowStyle) -> NativeHandle {
        let mut table = self.windows();
        if table.next_handle == 0 {
            table.next_handle = FIRST_HANDLE;
        }
        let handle = NativeHandle::from_raw(table.next_handle);
        table.next_handle += 0x10;
        table.styles.insert(handle, style);
        handle
    }

    pub fn calls(&self) -> Vec<WindowingCall> {
        self.windows().calls.clone()
    }

    pub fn style_of(&self, window: NativeHandle) -> Option<WindowStyle> {
        self.windows().styles.get(&window).copied()
    }

    pub fn parent_of(&self, window: NativeHandle) -> Option<NativeHandle> {
        self.windows().parents.get(&window).copied()
    }

    pub fn surface(&self) -> Option<SurfaceSnapshot> {
        self.windows().surface
    }

    /// Moves keyboard focus to `window`, or clears it.
    pub fn set_focus(&self, window: Option<NativeHandle>) {
        self.windows().focus = window;
    }

    pub fn focus(&self) -> Option<NativeHandle> {
        self.windows().focus
    }

    pub fn displays_created(&self) -> usize {
        self.windows().displays_created
    }

    pub fn displays_disposed(&self) -> usize {
        self.windows().displays_disposed
    }

    /// Queues an event for the display and wakes it.
    pub fn post_event(&self, event: impl FnOnce() + Send + 'static) {
        self.push(Queued::Event(Box::new(event)));
    }

    /// Queues an event that runs a nested dispatch loop, the way a message
    /// box or a menu does, until `done` returns `true`.
    pub fn post_modal(&self, done: impl Fn() -> bool + Send + 'static) {
        self.push(Queued::Modal(Box::new(done)));
    }

    pub fn pending_events(&self) -> usize {
        self.queue().items.iter().filter(|item| item.is_event()).count()
    }

    pub fn dispatched_events(&self) -> usize {
        self.queue().dispatched
    }

    fn wake(&self) {
        let mut queue = self.queue();
        if !queue.items.iter().any(|item| !item.is_event()) {
            queue.items.push_back(Queued::RunCalls);
        }
        drop(queue);
        self.queue_cond.notify_all();
    }

    fn push(&self, item: Queued) {
        self.queue().items.push_back(item);
        self.queue_cond.notify_all();
    }

    fn record(&self, call: WindowingCall) {
        trace!(?call, "headless windowing call");
        self.windows().calls.push(call);
    }

    fn windows(&self) -> MutexGuard<'_, WindowTable> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct HeadlessDisplay {
    world: Arc<HeadlessWorld>,
    message_window: Option<NativeHandle>,
    pump: Option<CallPump>,
}

impl HeadlessDisplay {
    pub fn with_world(world: Arc<HeadlessWorld>, message_window: bool) -> Self {
        world.windows().displays_created += 1;
        let message_window = message_window.then(|| world.create_window(WindowStyle::empty()));
        Self {
            world,
            message_window,
            pump: None,
        }
    }

    pub fn world(&self) -> &Arc<HeadlessWorld> {
        &self.world
    }

    fn run_modal(&mut self, done: &dyn Fn() -> bool) {
        trace!("entering headless modal loop");
        while !done() {
            if !self.read_and_dispatch() {
                let queue = self.world.queue();
                let _ = self
                    .world
                    .queue_cond
                    .wait_timeout_while(queue, MODAL_POLL, |q| q.items.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        trace!("left headless modal loop");
    }
}

impl Windowing for HeadlessDisplay {
    fn window_style(&self, window: NativeHandle) -> Result<WindowStyle> {
        self.world
            .style_of(window)
            .ok_or(Error::Windows(ERROR_INVALID_WINDOW_HANDLE))
    }

    fn set_window_style(&self, window: NativeHandle, style: WindowStyle) -> Result<()> {
        let mut table = self.world.windows();
        let slot = table
            .styles
            .get_mut(&window)
            .ok_or(Error::Windows(ERROR_INVALID_WINDOW_HANDLE))?;
        *slot = style;
        drop(table);
        self.world.record(WindowingCall::SetStyle { window, style });
        Ok(())
    }

    // The parent belongs to the host, so it is not required to be known here.
    fn set_parent(&self, child: NativeHandle, parent: NativeHandle) -> Result<()> {
        let mut table = self.world.windows();
        if !table.styles.contains_key(&child) || parent.is_null() {
            return Err(Error::Windows(ERROR_INVALID_WINDOW_HANDLE));
        }
        table.parents.insert(child, parent);
        drop(table);
        self.world.record(WindowingCall::SetParent { child, parent });
        Ok(())
    }

    fn set_window_pos(
        &self,
        window: NativeHandle,
        z_order: ZOrder,
        bounds: Bounds,
        flags: SetPosFlags,
    ) -> Result<()> {
        if self.world.style_of(window).is_none() {
            return Err(Error::Windows(ERROR_INVALID_WINDOW_HANDLE));
        }
        self.world.record(WindowingCall::SetWindowPos {
            window,
            z_order,
            bounds,
            flags,
        });
        Ok(())
    }
}

impl Display for HeadlessDisplay {
    fn new() -> Result<Self> {
        Ok(Self::with_world(HeadlessWorld::new(), false))
    }

    fn read_and_dispatch(&mut self) -> bool {
        let mut queue = self.world.queue();
        let Some(item) = queue.items.pop_front() else {
            return false;
        };
        if item.is_event() {
            queue.dispatched += 1;
        }
        drop(queue);
        match item {
            Queued::Event(event) => event(),
            Queued::Modal(done) => self.run_modal(&*done),
            Queued::RunCalls => {
                if let Some(pump) = self.pump.clone() {
                    pump();
                }
            }
        }
        true
    }

    fn sleep(&mut self) {
        let queue = self.world.queue();
        let _queue = self
            .world
            .queue_cond
            .wait_while(queue, |q| q.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn waker(&self) -> Arc<dyn Wake> {
        Arc::new(HeadlessWaker {
            world: Arc::clone(&self.world),
        })
    }

    fn install_call_pump(&mut self, pump: CallPump) {
        self.pump = Some(pump);
    }

    fn message_window(&self) -> Option<NativeHandle> {
        self.message_window
    }

    fn dispose(&mut self) {
        self.pump = None;
        debug!("headless display disposed");
        self.world.windows().displays_disposed += 1;
    }
}

struct HeadlessWaker {
    world: Arc<HeadlessWorld>,
}

impl Wake for HeadlessWaker {
    fn wake(&self) {
        self.world.wake();
    }
}

pub struct HeadlessSurface {
    world: Arc<HeadlessWorld>,
    state: SurfaceSnapshot,
    graphic_object: Option<GraphicObject>,
}

impl HeadlessSurface {
    pub fn new(display: &HeadlessDisplay, style: WindowStyle) -> Self {
        let world = Arc::clone(display.world());
        let handle = world.create_window(style);
        let surface = Self {
            world,
            state: SurfaceSnapshot {
                handle,
                ..Default::default()
            },
            graphic_object: None,
        };
        surface.publish();
        surface
    }

    pub fn with_graphic_object(mut self, object: GraphicObject) -> Self {
        self.graphic_object = Some(object);
        self
    }

    fn publish(&self) {
        self.world.windows().surface = Some(self.state);
    }
}

impl Surface for HeadlessSurface {
    fn native_handle(&self) -> NativeHandle {
        self.state.handle
    }

    fn open(&mut self) {
        self.state.opened = true;
        self.state.visible = true;
        self.publish();
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.visible = visible;
        self.publish();
    }

    fn is_visible(&self) -> bool {
        self.state.visible
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.state.bounds = bounds;
        self.publish();
    }

    fn bounds(&self) -> Bounds {
        self.state.bounds
    }

    fn is_focus_control(&self) -> bool {
        !self.state.disposed && self.world.focus() == Some(self.state.handle)
    }

    fn dispose(&mut self) {
        self.state.disposed = true;
        self.state.visible = false;
        self.publish();
        let mut table = self.world.windows();
        table.styles.remove(&self.state.handle);
        if table.focus == Some(self.state.handle) {
            table.focus = None;
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.disposed
    }

    fn graphic_object(&self) -> Option<GraphicObject> {
        self.graphic_object.clone()
    }
}

/// How the headless factory misbehaves, if at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// `create_surface` returns `None`.
    NoSurface,
    /// `create_surface` panics.
    Panic,
}

/// Backend that builds one [`HeadlessSurface`] inside a shared world.
#[derive(Clone)]
pub struct HeadlessBackend {
    world: Arc<HeadlessWorld>,
    style: WindowStyle,
    message_window: bool,
    fault: Fault,
    graphic_object: Option<GraphicObject>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            world: HeadlessWorld::new(),
            style: WindowStyle::POPUP
                | WindowStyle::CAPTION
                | WindowStyle::SYSMENU
                | WindowStyle::THICKFRAME
                | WindowStyle::MINIMIZEBOX
                | WindowStyle::MAXIMIZEBOX
                | WindowStyle::CLIPCHILDREN,
            message_window: true,
            fault: Fault::None,
            graphic_object: None,
        }
    }
}

impl HeadlessBackend {
    pub fn world(&self) -> Arc<HeadlessWorld> {
        Arc::clone(&self.world)
    }

    /// Initial style of the surface window.
    pub fn style(mut self, style: WindowStyle) -> Self {
        self.style = style;
        self
    }

    /// Whether the display exposes a message-dispatch window.
    pub fn message_window(mut self, enabled: bool) -> Self {
        self.message_window = enabled;
        self
    }

    pub fn fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    pub fn graphic_object(mut self, object: GraphicObject) -> Self {
        self.graphic_object = Some(object);
        self
    }
}

impl Backend for HeadlessBackend {
    type Display = HeadlessDisplay;
    type Surface = HeadlessSurface;

    fn create_display(&mut self) -> Result<HeadlessDisplay> {
        Ok(HeadlessDisplay::with_world(
            Arc::clone(&self.world),
            self.message_window,
        ))
    }

    fn create_surface(&mut self, display: &mut HeadlessDisplay) -> Option<HeadlessSurface> {
        match self.fault {
            Fault::None => {}
            Fault::NoSurface => return None,
            Fault::Panic => panic!("headless surface factory failed"),
        }
        let surface = HeadlessSurface::new(display, self.style);
        Some(match &self.graphic_object {
            Some(object) => surface.with_graphic_object(Arc::clone(object)),
            None => surface,
        })
    }
}
