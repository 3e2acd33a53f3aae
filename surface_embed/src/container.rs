use crate::event_loop::{self, LoopState};
use crate::handshake::FailOnDrop;
use crate::marshal::{self, Marshal};
use crate::{
    Backend, Bounds, ContainerHooks, DefaultHooks, Display, EmbeddingMode, Error, GraphicObject,
    Handshake, NativeHandle, Result, SetPosFlags, Surface, WindowStyle, ZOrder,
};
use core::any::Any;
use core::sync::atomic::AtomicU8;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info_span, warn};

const DEFAULT_THREAD_NAME: &str = "GraphicContainer";

/// Hosts one backend surface inside a foreign window.
///
/// The surface is created, embedded and pumped on a dedicated creator
/// thread. That thread is the only one that ever touches the surface;
/// every control operation here blocks until the creator thread has run it.
pub struct GraphicContainer<B: Backend, H: ContainerHooks = DefaultHooks> {
    backend: Mutex<Option<B>>,
    mode: EmbeddingMode,
    thread_name: String,
    host: OnceLock<NativeHandle>,
    shared: Arc<Shared<B::Surface>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    hooks: H,
}

/// State published by the creator thread.
struct Shared<S> {
    handshake: Handshake,
    native: OnceLock<NativeHandle>,
    graphic_object: OnceLock<GraphicObject>,
    marshal: OnceLock<Marshal<S>>,
    loop_state: AtomicU8,
}

static_assertions::assert_impl_all!(
    GraphicContainer<crate::headless::HeadlessBackend>: Send, Sync
);

pub struct ContainerBuilder<B, H = DefaultHooks> {
    backend: B,
    mode: EmbeddingMode,
    thread_name: Option<String>,
    hooks: H,
}

impl<B: Backend> ContainerBuilder<B, DefaultHooks> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            mode: EmbeddingMode::default(),
            thread_name: None,
            hooks: DefaultHooks,
        }
    }
}

impl<B: Backend, H: ContainerHooks> ContainerBuilder<B, H> {
    pub fn mode(mut self, mode: EmbeddingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn hooks<H2: ContainerHooks>(self, hooks: H2) -> ContainerBuilder<B, H2> {
        ContainerBuilder {
            backend: self.backend,
            mode: self.mode,
            thread_name: self.thread_name,
            hooks,
        }
    }

    pub fn build(self) -> GraphicContainer<B, H> {
        GraphicContainer {
            backend: Mutex::new(Some(self.backend)),
            mode: self.mode,
            thread_name: self
                .thread_name
                .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_string()),
            host: OnceLock::new(),
            shared: Arc::new(Shared {
                handshake: Handshake::new(),
                native: OnceLock::new(),
                graphic_object: OnceLock::new(),
                marshal: OnceLock::new(),
                loop_state: AtomicU8::new(0),
            }),
            thread: Mutex::new(None),
            hooks: self.hooks,
        }
    }
}

impl<B: Backend> GraphicContainer<B, DefaultHooks> {
    pub fn new(backend: B) -> Self {
        ContainerBuilder::new(backend).build()
    }

    pub fn builder(backend: B) -> ContainerBuilder<B, DefaultHooks> {
        ContainerBuilder::new(backend)
    }
}

impl<B: Backend, H: ContainerHooks> GraphicContainer<B, H> {
    /// Creates the surface on a new creator thread and embeds it under
    /// `host`. Blocks until the surface is embedded or construction failed.
    ///
    /// On failure nothing is published and
    /// [`native_window_handle`](Self::native_window_handle) stays null.
    pub fn initialize(&self, host: NativeHandle) -> Result<()> {
        if host.is_null() {
            return Err(Error::InvalidHostHandle);
        }
        self.host.set(host).map_err(|_| Error::AlreadyInitialized)?;
        let backend = self
            .backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyInitialized)?;

        let shared = Arc::clone(&self.shared);
        let mode = self.mode;
        let span = info_span!("graphic_container", %host, ?mode);
        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let _entered = span.entered();
                creator_main(backend, host, mode, &shared);
            })
            .map_err(|e| {
                self.shared.handshake.fail("creator thread could not be spawned");
                Error::Spawn(e)
            })?;
        *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread);

        match self.shared.handshake.wait() {
            Ok(()) => {
                debug!(%host, handle = %self.native_window_handle(), "surface embedded");
                Ok(())
            }
            Err(e) => {
                warn!(%host, error = %e, "graphic container failed to initialize");
                Err(e)
            }
        }
    }

    /// Hides and disposes the surface. The creator thread then leaves its
    /// message loop and releases the display.
    pub fn destroy(&self) -> Result<()> {
        self.sync_exec(|surface| {
            surface.set_visible(false);
            surface.dispose();
        })
    }

    /// Applies visibility and bounds in one step on the creator thread.
    pub fn set_size_and_visibility(
        &self,
        visible: bool,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let bounds = Bounds::new(x, y, width, height);
        self.sync_exec(move |surface| {
            surface.set_visible(visible);
            surface.set_bounds(bounds);
        })
    }

    pub fn has_focus(&self) -> Result<bool> {
        self.sync_exec(|surface| surface.is_focus_control())
    }

    pub fn bounds(&self) -> Result<Bounds> {
        self.sync_exec(|surface| surface.bounds())
    }

    pub fn is_visible(&self) -> Result<bool> {
        self.sync_exec(|surface| surface.is_visible())
    }

    /// Runs `f` against the surface on the creator thread and returns its
    /// result. Fails with [`Error::CreatorThread`] when called from the
    /// creator thread itself.
    pub fn sync_exec<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut B::Surface) -> R + Send + 'static,
        R: Send + 'static,
    {
        match self.shared.marshal.get() {
            Some(marshal) => marshal.sync_exec(f),
            None if self.shared.handshake.is_complete() => Err(Error::Closed),
            None => Err(Error::NotInitialized),
        }
    }

    /// Waits for the creator thread to finish. Only returns once the
    /// surface has been disposed, so call [`destroy`](Self::destroy) first.
    pub fn join(&self) -> Result<()> {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(thread) = thread else {
            return Ok(());
        };
        if thread.thread().id() == thread::current().id() {
            *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread);
            return Err(Error::CreatorThread);
        }
        thread.join().map_err(|_| Error::CreatorPanicked)
    }

    /// The embedded window handle, or null if initialization has not
    /// succeeded.
    pub fn native_window_handle(&self) -> NativeHandle {
        self.shared.native.get().copied().unwrap_or(NativeHandle::NULL)
    }

    pub fn host_handle(&self) -> NativeHandle {
        self.host.get().copied().unwrap_or(NativeHandle::NULL)
    }

    pub fn graphic_object(&self) -> Option<GraphicObject> {
        self.shared.graphic_object.get().cloned()
    }

    /// `None` until the message loop has started.
    pub fn loop_state(&self) -> Option<LoopState> {
        LoopState::load(&self.shared.loop_state)
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn is_remote_managed(&self) -> bool {
        self.hooks.is_remote_managed()
    }

    pub fn has_measure_override(&self) -> bool {
        self.hooks.has_measure_override()
    }

    pub fn start_measure_override(&self, width: i32, height: i32) {
        self.hooks.start_measure_override(width, height);
    }

    pub fn measure_override_width(&self) -> i32 {
        self.hooks.measure_override_width()
    }

    pub fn measure_override_height(&self) -> i32 {
        self.hooks.measure_override_height()
    }

    pub fn end_measure_override(&self) {
        self.hooks.end_measure_override();
    }

    pub fn has_wnd_proc_handler(&self) -> bool {
        self.hooks.has_wnd_proc_handler()
    }

    pub fn wnd_proc_handler(
        &self,
        window: NativeHandle,
        msg: u32,
        wparam: usize,
        lparam: isize,
        handled: bool,
    ) -> bool {
        self.hooks
            .wnd_proc_handler(window, msg, wparam, lparam, handled)
    }
}

/// Body of the creator thread.
fn creator_main<B: Backend>(
    mut backend: B,
    host: NativeHandle,
    mode: EmbeddingMode,
    shared: &Shared<B::Surface>,
) {
    let _guard = FailOnDrop {
        handshake: &shared.handshake,
    };

    let mut display = match guarded(|| backend.create_display()) {
        Ok(display) => display,
        Err(e) => {
            error!(error = %e, "failed to create display");
            shared.handshake.fail(failure_reason(e));
            return;
        }
    };

    let (surface, handle) = match guarded(|| embed(&mut backend, &mut display, host, mode)) {
        Ok(embedded) => embedded,
        Err(e) => {
            error!(error = %e, "failed to embed surface");
            display.dispose();
            shared.handshake.fail(failure_reason(e));
            return;
        }
    };

    let (marshal, inbox) = marshal::channel(display.waker());
    let surface = Rc::new(RefCell::new(surface));
    let inbox = Rc::new(inbox);
    display.install_call_pump(marshal::pump(Rc::clone(&surface), Rc::clone(&inbox)));

    let _ = shared.native.set(handle);
    if let Some(object) = surface.borrow().graphic_object() {
        let _ = shared.graphic_object.set(object);
    }
    let _ = shared.marshal.set(marshal);
    shared.handshake.succeed();

    event_loop::run(
        &mut display,
        &surface,
        &inbox,
        &shared.handshake,
        &shared.loop_state,
    );
}

/// Creates the surface and puts it under `host`. Returns the surface and
/// the handle that was reparented.
fn embed<B: Backend>(
    backend: &mut B,
    display: &mut B::Display,
    host: NativeHandle,
    mode: EmbeddingMode,
) -> Result<(B::Surface, NativeHandle)> {
    let mut surface = backend
        .create_surface(display)
        .ok_or_else(|| Error::Construction("surface factory returned no surface".into()))?;

    let embedded = match mode {
        EmbeddingMode::Direct => embed_direct(display, &mut surface, host),
        EmbeddingMode::MessageWindow => embed_message_window(display, &mut surface, host),
    };
    match embedded {
        Ok(handle) => Ok((surface, handle)),
        Err(e) => {
            surface.dispose();
            Err(e)
        }
    }
}

fn embed_direct<D: Display, S: Surface>(
    display: &D,
    surface: &mut S,
    host: NativeHandle,
) -> Result<NativeHandle> {
    surface.open();
    let handle = surface.native_handle();
    if handle.is_null() {
        return Err(Error::Construction("surface has no native window".into()));
    }
    let style = display.window_style(handle)?;
    display.set_window_style(handle, style.as_embedded_child())?;
    display.set_parent(handle, host)?;
    debug!(%handle, "reparented surface window");
    Ok(handle)
}

fn embed_message_window<D: Display, S: Surface>(
    display: &D,
    surface: &mut S,
    host: NativeHandle,
) -> Result<NativeHandle> {
    let handle = display.message_window().ok_or_else(|| {
        Error::Construction("display does not expose a message window".into())
    })?;
    let style = display.window_style(handle)?;
    display.set_window_style(handle, style | WindowStyle::CHILD)?;
    display.set_parent(handle, host)?;

    let keep = SetPosFlags::NOMOVE | SetPosFlags::NOSIZE;
    display.set_window_pos(surface.native_handle(), ZOrder::Top, Bounds::default(), keep)?;
    display.set_window_pos(handle, ZOrder::After(host), Bounds::default(), keep)?;
    surface.open();
    debug!(%handle, "reparented display message window");
    Ok(handle)
}

/// The text handed to the handshake, which wraps it in
/// [`Error::Construction`] again on the host side.
fn failure_reason(e: Error) -> String {
    match e {
        Error::Construction(reason) => reason,
        other => other.to_string(),
    }
}

/// Runs a construction step, turning a panic into a construction error.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(Error::Construction(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "surface construction panicked".to_string()
    }
}
