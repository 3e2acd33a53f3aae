use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use surface_embed::headless::{Fault, HeadlessBackend, HeadlessWorld, WindowingCall};
use surface_embed::{
    Bounds, ContainerHooks, EmbeddingMode, Error, GraphicContainer, LoopState, NativeHandle,
    SetPosFlags, WindowStyle, ZOrder,
};
use tracing_subscriber::EnvFilter;

const HOST: NativeHandle = NativeHandle::from_raw(0x1000);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shut_down(container: &GraphicContainer<HeadlessBackend, impl ContainerHooks>) {
    container.destroy().unwrap();
    container.join().unwrap();
    assert_eq!(container.loop_state(), Some(LoopState::Disposed));
}

#[test]
fn direct_mode_strips_frame_and_reparents_surface() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::new(backend);

    container.initialize(HOST).unwrap();

    let handle = container.native_window_handle();
    assert!(!handle.is_null());
    assert_eq!(container.host_handle(), HOST);
    let surface = world.surface().unwrap();
    assert_eq!(surface.handle, handle);
    assert!(surface.opened);

    let style = world.style_of(handle).unwrap();
    assert!(style.contains(WindowStyle::CHILD));
    assert!(!style.intersects(WindowStyle::TOP_LEVEL_DECORATIONS));
    assert!(style.contains(WindowStyle::CLIPCHILDREN));
    assert_eq!(world.parent_of(handle), Some(HOST));
    assert_eq!(
        world.calls(),
        vec![
            WindowingCall::SetStyle {
                window: handle,
                style,
            },
            WindowingCall::SetParent {
                child: handle,
                parent: HOST,
            },
        ]
    );

    shut_down(&container);
}

#[test]
fn message_window_mode_embeds_display_window() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::builder(backend)
        .mode(EmbeddingMode::MessageWindow)
        .build();

    container.initialize(HOST).unwrap();

    let handle = container.native_window_handle();
    let surface = world.surface().unwrap();
    assert_ne!(handle, surface.handle);
    assert!(surface.opened);
    assert_eq!(world.parent_of(handle), Some(HOST));
    assert_eq!(world.parent_of(surface.handle), None);

    let keep = SetPosFlags::NOMOVE | SetPosFlags::NOSIZE;
    assert_eq!(
        world.calls(),
        vec![
            WindowingCall::SetStyle {
                window: handle,
                style: WindowStyle::CHILD,
            },
            WindowingCall::SetParent {
                child: handle,
                parent: HOST,
            },
            WindowingCall::SetWindowPos {
                window: surface.handle,
                z_order: ZOrder::Top,
                bounds: Bounds::default(),
                flags: keep,
            },
            WindowingCall::SetWindowPos {
                window: handle,
                z_order: ZOrder::After(HOST),
                bounds: Bounds::default(),
                flags: keep,
            },
        ]
    );

    shut_down(&container);
}

#[test]
fn missing_surface_fails_without_hanging() {
    init_tracing();
    let backend = HeadlessBackend::default().fault(Fault::NoSurface);
    let world = backend.world();
    let container = GraphicContainer::new(backend);

    let result = container.initialize(HOST);

    match result {
        Err(e @ Error::Construction(_)) => assert_eq!(
            e.to_string(),
            "failed to construct the embedded surface: surface factory returned no surface"
        ),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(container.native_window_handle(), NativeHandle::NULL);
    assert!(world.calls().is_empty());
    assert_eq!(world.displays_created(), 1);
    assert_eq!(world.displays_disposed(), 1);
    assert!(matches!(container.has_focus(), Err(Error::Closed)));
    container.join().unwrap();
}

#[test]
fn panicking_factory_is_a_construction_failure() {
    init_tracing();
    let container = GraphicContainer::new(HeadlessBackend::default().fault(Fault::Panic));

    let result = container.initialize(HOST);

    match result {
        Err(Error::Construction(reason)) => assert!(reason.contains("factory failed")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(container.native_window_handle().is_null());
    container.join().unwrap();
}

#[test]
fn message_window_mode_needs_a_message_window() {
    init_tracing();
    let backend = HeadlessBackend::default().message_window(false);
    let world = backend.world();
    let container = GraphicContainer::builder(backend)
        .mode(EmbeddingMode::MessageWindow)
        .build();

    assert!(matches!(
        container.initialize(HOST),
        Err(Error::Construction(_))
    ));
    // The surface was built, then thrown away.
    assert!(world.surface().unwrap().disposed);
    assert_eq!(world.displays_disposed(), 1);
}

#[test]
fn lifecycle_misuse_is_reported() {
    init_tracing();
    let container = GraphicContainer::new(HeadlessBackend::default());
    assert!(matches!(container.has_focus(), Err(Error::NotInitialized)));
    assert!(matches!(container.destroy(), Err(Error::NotInitialized)));
    assert!(matches!(
        container.initialize(NativeHandle::NULL),
        Err(Error::InvalidHostHandle)
    ));
    assert_eq!(container.loop_state(), None);

    container.initialize(HOST).unwrap();
    assert!(matches!(
        container.initialize(HOST),
        Err(Error::AlreadyInitialized)
    ));

    shut_down(&container);
    assert!(matches!(container.destroy(), Err(Error::Closed)));
    assert!(matches!(
        container.set_size_and_visibility(true, 0, 0, 1, 1),
        Err(Error::Closed)
    ));
}

#[test]
fn handle_is_stable_for_the_lifetime_of_the_container() {
    init_tracing();
    let container = GraphicContainer::new(HeadlessBackend::default());
    container.initialize(HOST).unwrap();
    let handle = container.native_window_handle();

    container.set_size_and_visibility(true, 1, 2, 3, 4).unwrap();
    assert_eq!(container.native_window_handle(), handle);
    shut_down(&container);
    assert_eq!(container.native_window_handle(), handle);
}

#[test]
fn size_and_visibility_land_together() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::new(backend);
    container.initialize(HOST).unwrap();

    container.set_size_and_visibility(true, 10, 20, 300, 200).unwrap();
    let (visible, bounds) = container
        .sync_exec(|surface| {
            use surface_embed::Surface;
            (surface.is_visible(), surface.bounds())
        })
        .unwrap();
    assert!(visible);
    assert_eq!(bounds, Bounds::new(10, 20, 300, 200));

    container.set_size_and_visibility(false, 0, 0, 50, 60).unwrap();
    assert!(!container.is_visible().unwrap());
    assert_eq!(container.bounds().unwrap(), Bounds::new(0, 0, 50, 60));
    assert_eq!(world.surface().unwrap().bounds, Bounds::new(0, 0, 50, 60));

    shut_down(&container);
}

#[test]
fn focus_follows_the_world() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::new(backend);
    container.initialize(HOST).unwrap();

    assert!(!container.has_focus().unwrap());
    world.set_focus(Some(container.native_window_handle()));
    assert!(container.has_focus().unwrap());
    world.set_focus(Some(HOST));
    assert!(!container.has_focus().unwrap());

    shut_down(&container);
}

#[test]
fn destroy_right_after_initialize_disposes_everything() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::new(backend);
    container.initialize(HOST).unwrap();

    container.destroy().unwrap();
    container.join().unwrap();

    let surface = world.surface().unwrap();
    assert!(surface.disposed);
    assert!(!surface.visible);
    assert_eq!(world.displays_disposed(), 1);
    assert_eq!(container.loop_state(), Some(LoopState::Disposed));
}

#[test]
fn pending_events_are_drained_before_a_marshaled_call() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = GraphicContainer::new(backend);
    container.initialize(HOST).unwrap();

    for _ in 0..5 {
        world.post_event(|| {});
    }
    let seen_from_call = Arc::clone(&world);
    let pending = container
        .sync_exec(move |_| seen_from_call.pending_events())
        .unwrap();
    assert_eq!(pending, 0);
    assert_eq!(world.dispatched_events(), 5);

    shut_down(&container);
}

/// Sleeps briefly and posts itself again until `stop` is set.
fn keep_busy(world: Arc<HeadlessWorld>, stop: Arc<AtomicBool>) {
    if stop.load(Ordering::SeqCst) {
        return;
    }
    thread::sleep(Duration::from_millis(1));
    let next = Arc::clone(&world);
    world.post_event(move || keep_busy(next, stop));
}

#[test]
fn destroy_finishes_while_the_event_queue_never_empties() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = Arc::new(GraphicContainer::new(backend));
    container.initialize(HOST).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    keep_busy(Arc::clone(&world), Arc::clone(&stop));
    while world.dispatched_events() < 10 {
        thread::yield_now();
    }

    let (tx, rx) = mpsc::channel();
    let destroyer = {
        let container = Arc::clone(&container);
        thread::spawn(move || {
            let _ = tx.send(container.destroy());
        })
    };
    let destroyed = rx.recv_timeout(Duration::from_secs(3));
    stop.store(true, Ordering::SeqCst);

    assert!(matches!(destroyed, Ok(Ok(()))), "destroy stalled: {destroyed:?}");
    destroyer.join().unwrap();
    container.join().unwrap();
    assert_eq!(container.loop_state(), Some(LoopState::Disposed));
}

#[test]
fn calls_run_inside_a_nested_modal_loop() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = Arc::new(GraphicContainer::new(backend));
    container.initialize(HOST).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let released = Arc::new(AtomicBool::new(false));
    world.post_event(move || {
        let _ = entered_tx.send(());
    });
    world.post_modal({
        let released = Arc::clone(&released);
        move || released.load(Ordering::SeqCst)
    });
    entered_rx.recv().unwrap();

    let (tx, rx) = mpsc::channel();
    let caller = {
        let container = Arc::clone(&container);
        thread::spawn(move || {
            let _ = tx.send(container.set_size_and_visibility(true, 0, 0, 120, 90));
        })
    };
    let resized = rx.recv_timeout(Duration::from_secs(3));
    released.store(true, Ordering::SeqCst);

    assert!(matches!(resized, Ok(Ok(()))), "call stalled: {resized:?}");
    caller.join().unwrap();
    assert_eq!(world.surface().unwrap().bounds, Bounds::new(0, 0, 120, 90));
    shut_down(&container);
}

#[test]
fn calls_run_on_the_named_creator_thread() {
    init_tracing();
    let container = GraphicContainer::builder(HeadlessBackend::default())
        .thread_name("embed-test")
        .build();
    container.initialize(HOST).unwrap();

    let name = container
        .sync_exec(|_| thread::current().name().map(str::to_owned))
        .unwrap();
    assert_eq!(name.as_deref(), Some("embed-test"));

    shut_down(&container);
}

#[test]
fn calls_from_the_creator_thread_are_refused() {
    init_tracing();
    let backend = HeadlessBackend::default();
    let world = backend.world();
    let container = Arc::new(GraphicContainer::new(backend));
    container.initialize(HOST).unwrap();

    let (tx, rx) = mpsc::channel();
    let inner = Arc::clone(&container);
    world.post_event(move || {
        let _ = tx.send(inner.has_focus());
    });
    assert!(matches!(rx.recv().unwrap(), Err(Error::CreatorThread)));

    shut_down(&container);
}

#[test]
fn concurrent_callers_are_serialized() {
    init_tracing();
    let container = Arc::new(GraphicContainer::new(HeadlessBackend::default()));
    container.initialize(HOST).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for j in 0..25 {
                    container
                        .set_size_and_visibility(true, i, j, 100 + i, 100 + j)
                        .unwrap();
                    let bounds = container.bounds().unwrap();
                    assert!(bounds.width >= 100 && bounds.height >= 100);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    shut_down(&container);
}

#[test]
fn graphic_object_is_published_with_the_handle() {
    init_tracing();
    let container =
        GraphicContainer::new(HeadlessBackend::default().graphic_object(Arc::new("editor")));
    assert!(container.graphic_object().is_none());
    container.initialize(HOST).unwrap();

    let object = container.graphic_object().unwrap();
    assert_eq!(object.downcast_ref::<&str>(), Some(&"editor"));

    shut_down(&container);
}

#[test]
fn hooks_default_to_not_implemented() {
    let container = GraphicContainer::new(HeadlessBackend::default());
    assert!(container.is_remote_managed());
    assert!(!container.has_measure_override());
    container.start_measure_override(640, 480);
    assert_eq!(container.measure_override_width(), 0);
    assert_eq!(container.measure_override_height(), 0);
    container.end_measure_override();
    assert!(!container.has_wnd_proc_handler());
    assert!(!container.wnd_proc_handler(HOST, 0x0007, 0, 0, false));
}

#[derive(Default)]
struct HalfSize {
    measured: Mutex<Option<(i32, i32)>>,
    consumed: AtomicU32,
}

impl ContainerHooks for HalfSize {
    fn is_remote_managed(&self) -> bool {
        false
    }

    fn has_measure_override(&self) -> bool {
        true
    }

    fn start_measure_override(&self, width: i32, height: i32) {
        *self.measured.lock().unwrap() = Some((width / 2, height / 2));
    }

    fn measure_override_width(&self) -> i32 {
        self.measured.lock().unwrap().map_or(0, |(w, _)| w)
    }

    fn measure_override_height(&self) -> i32 {
        self.measured.lock().unwrap().map_or(0, |(_, h)| h)
    }

    fn end_measure_override(&self) {
        *self.measured.lock().unwrap() = None;
    }

    fn has_wnd_proc_handler(&self) -> bool {
        true
    }

    fn wnd_proc_handler(
        &self,
        _window: NativeHandle,
        msg: u32,
        _wparam: usize,
        _lparam: isize,
        handled: bool,
    ) -> bool {
        // WM_SETFOCUS
        if msg == 0x0007 && !handled {
            self.consumed.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        false
    }
}

#[test]
fn custom_hooks_are_consulted() {
    let container = GraphicContainer::builder(HeadlessBackend::default())
        .hooks(HalfSize::default())
        .build();
    assert!(!container.is_remote_managed());
    assert!(container.has_measure_override());

    container.start_measure_override(800, 600);
    assert_eq!(container.measure_override_width(), 400);
    assert_eq!(container.measure_override_height(), 300);
    assert_eq!(container.measure_override_width(), 400);
    container.end_measure_override();
    assert_eq!(container.measure_override_width(), 0);

    assert!(container.wnd_proc_handler(HOST, 0x0007, 0, 0, false));
    assert!(!container.wnd_proc_handler(HOST, 0x0007, 0, 0, true));
    assert!(!container.wnd_proc_handler(HOST, 0x0100, 0, 0, false));
    assert_eq!(container.hooks().consumed.load(Ordering::SeqCst), 1);
}

#[test]
fn hooks_are_reachable_through_a_shared_container() {
    init_tracing();
    let container = Arc::new(
        GraphicContainer::builder(HeadlessBackend::default())
            .hooks(HalfSize::default())
            .build(),
    );
    container.initialize(HOST).unwrap();

    // The host's layout and window-procedure thread only has `&` access.
    let host = {
        let container = Arc::clone(&container);
        thread::spawn(move || {
            container.start_measure_override(300, 100);
            let measured = (
                container.measure_override_width(),
                container.measure_override_height(),
            );
            container.end_measure_override();
            let consumed = container.wnd_proc_handler(HOST, 0x0007, 0, 0, false);
            (measured, consumed)
        })
    };
    assert_eq!(host.join().unwrap(), ((150, 50), true));
    assert_eq!(container.hooks().consumed.load(Ordering::SeqCst), 1);

    shut_down(&container);
}
