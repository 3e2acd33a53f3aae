//! Embeds a surface into a host window and keeps it sized to the host's
//! client area. Without a native windowing system the headless backend
//! stands in for both sides.

use surface_embed::*;
#[cfg(not(windows))]
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "embed_host failed");
        std::process::exit(1);
    }
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    use surface_embed::headless::HeadlessBackend;

    let backend = HeadlessBackend::default();
    let world = backend.world();
    let host = world.create_window(WindowStyle::VISIBLE | WindowStyle::CLIPCHILDREN);

    let container = GraphicContainer::new(backend);
    container.initialize(host)?;
    info!(host = %host, surface = %container.native_window_handle(), "embedded");

    container.set_size_and_visibility(true, 0, 0, 800, 600)?;
    info!(bounds = ?container.bounds()?, focus = container.has_focus()?, "resized");

    container.destroy()?;
    container.join()?;
    report(&world);
    Ok(())
}

#[cfg(not(windows))]
fn report(world: &surface_embed::headless::HeadlessWorld) {
    for call in world.calls() {
        info!(?call, "windowing call");
    }
}

#[cfg(windows)]
mod host {
    use std::sync::{Arc, OnceLock};
    use surface_embed::{Error, GraphicContainer, NativeHandle, Result};
    use tracing::info;
    use surface_embed::win32::{Win32Backend, Win32Display, Win32Surface};
    use windows::core::{w, PCWSTR};
    use windows::Win32::Foundation::*;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::*;

    type Factory = fn(&mut Win32Display) -> Result<Win32Surface>;
    type HostContainer = GraphicContainer<Win32Backend<Factory>>;

    static CONTAINER: OnceLock<Arc<HostContainer>> = OnceLock::new();

    fn build_surface(_display: &mut Win32Display) -> Result<Win32Surface> {
        Win32Surface::new("Embedded surface", 400, 300)
    }

    unsafe extern "system" fn host_wndproc(
        hwnd: HWND,
        message: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if let Some(container) = CONTAINER.get() {
            if container.has_wnd_proc_handler()
                && container.wnd_proc_handler(
                    NativeHandle::from_raw(hwnd.0 as isize),
                    message,
                    wparam.0,
                    lparam.0,
                    false,
                )
            {
                return LRESULT(0);
            }
        }
        match message {
            WM_SIZE => {
                if let Some(container) = CONTAINER.get() {
                    let width = (lparam.0 & 0xffff) as i32;
                    let height = ((lparam.0 >> 16) & 0xffff) as i32;
                    if let Err(e) = container.set_size_and_visibility(true, 0, 0, width, height)
                    {
                        tracing::warn!(error = %e, "resize failed");
                    }
                }
            }
            WM_CLOSE => {
                if let Some(container) = CONTAINER.get() {
                    if let Err(e) = container.destroy() {
                        tracing::warn!(error = %e, "destroy failed");
                    }
                }
            }
            WM_DESTROY => {
                PostQuitMessage(0);
                return LRESULT(0);
            }
            _ => {}
        }
        DefWindowProcW(hwnd, message, wparam, lparam)
    }

    pub(super) fn run() -> Result<()> {
        let host = unsafe {
            let instance = HINSTANCE(GetModuleHandleW(PCWSTR::null())?.0);
            let class = WNDCLASSEXW {
                cbSize: core::mem::size_of::<WNDCLASSEXW>() as u32,
                hInstance: instance,
                lpszClassName: w!("embed_host.frame"),
                lpfnWndProc: Some(host_wndproc),
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                ..Default::default()
            };
            if RegisterClassExW(&class) == 0 {
                return Err(Error::Windows(GetLastError().0));
            }
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("embed_host.frame"),
                w!("Embed host"),
                WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN | WS_VISIBLE,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                800,
                600,
                None,
                None,
                Some(instance),
                None,
            )?
        };

        let container = Arc::new(GraphicContainer::new(Win32Backend::new(
            build_surface as Factory,
        )));
        let host_handle = NativeHandle::from_raw(host.0 as isize);
        container.initialize(host_handle)?;
        info!(host = %host_handle, surface = %container.native_window_handle(), "embedded");
        let _ = CONTAINER.set(Arc::clone(&container));

        unsafe {
            let mut client = RECT::default();
            GetClientRect(host, &mut client)?;
            container.set_size_and_visibility(true, 0, 0, client.right, client.bottom)?;

            let mut msg = MSG::default();
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        container.join()
    }
}

#[cfg(windows)]
fn run() -> Result<()> {
    host::run()
}
