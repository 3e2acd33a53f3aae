//! Win32 backend.
//!
//! The display owns a message-only window (`HWND_MESSAGE`) and pumps the
//! creator thread's queue with `PeekMessageW`. Cross-thread wakes are
//! posted to that window, and its window procedure runs the queued calls.
//! Window messages are dispatched by any message loop on the thread, so
//! calls still run while the surface sits in a nested modal loop.

use crate::{
    Backend, Bounds, CallPump, Display, GraphicObject, NativeHandle, Result, SetPosFlags, Surface, Wake,
    WindowStyle, Windowing, ZOrder,
};
use core::ffi::c_void;
use core::marker::PhantomData;
use core::mem::size_of;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, trace, warn};
use widestring::U16CString;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::{MapWindowPoints, UpdateWindow};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::GetFocus;
use windows::Win32::UI::WindowsAndMessaging::*;

static_assertions::assert_not_impl_any!(Win32Display: Send, Sync);
static_assertions::assert_not_impl_any!(Win32Surface: Send, Sync);

/// Posted to the display's message window by [`WindowWaker`].
const DISPLAY_WM_RUN_CALLS: u32 = WM_USER + 1;

fn hwnd(handle: NativeHandle) -> HWND {
    HWND(handle.raw() as *mut c_void)
}

fn native(hwnd: HWND) -> NativeHandle {
    NativeHandle::from_raw(hwnd.0 as isize)
}

fn get_instance() -> Result<HINSTANCE> {
    unsafe {
        let module = GetModuleHandleW(PCWSTR::null())?;
        Ok(HINSTANCE(module.0))
    }
}

fn register_class(
    cell: &'static OnceLock<u16>,
    name: PCWSTR,
    wndproc: WNDPROC,
    cursor: bool,
    window_extra: usize,
) -> Result<u16> {
    if let Some(atom) = cell.get() {
        return Ok(*atom);
    }
    let instance = get_instance()?;
    let atom = unsafe {
        let class_ex = WNDCLASSEXW {
            cbSize: size_of::<WNDCLASSEXW>() as u32,
            hInstance: instance,
            lpszClassName: name,
            lpfnWndProc: wndproc,
            hCursor: if cursor {
                LoadCursorW(None, IDC_ARROW).unwrap_or_default()
            } else {
                HCURSOR::default()
            },
            cbWndExtra: window_extra as i32,
            ..Default::default()
        };
        RegisterClassExW(&class_ex)
    };
    if atom == 0 {
        // Another thread may have won the race.
        return cell.get().copied().ok_or_else(last_error);
    }
    Ok(*cell.get_or_init(|| atom))
}

fn last_error() -> crate::Error {
    crate::Error::Windows(unsafe { GetLastError() }.0)
}

fn class_pcwstr(atom: u16) -> PCWSTR {
    PCWSTR(atom as usize as *const u16)
}

unsafe extern "system" fn default_wndproc(
    hwnd: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, message, wparam, lparam)
}

/// Window procedure of the display's message window. Slot 0 of the window
/// extra bytes holds a `*const CallPump` once one is installed.
unsafe extern "system" fn message_wndproc(
    hwnd: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if message != DISPLAY_WM_RUN_CALLS {
        return DefWindowProcW(hwnd, message, wparam, lparam);
    }
    let pump_ptr = GetWindowLongPtrW(hwnd, WINDOW_LONG_PTR_INDEX(0)) as *const CallPump;
    if pump_ptr.is_null() {
        trace!("wake arrived before a call pump was installed");
        return LRESULT(0);
    }
    // The display owns the pump and clears the slot before dropping it.
    let pump = CallPump::clone(&*pump_ptr);
    pump();
    LRESULT(0)
}

/// Window-level operations through `user32`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Windowing;

impl Windowing for Win32Windowing {
    fn window_style(&self, window: NativeHandle) -> Result<WindowStyle> {
        unsafe {
            SetLastError(WIN32_ERROR(0));
            let raw = GetWindowLongPtrW(hwnd(window), GWL_STYLE);
            if raw == 0 {
                let err = GetLastError();
                if err.0 != 0 {
                    return Err(crate::Error::Windows(err.0));
                }
            }
            Ok(WindowStyle::from_bits_retain(raw as u32))
        }
    }

    fn set_window_style(&self, window: NativeHandle, style: WindowStyle) -> Result<()> {
        unsafe {
            SetLastError(WIN32_ERROR(0));
            let previous = SetWindowLongPtrW(hwnd(window), GWL_STYLE, style.bits() as i32 as isize);
            if previous == 0 && GetLastError().0 != 0 {
                return Err(last_error());
            }
        }
        trace!(%window, ?style, "SetWindowLongPtrW(GWL_STYLE)");
        Ok(())
    }

    fn set_parent(&self, child: NativeHandle, parent: NativeHandle) -> Result<()> {
        unsafe {
            SetParent(hwnd(child), Some(hwnd(parent)))?;
        }
        trace!(%child, %parent, "SetParent");
        Ok(())
    }

    fn set_window_pos(
        &self,
        window: NativeHandle,
        z_order: ZOrder,
        bounds: Bounds,
        flags: SetPosFlags,
    ) -> Result<()> {
        let insert_after = match z_order {
            ZOrder::Top => HWND_TOP,
            ZOrder::After(other) => hwnd(other),
        };
        unsafe {
            SetWindowPos(
                hwnd(window),
                Some(insert_after),
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                SET_WINDOW_POS_FLAGS(flags.bits()),
            )?;
        }
        Ok(())
    }
}

/// Event context for one creator thread.
pub struct Win32Display {
    message_hwnd: HWND,
    pump: Option<Box<CallPump>>,
    disposed: bool,
    not_send: PhantomData<*mut u8>,
}

static MESSAGE_CLASS: OnceLock<u16> = OnceLock::new();

impl Windowing for Win32Display {
    fn window_style(&self, window: NativeHandle) -> Result<WindowStyle> {
        Win32Windowing.window_style(window)
    }

    fn set_window_style(&self, window: NativeHandle, style: WindowStyle) -> Result<()> {
        Win32Windowing.set_window_style(window, style)
    }

    fn set_parent(&self, child: NativeHandle, parent: NativeHandle) -> Result<()> {
        Win32Windowing.set_parent(child, parent)
    }

    fn set_window_pos(
        &self,
        window: NativeHandle,
        z_order: ZOrder,
        bounds: Bounds,
        flags: SetPosFlags,
    ) -> Result<()> {
        Win32Windowing.set_window_pos(window, z_order, bounds, flags)
    }
}

impl Display for Win32Display {
    fn new() -> Result<Self> {
        let atom = register_class(
            &MESSAGE_CLASS,
            w!("surface_embed.message"),
            Some(message_wndproc),
            false,
            size_of::<*const CallPump>(),
        )?;
        let instance = get_instance()?;
        let message_hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                class_pcwstr(atom),
                w!(""),
                WINDOW_STYLE(0),
                0,
                0,
                1,
                1,
                Some(HWND_MESSAGE),
                None,
                Some(instance),
                None,
            )?
        };
        debug!(message_window = %native(message_hwnd), "created display");
        Ok(Self {
            message_hwnd,
            pump: None,
            disposed: false,
            not_send: PhantomData,
        })
    }

    fn read_and_dispatch(&mut self) -> bool {
        unsafe {
            let mut msg = MSG::default();
            if !PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                return false;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
            true
        }
    }

    fn sleep(&mut self) {
        if let Err(e) = unsafe { WaitMessage() } {
            warn!(error = %e, "WaitMessage failed");
        }
    }

    fn waker(&self) -> Arc<dyn Wake> {
        Arc::new(WindowWaker {
            hwnd: self.message_hwnd.0 as isize,
        })
    }

    fn install_call_pump(&mut self, pump: CallPump) {
        let pump = Box::new(pump);
        let pump_ptr: *const CallPump = &*pump;
        unsafe {
            SetWindowLongPtrW(self.message_hwnd, WINDOW_LONG_PTR_INDEX(0), pump_ptr as isize);
        }
        self.pump = Some(pump);
    }

    fn message_window(&self) -> Option<NativeHandle> {
        Some(native(self.message_hwnd))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        unsafe {
            SetWindowLongPtrW(self.message_hwnd, WINDOW_LONG_PTR_INDEX(0), 0);
        }
        if let Err(e) = unsafe { DestroyWindow(self.message_hwnd) } {
            warn!(error = %e, "failed to destroy message window");
        }
        self.pump = None;
    }
}

impl Drop for Win32Display {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Posts [`DISPLAY_WM_RUN_CALLS`] to the message window. Holds the handle
/// as an integer since `HWND` is not `Send`.
struct WindowWaker {
    hwnd: isize,
}

impl Wake for WindowWaker {
    fn wake(&self) {
        let hwnd = HWND(self.hwnd as *mut c_void);
        // Fails once the display is disposed, which is fine.
        if let Err(e) =
            unsafe { PostMessageW(Some(hwnd), DISPLAY_WM_RUN_CALLS, WPARAM(0), LPARAM(0)) }
        {
            trace!(error = %e, "PostMessageW failed");
        }
    }
}

/// A plain top-level window, created with a frame and embedded as a child.
pub struct Win32Surface {
    hwnd: HWND,
    disposed: bool,
    graphic_object: Option<GraphicObject>,
    not_send: PhantomData<*mut u8>,
}

static SURFACE_CLASS: OnceLock<u16> = OnceLock::new();

impl Win32Surface {
    pub fn new(title: &str, width: i32, height: i32) -> Result<Self> {
        let atom = register_class(
            &SURFACE_CLASS,
            w!("surface_embed.surface"),
            Some(default_wndproc),
            true,
            0,
        )?;
        let instance = get_instance()?;
        let title = U16CString::from_str_truncate(title);
        let hwnd = unsafe {
            // No WM_PARENTNOTIFY: the host thread may be blocked on us when
            // this window is destroyed.
            CreateWindowExW(
                WS_EX_NOPARENTNOTIFY,
                class_pcwstr(atom),
                PCWSTR(title.as_ptr()),
                WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                width,
                height,
                None,
                None,
                Some(instance),
                None,
            )?
        };
        debug!(hwnd = %native(hwnd), "created surface window");
        Ok(Self {
            hwnd,
            disposed: false,
            graphic_object: None,
            not_send: PhantomData,
        })
    }

    pub fn with_graphic_object(mut self, object: GraphicObject) -> Self {
        self.graphic_object = Some(object);
        self
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl Surface for Win32Surface {
    fn native_handle(&self) -> NativeHandle {
        native(self.hwnd)
    }

    fn open(&mut self) {
        unsafe {
            let _ = ShowWindow(self.hwnd, SW_SHOW);
            let _ = UpdateWindow(self.hwnd);
        }
    }

    fn set_visible(&mut self, visible: bool) {
        unsafe {
            let _ = ShowWindow(self.hwnd, if visible { SW_SHOW } else { SW_HIDE });
        }
    }

    fn is_visible(&self) -> bool {
        unsafe { IsWindowVisible(self.hwnd).as_bool() }
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        let flags = SetPosFlags::NOZORDER | SetPosFlags::NOACTIVATE;
        if let Err(e) =
            Win32Windowing.set_window_pos(self.native_handle(), ZOrder::Top, bounds, flags)
        {
            error!(error = %e, ?bounds, "failed to move surface");
        }
    }

    fn bounds(&self) -> Bounds {
        unsafe {
            let mut rect = RECT::default();
            if GetWindowRect(self.hwnd, &mut rect).is_err() {
                return Bounds::default();
            }
            let mut corners = [
                POINT {
                    x: rect.left,
                    y: rect.top,
                },
                POINT {
                    x: rect.right,
                    y: rect.bottom,
                },
            ];
            // Parent client coordinates, or screen coordinates when unparented.
            if let Ok(parent) = GetParent(self.hwnd) {
                MapWindowPoints(None, Some(parent), &mut corners);
            }
            Bounds::new(
                corners[0].x,
                corners[0].y,
                corners[1].x - corners[0].x,
                corners[1].y - corners[0].y,
            )
        }
    }

    fn is_focus_control(&self) -> bool {
        unsafe {
            let focus = GetFocus();
            !focus.is_invalid() && (focus == self.hwnd || IsChild(self.hwnd, focus).as_bool())
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Err(e) = unsafe { DestroyWindow(self.hwnd) } {
            warn!(error = %e, "failed to destroy surface window");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed || unsafe { !IsWindow(Some(self.hwnd)).as_bool() }
    }

    fn graphic_object(&self) -> Option<GraphicObject> {
        self.graphic_object.clone()
    }
}

/// Backend whose surface comes from a closure run on the creator thread.
pub struct Win32Backend<F> {
    factory: F,
}

impl<F> Win32Backend<F>
where
    F: FnMut(&mut Win32Display) -> Result<Win32Surface> + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> Backend for Win32Backend<F>
where
    F: FnMut(&mut Win32Display) -> Result<Win32Surface> + Send + 'static,
{
    type Display = Win32Display;
    type Surface = Win32Surface;

    fn create_surface(&mut self, display: &mut Win32Display) -> Option<Win32Surface> {
        match (self.factory)(display) {
            Ok(surface) => Some(surface),
            Err(e) => {
                error!(error = %e, "surface factory failed");
                None
            }
        }
    }
}
