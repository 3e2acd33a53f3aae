//! Optional behaviour a host may ask of a container.
//!
//! Every method has a default, so a plain [`DefaultHooks`] answers the host
//! with "not implemented" across the board.
//!
//! Hooks are reached through a shared container, often from inside the
//! host's window procedure, so every method takes `&self`. Implementations
//! that keep measure state use interior mutability.

use crate::NativeHandle;

pub trait ContainerHooks: Send + Sync + 'static {
    /// Whether the container strips decorations and reparents the surface
    /// itself. When `false` the host is expected to manage placement.
    fn is_remote_managed(&self) -> bool {
        true
    }

    fn has_measure_override(&self) -> bool {
        false
    }

    /// Begins a measure pass under the given constraints. The host then
    /// queries the measured width and height, any number of times, and
    /// finishes with [`end_measure_override`](Self::end_measure_override).
    /// The whole exchange runs on the host's layout thread.
    fn start_measure_override(&self, _width: i32, _height: i32) {}

    fn measure_override_width(&self) -> i32 {
        0
    }

    fn measure_override_height(&self) -> i32 {
        0
    }

    fn end_measure_override(&self) {}

    fn has_wnd_proc_handler(&self) -> bool {
        false
    }

    /// Sees a message sent to the embedded window before the host handles
    /// it. `handled` is the host's verdict so far. Returns `true` if the
    /// message was consumed.
    fn wnd_proc_handler(
        &self,
        _window: NativeHandle,
        _msg: u32,
        _wparam: usize,
        _lparam: isize,
        _handled: bool,
    ) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl ContainerHooks for DefaultHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_report_nothing_implemented() {
        let hooks = DefaultHooks;
        assert!(hooks.is_remote_managed());
        assert!(!hooks.has_measure_override());
        hooks.start_measure_override(800, 600);
        assert_eq!(hooks.measure_override_width(), 0);
        assert_eq!(hooks.measure_override_height(), 0);
        hooks.end_measure_override();
        assert!(!hooks.has_wnd_proc_handler());
        assert!(!hooks.wnd_proc_handler(NativeHandle::from_raw(0x2000), 0x0100, 0, 0, false));
    }
}
