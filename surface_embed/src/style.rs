use crate::NativeHandle;

bitflags::bitflags! {
    /// Window style bits. Values match the Win32 `WS_*` constants; bits
    /// this type does not name are retained when read from a window.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowStyle: u32 {
        const POPUP = 0x8000_0000;
        const CHILD = 0x4000_0000;
        const MINIMIZE = 0x2000_0000;
        const VISIBLE = 0x1000_0000;
        const DISABLED = 0x0800_0000;
        const CLIPSIBLINGS = 0x0400_0000;
        const CLIPCHILDREN = 0x0200_0000;
        const MAXIMIZE = 0x0100_0000;
        const BORDER = 0x0080_0000;
        const DLGFRAME = 0x0040_0000;
        /// Title bar. Implies a border.
        const CAPTION = Self::BORDER.bits() | Self::DLGFRAME.bits();
        const VSCROLL = 0x0020_0000;
        const HSCROLL = 0x0010_0000;
        const SYSMENU = 0x0008_0000;
        const THICKFRAME = 0x0004_0000;
        const MINIMIZEBOX = 0x0002_0000;
        const MAXIMIZEBOX = 0x0001_0000;

        const _ = !0;
    }
}

impl WindowStyle {
    /// Everything that makes a window look like a top-level frame.
    pub const TOP_LEVEL_DECORATIONS: WindowStyle = WindowStyle::POPUP
        .union(WindowStyle::CAPTION)
        .union(WindowStyle::THICKFRAME)
        .union(WindowStyle::MINIMIZEBOX)
        .union(WindowStyle::MAXIMIZEBOX)
        .union(WindowStyle::SYSMENU);

    /// Strips the top-level decorations and marks the window as a child.
    /// All other bits are left alone.
    pub const fn as_embedded_child(self) -> WindowStyle {
        self.difference(Self::TOP_LEVEL_DECORATIONS)
            .union(WindowStyle::CHILD)
    }
}

bitflags::bitflags! {
    /// Flags for [`Windowing::set_window_pos`](crate::Windowing::set_window_pos).
    /// Values match the Win32 `SWP_*` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetPosFlags: u32 {
        const NOSIZE = 0x0001;
        const NOMOVE = 0x0002;
        const NOZORDER = 0x0004;
        const NOREDRAW = 0x0008;
        const NOACTIVATE = 0x0010;
        const FRAMECHANGED = 0x0020;
        const SHOWWINDOW = 0x0040;
        const HIDEWINDOW = 0x0080;
    }
}

/// Where a window goes in the z-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZOrder {
    Top,
    After(NativeHandle),
}
