use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The surface could not be built, embedded or restyled. The container
    /// never published a native handle.
    #[error("failed to construct the embedded surface: {0}")]
    Construction(String),

    /// The creator thread has left its message loop; the surface is gone.
    #[error("the container is closed")]
    Closed,

    #[error("the container has not been initialized")]
    NotInitialized,

    #[error("the container was already initialized")]
    AlreadyInitialized,

    #[error("the host window handle is null")]
    InvalidHostHandle,

    /// A marshaled call was issued from the creator thread. It would wait
    /// on itself forever.
    #[error("marshaled call issued from the creator thread")]
    CreatorThread,

    /// A marshaled call panicked while running on the creator thread.
    #[error("marshaled call panicked on the creator thread")]
    CallPanicked,

    /// The creator thread itself panicked after the surface was embedded.
    #[error("the creator thread panicked")]
    CreatorPanicked,

    #[error("failed to spawn the creator thread")]
    Spawn(#[source] io::Error),

    /// A native windowing call failed. Carries the Win32 error code, as
    /// returned by `GetLastError`. Failures that are not wrapped Win32 codes
    /// keep their full HRESULT.
    #[error("windowing call failed with error {0:#x}")]
    Windows(u32),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Undoes `HRESULT_FROM_WIN32`: `0x8007xxxx` becomes the bare code.
#[cfg(any(windows, test))]
pub(crate) fn win32_code(hresult: u32) -> u32 {
    const FACILITY_WIN32: u32 = 0x8007_0000;
    if hresult & 0xFFFF_0000 == FACILITY_WIN32 {
        hresult & 0xFFFF
    } else {
        hresult
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for Error {
    fn from(e: windows::core::Error) -> Self {
        Self::Windows(win32_code(e.code().0 as u32))
    }
}
