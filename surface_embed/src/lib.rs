//! Embeds a toolkit-owned window inside a window that belongs to a host
//! application.
//!
//! A [`GraphicContainer`] starts a dedicated creator thread, builds the
//! surface there, reparents its native handle under the host window and
//! then pumps the surface's message loop until the surface is disposed.
//! The host thread drives the surface through synchronous calls that are
//! marshaled onto the creator thread.
//!
//! ```no_run
//! use surface_embed::{GraphicContainer, NativeHandle};
//! use surface_embed::headless::HeadlessBackend;
//!
//! let container = GraphicContainer::builder(HeadlessBackend::default()).build();
//! container.initialize(NativeHandle::from_raw(0x1000))?;
//! container.set_size_and_visibility(true, 0, 0, 640, 480)?;
//! container.destroy()?;
//! # Ok::<(), surface_embed::Error>(())
//! ```

mod backend;
mod container;
mod error;
mod event_loop;
mod handle;
mod handshake;
pub mod headless;
mod hooks;
mod marshal;
mod style;
#[cfg(windows)]
pub mod win32;

pub use backend::*;
pub use container::*;
pub use error::{Error, Result};
pub use event_loop::LoopState;
pub use handle::*;
pub use handshake::Handshake;
pub use hooks::*;
pub use style::*;
