// glview/src/lib.rs
//
//! Render-thread management for GL views.
//!
//! A `RenderSurfaceView` owns one dedicated render thread, which owns an EGL display, context,
//! and window surface and runs the frame loop. The host forwards its window and activity
//! lifecycle to the view; the view turns those into state changes on the render thread and, for
//! the ones where timing matters (a window going away, a pause), blocks until the thread has
//! acted on them.
//!
//! All render threads drawing through one driver share a `ThreadCoordinator`, the monitor their
//! state lives under. On drivers that can only keep one context alive, it also decides which
//! thread holds it.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod platform;

pub mod error;
pub use crate::error::{Error, WindowingApiError};

pub mod egl_api;
pub use crate::egl_api::{EglApi, RenderableType};

pub mod gl;
pub use crate::gl::{ClearMask, GlFunctions};

pub mod config;
pub use crate::config::{ChannelSizes, ComponentSizeChooser, ConfigChooser, ConfigRequest};

pub mod factory;
pub use crate::factory::{ContextFactory, DefaultContextFactory, DefaultWindowSurfaceFactory};
pub use crate::factory::WindowSurfaceFactory;

mod session;

pub mod coordinator;
pub use crate::coordinator::{RenderThreadId, ThreadCoordinator};

pub mod thread;
pub use crate::thread::{Event, RenderMode, RenderThread};

pub mod view;
pub use crate::view::{DebugFlags, GlWrapper, RenderSurfaceView, Renderer};

pub mod ar;
pub use crate::ar::{ArEngine, ArRenderer, ArView};

#[cfg(egl_backend)]
#[allow(non_camel_case_types)]
mod egl {
    use std::os::raw::{c_long, c_void};
    pub type khronos_utime_nanoseconds_t = khronos_uint64_t;
    pub type khronos_uint64_t = u64;
    pub type khronos_ssize_t = c_long;
    pub type EGLint = i32;
    pub type EGLNativeDisplayType = *const c_void;
    pub type EGLNativePixmapType = *const c_void;
    pub type EGLNativeWindowType = *const c_void;
    pub type NativeDisplayType = EGLNativeDisplayType;
    pub type NativePixmapType = EGLNativePixmapType;
    pub type NativeWindowType = EGLNativeWindowType;
    include!(concat!(env!("OUT_DIR"), "/egl_bindings.rs"));
}

#[cfg(test)]
mod tests;
