// glview/src/egl_api.rs
//
//! The slice of the EGL API that the render thread machinery consumes.
//!
//! Every driver call the config chooser, the factories, and the session make goes through
//! `EglApi`, so the same state machine runs against the system `libEGL` or against the
//! in-memory headless driver.

use crate::gl::GlFunctions;
use crate::WindowingApiError;

use std::fmt::Debug;

/// EGL attribute names and values, as they appear in attribute lists.
pub mod attrib {
    pub const ALPHA_SIZE: i32 = 0x3021;
    pub const BLUE_SIZE: i32 = 0x3022;
    pub const GREEN_SIZE: i32 = 0x3023;
    pub const RED_SIZE: i32 = 0x3024;
    pub const DEPTH_SIZE: i32 = 0x3025;
    pub const STENCIL_SIZE: i32 = 0x3026;
    pub const CONFIG_ID: i32 = 0x3028;
    pub const NONE: i32 = 0x3038;
    pub const RENDERABLE_TYPE: i32 = 0x3040;
    pub const CONTEXT_CLIENT_VERSION: i32 = 0x3098;

    /// Wildcard value: the attribute is ignored when matching configs.
    pub const DONT_CARE: i32 = -1;
}

bitflags! {
    /// Client APIs a config can render with (`EGL_RENDERABLE_TYPE`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RenderableType: i32 {
        const OPENGL_ES  = 0x0001;
        const OPENVG     = 0x0002;
        const OPENGL_ES2 = 0x0004;
        const OPENGL     = 0x0008;
        const OPENGL_ES3 = 0x0040;
    }
}

impl RenderableType {
    /// The renderable bit a config must carry to host a context of the given ES client version,
    /// or `None` if the version does not constrain the config.
    pub fn for_client_version(client_version: u8) -> Option<RenderableType> {
        match client_version {
            2 => Some(RenderableType::OPENGL_ES2),
            3 => Some(RenderableType::OPENGL_ES3),
            _ => None,
        }
    }
}

/// A display connection, plus everything that can be created against it.
///
/// Handles are plain copyable values; ownership of the underlying driver objects is tracked by
/// `Session`. Attribute lists are flat `name, value` pairs terminated by `attrib::NONE`.
pub trait EglApi: Send + Sync + 'static {
    type Display: Copy + Send + Debug + PartialEq;
    type Config: Copy + Send + Debug + PartialEq;
    type Context: Copy + Send + Debug + PartialEq;
    type Surface: Copy + Send + Debug + PartialEq;
    /// The window (or texture) a window surface draws into.
    type NativeWindow: Copy + Send + Debug + PartialEq;
    /// The GL binding object handed to renderers.
    type Gl: GlFunctions;

    fn get_display(&self) -> Option<Self::Display>;

    /// Returns the EGL version as `(major, minor)`.
    fn initialize(&self, display: Self::Display) -> Result<(i32, i32), WindowingApiError>;

    fn terminate(&self, display: Self::Display) -> Result<(), WindowingApiError>;

    /// Counts the configs that satisfy the minimum filter in `attributes`.
    fn config_count(&self, display: Self::Display, attributes: &[i32])
                    -> Result<usize, WindowingApiError>;

    /// Fetches up to `max` configs that satisfy `attributes`, in driver order.
    fn choose_configs(&self, display: Self::Display, attributes: &[i32], max: usize)
                      -> Result<Vec<Self::Config>, WindowingApiError>;

    fn get_config_attrib(&self, display: Self::Display, config: Self::Config, attribute: i32)
                         -> Option<i32>;

    fn create_context(&self,
                      display: Self::Display,
                      config: Self::Config,
                      share_context: Option<Self::Context>,
                      attributes: &[i32])
                      -> Result<Self::Context, WindowingApiError>;

    fn destroy_context(&self, display: Self::Display, context: Self::Context)
                       -> Result<(), WindowingApiError>;

    fn create_window_surface(&self,
                             display: Self::Display,
                             config: Self::Config,
                             window: Self::NativeWindow,
                             attributes: &[i32])
                             -> Result<Self::Surface, WindowingApiError>;

    fn destroy_surface(&self, display: Self::Display, surface: Self::Surface)
                       -> Result<(), WindowingApiError>;

    /// Binds `context` and `surface` (used for both draw and read) to the calling thread.
    /// Passing `None` for both unbinds whatever is current.
    fn make_current(&self,
                    display: Self::Display,
                    surface: Option<Self::Surface>,
                    context: Option<Self::Context>)
                    -> Result<(), WindowingApiError>;

    fn swap_buffers(&self, display: Self::Display, surface: Self::Surface)
                    -> Result<(), WindowingApiError>;

    /// Creates the GL binding object for the context current on this thread.
    fn create_gl(&self, context: Self::Context) -> Self::Gl;
}
