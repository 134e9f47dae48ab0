// glview/src/gl.rs
//
//! The GL entry points used by the render thread and the bundled renderers.

use glow::HasContext;

bitflags! {
    /// Buffers to clear with `glClear`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const DEPTH   = glow::DEPTH_BUFFER_BIT;
        const STENCIL = glow::STENCIL_BUFFER_BIT;
        const COLOR   = glow::COLOR_BUFFER_BIT;
    }
}

/// `GL_NO_ERROR`.
pub const NO_ERROR: u32 = glow::NO_ERROR;

/// A GL binding object, bound to the context current on the render thread.
pub trait GlFunctions {
    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32);
    fn clear(&self, mask: ClearMask);
    fn finish(&self);
    /// Returns the oldest recorded error flag, or `NO_ERROR`.
    fn get_error(&self) -> u32;
    /// The `GL_RENDERER` string.
    fn renderer(&self) -> String;
}

impl GlFunctions for glow::Context {
    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32) {
        unsafe { HasContext::clear_color(self, red, green, blue, alpha) }
    }

    fn clear(&self, mask: ClearMask) {
        unsafe { HasContext::clear(self, mask.bits()) }
    }

    fn finish(&self) {
        unsafe { HasContext::finish(self) }
    }

    fn get_error(&self) -> u32 {
        unsafe { HasContext::get_error(self) }
    }

    fn renderer(&self) -> String {
        unsafe { self.get_parameter_string(glow::RENDERER) }
    }
}
