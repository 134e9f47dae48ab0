// glview/src/platform/headless/gl.rs
//
//! GL calls against the headless driver. They draw nothing; they are counted.

use super::{HeadlessContext, HeadlessEgl};
use crate::gl::{self, ClearMask, GlFunctions};

/// The GL binding object handed to renderers by `HeadlessEgl`.
pub struct HeadlessGl {
    egl: HeadlessEgl,
    context: HeadlessContext,
    renderer: String,
}

impl HeadlessGl {
    pub(crate) fn new(egl: HeadlessEgl, context: HeadlessContext, renderer: String) -> HeadlessGl {
        HeadlessGl { egl, context, renderer }
    }

    /// The context this binding was created for.
    #[inline]
    pub fn context(&self) -> HeadlessContext {
        self.context
    }
}

impl GlFunctions for HeadlessGl {
    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.egl.lock().clear_color = [red, green, blue, alpha];
    }

    fn clear(&self, _: ClearMask) {
        self.egl.lock().stats.clears += 1;
    }

    fn finish(&self) {
        self.egl.lock().stats.finishes += 1;
    }

    fn get_error(&self) -> u32 {
        std::mem::replace(&mut self.egl.lock().pending_gl_error, gl::NO_ERROR)
    }

    fn renderer(&self) -> String {
        self.renderer.clone()
    }
}
