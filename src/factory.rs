// glview/src/factory.rs
//
//! Creation and destruction of contexts and window surfaces.

use crate::egl_api::{attrib, EglApi};
use crate::Error;

/// Creates and destroys the context a session renders with.
pub trait ContextFactory<E: EglApi>: Send + Sync {
    fn create_context(&self, egl: &E, display: E::Display, config: E::Config)
                      -> Result<E::Context, Error>;
    fn destroy_context(&self, egl: &E, display: E::Display, context: E::Context)
                       -> Result<(), Error>;
}

/// Creates and destroys the window surface a session draws into.
pub trait WindowSurfaceFactory<E: EglApi>: Send + Sync {
    /// Returns `None` if the surface cannot be constructed; the session treats that as a
    /// transient failure and retries once the window comes back.
    fn create_window_surface(&self,
                             egl: &E,
                             display: E::Display,
                             config: E::Config,
                             window: E::NativeWindow)
                             -> Option<E::Surface>;
    fn destroy_surface(&self, egl: &E, display: E::Display, surface: E::Surface);
}

/// Creates unshared contexts, tagged with the client version when it is non-zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContextFactory {
    client_version: u8,
}

impl DefaultContextFactory {
    #[inline]
    pub fn new(client_version: u8) -> DefaultContextFactory {
        DefaultContextFactory { client_version }
    }

    #[inline]
    pub fn client_version(&self) -> u8 {
        self.client_version
    }
}

impl<E> ContextFactory<E> for DefaultContextFactory where E: EglApi {
    fn create_context(&self, egl: &E, display: E::Display, config: E::Config)
                      -> Result<E::Context, Error> {
        let tagged = [
            attrib::CONTEXT_CLIENT_VERSION, self.client_version as i32,
            attrib::NONE,
        ];
        let attributes: &[i32] = if self.client_version != 0 { &tagged } else { &[attrib::NONE] };

        egl.create_context(display, config, None, attributes).map_err(Error::ContextCreationFailed)
    }

    fn destroy_context(&self, egl: &E, display: E::Display, context: E::Context)
                       -> Result<(), Error> {
        egl.destroy_context(display, context).map_err(|err| {
            error!(target: "glview::egl",
                   "eglDestroyContext failed: display {:?} context {:?}: {:?}",
                   display,
                   context,
                   err);
            Error::ContextDestructionFailed(err)
        })
    }
}

/// Creates plain window surfaces with no extra attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultWindowSurfaceFactory;

impl<E> WindowSurfaceFactory<E> for DefaultWindowSurfaceFactory where E: EglApi {
    fn create_window_surface(&self,
                             egl: &E,
                             display: E::Display,
                             config: E::Config,
                             window: E::NativeWindow)
                             -> Option<E::Surface> {
        // Failing here usually means the window was torn down before we were told about it.
        match egl.create_window_surface(display, config, window, &[attrib::NONE]) {
            Ok(surface) => Some(surface),
            Err(err) => {
                error!(target: "glview::egl", "eglCreateWindowSurface failed: {:?}", err);
                None
            }
        }
    }

    fn destroy_surface(&self, egl: &E, display: E::Display, surface: E::Surface) {
        if let Err(err) = egl.destroy_surface(display, surface) {
            warn!(target: "glview::egl", "eglDestroySurface failed: {:?}", err);
        }
    }
}
