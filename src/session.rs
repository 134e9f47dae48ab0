// glview/src/session.rs
//
//! The display, context, and window surface owned by one render thread.

use crate::egl_api::EglApi;
use crate::view::ViewShared;
use crate::{Error, WindowingApiError};

use std::sync::{Arc, Weak};
use std::thread;

/// How far along the display → config → context → surface sequence a session is.
///
/// The display is only recorded once it has been initialized, so "obtained" and "initialized"
/// are one state. Teardown returns to `Uninitialized` in one step: `finish()` destroys the
/// context and terminates the display together, and destroying the surface alone goes back to
/// `ContextCreated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    Uninitialized,
    DisplayInitialized,
    ConfigChosen,
    ContextCreated,
    SurfaceCreated,
}

/// Walks the strict display → config → context → surface sequence on behalf of a render thread,
/// and tears it down in reverse.
///
/// The factories live on the view, which the session only weakly references; every use checks
/// that the view is still around first.
pub(crate) struct Session<E: EglApi> {
    egl: Arc<E>,
    view: Weak<ViewShared<E>>,
    display: Option<E::Display>,
    config: Option<E::Config>,
    context: Option<E::Context>,
    surface: Option<E::Surface>,
}

impl<E> Session<E> where E: EglApi {
    pub(crate) fn new(egl: Arc<E>, view: Weak<ViewShared<E>>) -> Session<E> {
        Session { egl, view, display: None, config: None, context: None, surface: None }
    }

    pub(crate) fn state(&self) -> SessionState {
        match (self.display, self.config, self.context, self.surface) {
            (_, _, Some(_), Some(_)) => SessionState::SurfaceCreated,
            (_, _, Some(_), None) => SessionState::ContextCreated,
            (Some(_), Some(_), None, _) => SessionState::ConfigChosen,
            (Some(_), None, None, _) => SessionState::DisplayInitialized,
            (None, _, None, _) => SessionState::Uninitialized,
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> Option<E::Config> {
        self.config
    }

    /// Obtains and initializes the display, chooses a config, and creates the context.
    pub(crate) fn start(&mut self) -> Result<(), Error> {
        debug!(target: "glview::egl", "start() {:?}", thread::current().name());

        let display = self.egl.get_display().ok_or(Error::NoDisplay)?;
        self.egl.initialize(display).map_err(Error::DisplayInitializationFailed)?;
        self.display = Some(display);

        let view = self.view.upgrade().ok_or(Error::ViewDropped)?;
        let config = view.config_chooser.choose_config(&*self.egl, display)?;
        self.config = Some(config);

        // Contexts are heavyweight, so this happens as rarely as the thread can manage.
        let context = view.context_factory.create_context(&*self.egl, display, config)?;
        debug!(target: "glview::egl", "created context {:?}", context);
        self.context = Some(context);
        self.surface = None;
        Ok(())
    }

    /// Creates a window surface for `window`, destroying any previous one first, and makes the
    /// context current on it.
    ///
    /// Returns `false` if the surface could not be created or bound; the caller retries once the
    /// window changes.
    pub(crate) fn create_surface(&mut self, window: E::NativeWindow) -> bool {
        let (display, config, context) = match (self.display, self.config, self.context) {
            (Some(display), Some(config), Some(context)) => (display, config, context),
            _ => {
                error!(target: "glview::egl", "create_surface() before start()");
                return false;
            }
        };

        // The window size may have changed, so a new surface is needed.
        self.destroy_surface();

        let surface = match self.view.upgrade() {
            Some(view) => {
                view.surface_factory.create_window_surface(&*self.egl, display, config, window)
            }
            None => None,
        };
        let surface = match surface {
            Some(surface) => surface,
            None => return false,
        };
        self.surface = Some(surface);

        // Failing here probably means the underlying window was destroyed under us.
        if let Err(err) = self.egl.make_current(display, Some(surface), Some(context)) {
            warn!(target: "glview::egl", "eglMakeCurrent failed: {:?}", err);
            return false;
        }
        true
    }

    /// Creates the GL binding object for the current context, passed through the view's GL
    /// wrapper if it has one.
    pub(crate) fn create_gl(&self) -> Option<E::Gl> {
        let gl = self.egl.create_gl(self.context?);
        match self.view.upgrade() {
            Some(view) => Some(view.wrap_gl(gl)),
            None => Some(gl),
        }
    }

    /// Presents the surface. `ContextLost` is the one error the caller recovers from by
    /// rebuilding everything; the rest mean the surface went bad.
    pub(crate) fn swap(&self) -> Result<(), WindowingApiError> {
        match (self.display, self.surface) {
            (Some(display), Some(surface)) => self.egl.swap_buffers(display, surface),
            _ => Err(WindowingApiError::BadSurface),
        }
    }

    /// Tells the renderer the surface is going away. Must be called without the coordinator's
    /// monitor held, and before `destroy_surface()`.
    pub(crate) fn notify_surface_destroyed(&self) {
        if thread::panicking() {
            return;
        }
        if let Some(view) = self.view.upgrade() {
            view.with_renderer(|renderer| renderer.on_surface_destroyed());
        }
    }

    /// Unbinds and destroys the window surface, if there is one.
    pub(crate) fn destroy_surface(&mut self) {
        let (display, surface) = match (self.display, self.surface.take()) {
            (Some(display), Some(surface)) => (display, surface),
            _ => return,
        };

        debug!(target: "glview::egl", "destroy_surface() {:?}", thread::current().name());
        if let Err(err) = self.egl.make_current(display, None, None) {
            warn!(target: "glview::egl", "eglMakeCurrent(NO_SURFACE) failed: {:?}", err);
        }
        match self.view.upgrade() {
            Some(view) => view.surface_factory.destroy_surface(&*self.egl, display, surface),
            None => {
                if let Err(err) = self.egl.destroy_surface(display, surface) {
                    warn!(target: "glview::egl", "eglDestroySurface failed: {:?}", err);
                }
            }
        }
    }

    /// Destroys the context and terminates the display. Calling this again is a no-op.
    ///
    /// The display is terminated even if the context factory reports a failure; that failure is
    /// still returned.
    pub(crate) fn finish(&mut self) -> Result<(), Error> {
        debug!(target: "glview::egl", "finish() {:?}", thread::current().name());

        let mut result = Ok(());
        if let (Some(display), Some(context)) = (self.display, self.context.take()) {
            result = match self.view.upgrade() {
                Some(view) => view.context_factory.destroy_context(&*self.egl, display, context),
                None => {
                    self.egl.destroy_context(display, context)
                                .map_err(Error::ContextDestructionFailed)
                }
            };
        }
        self.config = None;

        if let Some(display) = self.display.take() {
            if let Err(err) = self.egl.terminate(display) {
                warn!(target: "glview::egl", "eglTerminate failed: {:?}", err);
            }
        }
        result
    }
}
