// glview/src/view.rs
//
//! The UI-facing element that owns a render thread.

use crate::config::{ChannelSizes, ComponentSizeChooser, ConfigChooser, ConfigRequest};
use crate::coordinator::ThreadCoordinator;
use crate::egl_api::EglApi;
use crate::factory::{ContextFactory, DefaultContextFactory, DefaultWindowSurfaceFactory};
use crate::factory::WindowSurfaceFactory;
use crate::thread::{RenderMode, RenderThread};
use crate::Error;

use euclid::default::Size2D;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// The drawing callbacks, implemented by the embedding application and invoked on the render
/// thread.
///
/// For any one context, `on_surface_created()` comes first, then `on_surface_changed()`, then
/// any number of `on_draw_frame()`s. `on_surface_destroyed()` is called while the surface is
/// still alive.
///
/// No callback runs with the coordinator's monitor held, so callbacks may query the coordinator
/// or the render thread.
pub trait Renderer<E: EglApi>: Send {
    /// A new context was created. Everything previously uploaded to the GPU is gone.
    fn on_surface_created(&mut self, gl: &E::Gl, config: E::Config);
    fn on_surface_changed(&mut self, gl: &E::Gl, size: Size2D<i32>);
    fn on_surface_destroyed(&mut self);
    fn on_draw_frame(&mut self, gl: &E::Gl);
}

/// Wraps the GL binding object before the renderer sees it, for instance to trace or count
/// calls.
pub trait GlWrapper<E: EglApi>: Send + Sync {
    /// Returns `gl` itself or an object wrapping it.
    fn wrap(&self, gl: E::Gl) -> E::Gl;
}

bitflags! {
    /// Diagnostics the render thread performs around every renderer callback.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        /// Query the GL error after each callback and log anything but `GL_NO_ERROR`.
        const CHECK_GL_ERROR = 0x01;
        /// Trace every callback invocation.
        const LOG_GL_CALLS = 0x02;
    }
}

/// The part of a view the render thread reaches through its weak reference.
pub(crate) struct ViewShared<E: EglApi> {
    renderer: Mutex<Box<dyn Renderer<E>>>,
    pub(crate) config_chooser: Box<dyn ConfigChooser<E>>,
    pub(crate) context_factory: Box<dyn ContextFactory<E>>,
    pub(crate) surface_factory: Box<dyn WindowSurfaceFactory<E>>,
    gl_wrapper: Option<Box<dyn GlWrapper<E>>>,
    preserve_context_on_pause: AtomicBool,
    debug_flags: AtomicU32,
}

impl<E> ViewShared<E> where E: EglApi {
    pub(crate) fn new(renderer: Box<dyn Renderer<E>>,
                      config_chooser: Box<dyn ConfigChooser<E>>,
                      context_factory: Box<dyn ContextFactory<E>>,
                      surface_factory: Box<dyn WindowSurfaceFactory<E>>,
                      gl_wrapper: Option<Box<dyn GlWrapper<E>>>)
                      -> ViewShared<E> {
        ViewShared {
            renderer: Mutex::new(renderer),
            config_chooser,
            context_factory,
            surface_factory,
            gl_wrapper,
            preserve_context_on_pause: AtomicBool::new(false),
            debug_flags: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_renderer<F, R>(&self, f: F) -> R where F: FnOnce(&mut dyn Renderer<E>) -> R {
        let mut renderer = self.renderer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **renderer)
    }

    pub(crate) fn wrap_gl(&self, gl: E::Gl) -> E::Gl {
        match self.gl_wrapper {
            Some(ref gl_wrapper) => gl_wrapper.wrap(gl),
            None => gl,
        }
    }

    pub(crate) fn preserve_context_on_pause(&self) -> bool {
        self.preserve_context_on_pause.load(Ordering::SeqCst)
    }

    pub(crate) fn debug_flags(&self) -> DebugFlags {
        DebugFlags::from_bits_truncate(self.debug_flags.load(Ordering::SeqCst))
    }
}

/// A drawing surface backed by a dedicated render thread.
///
/// Configure the view, then attach a renderer with `set_renderer()`, which starts the render
/// thread. The host then forwards its window (or texture) lifecycle through the
/// `surface_texture_*()` methods and its activity lifecycle through `on_pause()` and
/// `on_resume()`.
///
/// Lifecycle calls made before a renderer is attached are ignored.
pub struct RenderSurfaceView<E: EglApi> {
    egl: Arc<E>,
    coordinator: Arc<ThreadCoordinator<E>>,
    config_chooser: Option<Box<dyn ConfigChooser<E>>>,
    context_factory: Option<Box<dyn ContextFactory<E>>>,
    surface_factory: Option<Box<dyn WindowSurfaceFactory<E>>>,
    gl_wrapper: Option<Box<dyn GlWrapper<E>>>,
    context_client_version: u8,
    preserve_context_on_pause: bool,
    debug_flags: DebugFlags,
    shared: Option<Arc<ViewShared<E>>>,
    thread: Option<RenderThread<E>>,
    detached: bool,
}

impl<E> RenderSurfaceView<E> where E: EglApi {
    /// Creates a view that draws through `egl`, arbitrated by `coordinator`. Every view drawing
    /// through the same driver should share one coordinator.
    pub fn new(egl: Arc<E>, coordinator: Arc<ThreadCoordinator<E>>) -> RenderSurfaceView<E> {
        RenderSurfaceView {
            egl,
            coordinator,
            config_chooser: None,
            context_factory: None,
            surface_factory: None,
            gl_wrapper: None,
            context_client_version: 0,
            preserve_context_on_pause: false,
            debug_flags: DebugFlags::empty(),
            shared: None,
            thread: None,
            detached: false,
        }
    }

    #[inline]
    pub fn egl(&self) -> &Arc<E> {
        &self.egl
    }

    #[inline]
    pub fn coordinator(&self) -> &Arc<ThreadCoordinator<E>> {
        &self.coordinator
    }

    /// The running render thread, if a renderer has been attached.
    #[inline]
    pub fn render_thread(&self) -> Option<&RenderThread<E>> {
        self.thread.as_ref()
    }

    fn check_render_thread_state(&self) -> Result<(), Error> {
        match self.shared {
            Some(_) => Err(Error::RendererAlreadySet),
            None => Ok(()),
        }
    }

    /// Attaches the renderer and starts the render thread. May only be called once per view.
    ///
    /// Anything not configured by then gets its default: an RGB 888 config with a 16-bit depth
    /// buffer, an unshared context, and a plain window surface.
    pub fn set_renderer<R>(&mut self, renderer: R) -> Result<(), Error> where R: Renderer<E> + 'static {
        let egl = self.egl.clone();
        let coordinator = self.coordinator.clone();
        self.set_renderer_with(renderer, move |view| {
            RenderThread::spawn(egl, coordinator, view, RenderMode::Continuously)
        })
    }

    /// Does the work of `set_renderer()`, starting the thread with `spawn`. If that fails, the
    /// view keeps its configuration and a renderer may be attached again.
    pub(crate) fn set_renderer_with<R, S>(&mut self, renderer: R, spawn: S) -> Result<(), Error>
                                          where R: Renderer<E> + 'static,
                                                S: FnOnce(Weak<ViewShared<E>>)
                                                          -> Result<RenderThread<E>, Error> {
        self.check_render_thread_state()?;

        let client_version = self.context_client_version;
        let config_chooser: Box<dyn ConfigChooser<E>> = match self.config_chooser.take() {
            Some(config_chooser) => config_chooser,
            None => Box::new(ComponentSizeChooser::simple(true, client_version)),
        };
        let context_factory: Box<dyn ContextFactory<E>> = match self.context_factory.take() {
            Some(context_factory) => context_factory,
            None => Box::new(DefaultContextFactory::new(client_version)),
        };
        let surface_factory: Box<dyn WindowSurfaceFactory<E>> = match self.surface_factory.take() {
            Some(surface_factory) => surface_factory,
            None => Box::new(DefaultWindowSurfaceFactory),
        };
        let shared = ViewShared::new(Box::new(renderer),
                                     config_chooser,
                                     context_factory,
                                     surface_factory,
                                     self.gl_wrapper.take());
        shared.preserve_context_on_pause.store(self.preserve_context_on_pause, Ordering::SeqCst);
        shared.debug_flags.store(self.debug_flags.bits(), Ordering::SeqCst);
        let shared = Arc::new(shared);

        match spawn(Arc::downgrade(&shared)) {
            Ok(thread) => {
                self.shared = Some(shared);
                self.thread = Some(thread);
                Ok(())
            }
            Err(err) => {
                // Nothing else holds a strong reference, so the configuration comes back.
                if let Ok(shared) = Arc::try_unwrap(shared) {
                    self.config_chooser = Some(shared.config_chooser);
                    self.context_factory = Some(shared.context_factory);
                    self.surface_factory = Some(shared.surface_factory);
                    self.gl_wrapper = shared.gl_wrapper;
                }
                Err(err)
            }
        }
    }

    pub fn set_context_factory<F>(&mut self, factory: F) -> Result<(), Error>
                                  where F: ContextFactory<E> + 'static {
        self.check_render_thread_state()?;
        self.context_factory = Some(Box::new(factory));
        Ok(())
    }

    pub fn set_window_surface_factory<F>(&mut self, factory: F) -> Result<(), Error>
                                         where F: WindowSurfaceFactory<E> + 'static {
        self.check_render_thread_state()?;
        self.surface_factory = Some(Box::new(factory));
        Ok(())
    }

    pub fn set_gl_wrapper<W>(&mut self, gl_wrapper: W) -> Result<(), Error>
                             where W: GlWrapper<E> + 'static {
        self.check_render_thread_state()?;
        self.gl_wrapper = Some(Box::new(gl_wrapper));
        Ok(())
    }

    pub fn set_config_chooser<C>(&mut self, chooser: C) -> Result<(), Error>
                                 where C: ConfigChooser<E> + 'static {
        self.check_render_thread_state()?;
        self.config_chooser = Some(Box::new(chooser));
        Ok(())
    }

    /// Chooses an RGB 888 config, with a 16-bit depth buffer if `with_depth_buffer` is set.
    ///
    /// The client version in effect when the renderer is attached is not picked up; set it
    /// first.
    pub fn set_simple_config_chooser(&mut self, with_depth_buffer: bool) -> Result<(), Error> {
        let chooser = ComponentSizeChooser::simple(with_depth_buffer, self.context_client_version);
        self.set_config_chooser(chooser)
    }

    /// Chooses a config with exactly these color sizes and at least these depth and stencil
    /// sizes.
    pub fn set_config_chooser_sizes(&mut self,
                                    red: i32,
                                    green: i32,
                                    blue: i32,
                                    alpha: i32,
                                    depth: i32,
                                    stencil: i32)
                                    -> Result<(), Error> {
        let sizes = ChannelSizes::new(red, green, blue, alpha, depth, stencil);
        let request = ConfigRequest::new(sizes, self.context_client_version);
        self.set_config_chooser(ComponentSizeChooser::new(request))
    }

    /// Sets the ES client version the default context factory and config choosers ask for.
    pub fn set_context_client_version(&mut self, version: u8) -> Result<(), Error> {
        self.check_render_thread_state()?;
        self.context_client_version = version;
        Ok(())
    }

    #[inline]
    pub fn context_client_version(&self) -> u8 {
        self.context_client_version
    }

    /// Keeps the context across pauses when the driver can afford it. May be changed at any time.
    pub fn set_preserve_context_on_pause(&mut self, preserve: bool) {
        self.preserve_context_on_pause = preserve;
        if let Some(ref shared) = self.shared {
            shared.preserve_context_on_pause.store(preserve, Ordering::SeqCst);
        }
    }

    #[inline]
    pub fn preserve_context_on_pause(&self) -> bool {
        self.preserve_context_on_pause
    }

    /// May be changed at any time.
    pub fn set_debug_flags(&mut self, debug_flags: DebugFlags) {
        self.debug_flags = debug_flags;
        if let Some(ref shared) = self.shared {
            shared.debug_flags.store(debug_flags.bits(), Ordering::SeqCst);
        }
    }

    #[inline]
    pub fn debug_flags(&self) -> DebugFlags {
        self.debug_flags
    }

    pub fn set_render_mode(&self, render_mode: RenderMode) {
        if let Some(ref thread) = self.thread {
            thread.set_render_mode(render_mode)
        }
    }

    /// The render mode of the render thread, `Continuously` if there is none yet.
    pub fn render_mode(&self) -> RenderMode {
        match self.thread {
            Some(ref thread) => thread.render_mode(),
            None => RenderMode::Continuously,
        }
    }

    pub fn request_render(&self) {
        if let Some(ref thread) = self.thread {
            thread.request_render()
        }
    }

    /// Pauses rendering, releasing the surface and possibly the context. Blocks until the render
    /// thread has paused.
    pub fn on_pause(&self) {
        if let Some(ref thread) = self.thread {
            thread.on_pause()
        }
    }

    /// Resumes rendering, recreating whatever `on_pause()` released.
    pub fn on_resume(&self) {
        if let Some(ref thread) = self.thread {
            thread.on_resume()
        }
    }

    /// Runs `event` on the render thread before its next frame.
    pub fn queue_event<F>(&self, event: F) -> Result<(), Error> where F: FnOnce() + Send + 'static {
        match self.thread {
            Some(ref thread) => {
                thread.queue_event(event);
                Ok(())
            }
            None => Err(Error::NoRenderer),
        }
    }

    /// The view is being attached to a window again. If it was detached with a renderer
    /// attached, starts a fresh render thread, keeping the previous render mode.
    pub fn on_attached_to_window(&mut self) -> Result<(), Error> {
        debug!(target: "glview::thread", "on_attached_to_window reattach = {}", self.detached);
        if self.detached {
            if let Some(ref shared) = self.shared {
                let render_mode = match self.thread {
                    Some(ref thread) => thread.render_mode(),
                    None => RenderMode::Continuously,
                };
                // The old thread has exited; dropping its handle unregisters it.
                self.thread = None;
                self.thread = Some(RenderThread::spawn(self.egl.clone(),
                                                       self.coordinator.clone(),
                                                       Arc::downgrade(shared),
                                                       render_mode)?);
            }
        }
        self.detached = false;
        Ok(())
    }

    /// The view is being detached from its window. Stops the render thread and returns the
    /// fatal error that ended it, if any.
    pub fn on_detached_from_window(&mut self) -> Result<(), Error> {
        debug!(target: "glview::thread", "on_detached_from_window");
        let result = match self.thread {
            Some(ref thread) => thread.request_exit_and_wait(),
            None => Ok(()),
        };
        self.detached = true;
        result
    }

    /// The window or texture to draw into became available at the given size.
    pub fn surface_texture_available(&self, window: E::NativeWindow, width: i32, height: i32) {
        if let Some(ref thread) = self.thread {
            thread.surface_created(window);
            thread.on_window_resize(width, height);
        }
    }

    pub fn surface_texture_size_changed(&self, width: i32, height: i32) {
        if let Some(ref thread) = self.thread {
            thread.on_window_resize(width, height)
        }
    }

    /// The window or texture is about to be destroyed. Returns once the render thread no longer
    /// uses it; the return value tells the host it may release the texture itself.
    pub fn surface_texture_destroyed(&self) -> bool {
        if let Some(ref thread) = self.thread {
            thread.surface_destroyed();
        }
        true
    }

    /// The texture's contents were updated. Asks for a frame.
    pub fn surface_texture_updated(&self) {
        self.request_render()
    }

    /// The view was laid out at the given bounds.
    pub fn on_layout_change(&self, left: i32, top: i32, right: i32, bottom: i32) {
        self.surface_texture_size_changed(right - left, bottom - top)
    }
}

impl<E> Drop for RenderSurfaceView<E> where E: EglApi {
    fn drop(&mut self) {
        // Stop the thread before the shared state goes away under it.
        if let Some(thread) = self.thread.take() {
            if let Err(err) = thread.request_exit_and_wait() {
                debug!(target: "glview::thread", "render thread exited with {:?}", err);
            }
        }
    }
}

impl<E> Debug for RenderSurfaceView<E> where E: EglApi {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.debug_struct("RenderSurfaceView")
                 .field("thread", &self.thread)
                 .field("detached", &self.detached)
                 .field("context_client_version", &self.context_client_version)
                 .field("preserve_context_on_pause", &self.preserve_context_on_pause)
                 .field("debug_flags", &self.debug_flags)
                 .finish()
    }
}
