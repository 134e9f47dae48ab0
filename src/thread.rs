// glview/src/thread.rs
//
//! The render thread: one dedicated OS thread per view, running the frame loop.
//!
//! All of a render thread's state lives under the coordinator's monitor. The UI side mutates it
//! through the setters on `RenderThread`, several of which block until the render thread has
//! acted on the change; the render thread reacts in `RenderLoop::guarded_run()`, which waits in
//! exactly one place.

use crate::coordinator::{MonitorState, RenderThreadId, ThreadCoordinator};
use crate::egl_api::EglApi;
use crate::gl::{self, GlFunctions};
use crate::session::Session;
use crate::view::{DebugFlags, Renderer, ViewShared};
use crate::{Error, WindowingApiError};

use euclid::default::Size2D;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};

/// A unit of work to run on the render thread before the next frame.
pub type Event = Box<dyn FnOnce() + Send + 'static>;

/// When the render thread draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Only after `request_render()` (or a resize or resume).
    WhenDirty,
    /// On every pass through the loop.
    Continuously,
}

/// Per-thread state. Only ever touched with the coordinator's monitor held.
pub(crate) struct ThreadState<E: EglApi> {
    pub(crate) should_exit: bool,
    pub(crate) exited: bool,
    /// The handle was dropped on the render thread itself; the thread unregisters on exit.
    pub(crate) orphaned: bool,
    request_paused: bool,
    paused: bool,
    native_window: Option<E::NativeWindow>,
    surface_is_bad: bool,
    waiting_for_surface: bool,
    have_egl_context: bool,
    have_egl_surface: bool,
    finished_creating_egl_surface: bool,
    pub(crate) should_release_egl_context: bool,
    size: Size2D<i32>,
    render_mode: RenderMode,
    request_render: bool,
    render_complete: bool,
    event_queue: VecDeque<Event>,
    size_changed: bool,
}

impl<E> ThreadState<E> where E: EglApi {
    pub(crate) fn new(render_mode: RenderMode) -> ThreadState<E> {
        ThreadState {
            should_exit: false,
            exited: false,
            orphaned: false,
            request_paused: false,
            paused: false,
            native_window: None,
            surface_is_bad: false,
            waiting_for_surface: false,
            have_egl_context: false,
            have_egl_surface: false,
            finished_creating_egl_surface: false,
            should_release_egl_context: false,
            size: Size2D::zero(),
            render_mode,
            request_render: true,
            render_complete: false,
            event_queue: VecDeque::new(),
            size_changed: true,
        }
    }

    fn ready_to_draw(&self) -> bool {
        !self.paused &&
            self.native_window.is_some() &&
            !self.surface_is_bad &&
            self.size.width > 0 &&
            self.size.height > 0 &&
            (self.request_render || self.render_mode == RenderMode::Continuously)
    }

    fn able_to_draw(&self) -> bool {
        self.have_egl_context && self.have_egl_surface && self.ready_to_draw()
    }
}

impl<E> Debug for ThreadState<E> where E: EglApi {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.debug_struct("ThreadState")
                 .field("have_egl_context", &self.have_egl_context)
                 .field("have_egl_surface", &self.have_egl_surface)
                 .field("finished_creating_egl_surface", &self.finished_creating_egl_surface)
                 .field("paused", &self.paused)
                 .field("native_window", &self.native_window)
                 .field("surface_is_bad", &self.surface_is_bad)
                 .field("waiting_for_surface", &self.waiting_for_surface)
                 .field("size", &self.size)
                 .field("request_render", &self.request_render)
                 .field("render_mode", &self.render_mode)
                 .field("queued_events", &self.event_queue.len())
                 .finish()
    }
}

enum JoinState {
    Running(JoinHandle<Result<(), Error>>),
    Finished(Result<(), Error>),
}

/// The handle to a running render thread.
///
/// Dropping the handle asks the thread to exit and waits for it.
pub struct RenderThread<E: EglApi> {
    id: RenderThreadId,
    coordinator: Arc<ThreadCoordinator<E>>,
    thread_id: ThreadId,
    join_state: Mutex<JoinState>,
}

impl<E> RenderThread<E> where E: EglApi {
    pub(crate) fn spawn(egl: Arc<E>,
                        coordinator: Arc<ThreadCoordinator<E>>,
                        view: Weak<ViewShared<E>>,
                        render_mode: RenderMode)
                        -> Result<RenderThread<E>, Error> {
        let id = coordinator.register_thread(ThreadState::new(render_mode));
        let render_loop = RenderLoop {
            id,
            coordinator: coordinator.clone(),
            session: Session::new(egl, view.clone()),
            view,
            surface_destroyed_notified: false,
        };

        let spawned = thread::Builder::new().name(format!("GLThread {}", id.0))
                                            .spawn(move || render_loop.run());
        match spawned {
            Ok(join_handle) => {
                Ok(RenderThread {
                    id,
                    coordinator,
                    thread_id: join_handle.thread().id(),
                    join_state: Mutex::new(JoinState::Running(join_handle)),
                })
            }
            Err(err) => {
                error!(target: "glview::thread", "failed to spawn render thread: {}", err);
                coordinator.unregister_thread(id);
                Err(Error::ThreadSpawnFailed)
            }
        }
    }

    #[inline]
    pub fn id(&self) -> RenderThreadId {
        self.id
    }

    fn on_render_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Applies `update` under the monitor, wakes everybody up, then blocks while `keep_waiting`
    /// holds.
    ///
    /// Called on the render thread itself, this only applies the update: waiting there could
    /// never end.
    fn update_and_wait<U, W>(&self, update: U, keep_waiting: W)
                             where U: FnOnce(&mut ThreadState<E>),
                                   W: Fn(&ThreadState<E>) -> bool {
        let mut monitor = self.coordinator.lock();
        update(monitor.thread_mut(self.id));
        self.coordinator.notify_all();

        if self.on_render_thread() {
            if keep_waiting(monitor.thread(self.id)) {
                warn!(target: "glview::thread", "blocking setter called on {:?} itself", self.id);
            }
            return;
        }
        while keep_waiting(monitor.thread(self.id)) {
            monitor = self.coordinator.wait(monitor);
        }
    }

    fn update<U>(&self, update: U) where U: FnOnce(&mut ThreadState<E>) {
        self.update_and_wait(update, |_| false)
    }

    fn read<T, F>(&self, f: F) -> T where F: FnOnce(&ThreadState<E>) -> T {
        f(self.coordinator.lock().thread(self.id))
    }

    pub fn set_render_mode(&self, render_mode: RenderMode) {
        self.update(|thread| thread.render_mode = render_mode)
    }

    pub fn render_mode(&self) -> RenderMode {
        self.read(|thread| thread.render_mode)
    }

    /// Asks for one frame to be drawn. Never blocks.
    pub fn request_render(&self) {
        self.update(|thread| thread.request_render = true)
    }

    /// The window became available. Blocks until the render thread has tried to build a surface
    /// for it.
    pub fn surface_created(&self, window: E::NativeWindow) {
        debug!(target: "glview::thread", "surface_created {:?}", self.id);
        self.update_and_wait(|thread| {
            thread.native_window = Some(window);
            thread.finished_creating_egl_surface = false;
        }, |thread| {
            thread.waiting_for_surface && !thread.finished_creating_egl_surface && !thread.exited
        })
    }

    /// The window is about to go away. Blocks until the render thread has released its surface,
    /// so the window is never torn down under a live surface.
    pub fn surface_destroyed(&self) {
        debug!(target: "glview::thread", "surface_destroyed {:?}", self.id);
        self.update_and_wait(|thread| thread.native_window = None,
                             |thread| !thread.waiting_for_surface && !thread.exited)
    }

    /// Blocks until the render thread has paused.
    pub fn on_pause(&self) {
        debug!(target: "glview::pause", "on_pause {:?}", self.id);
        self.update_and_wait(|thread| thread.request_paused = true,
                             |thread| !thread.exited && !thread.paused)
    }

    /// Blocks until the render thread has resumed.
    pub fn on_resume(&self) {
        debug!(target: "glview::pause", "on_resume {:?}", self.id);
        self.update_and_wait(|thread| {
            thread.request_paused = false;
            thread.request_render = true;
            thread.render_complete = false;
        }, |thread| !thread.exited && thread.paused && !thread.render_complete)
    }

    /// Blocks until the render thread has drawn a frame at the new size, if it is able to draw
    /// at all.
    pub fn on_window_resize(&self, width: i32, height: i32) {
        self.update_and_wait(|thread| {
            thread.size = Size2D::new(width, height);
            thread.size_changed = true;
            thread.request_render = true;
            thread.render_complete = false;
        }, |thread| {
            let waiting = !thread.exited &&
                !thread.paused &&
                !thread.render_complete &&
                thread.able_to_draw();
            if waiting {
                debug!(target: "glview::surface", "on_window_resize waiting for render complete");
            }
            waiting
        })
    }

    /// Queues `event` to run on the render thread before the next frame.
    pub fn queue_event<F>(&self, event: F) where F: FnOnce() + Send + 'static {
        self.update(|thread| thread.event_queue.push_back(Box::new(event)))
    }

    /// Asks the render thread to exit and blocks until it has, returning the fatal error that
    /// ended it, if any.
    ///
    /// Must not be called from the render thread itself; doing so returns
    /// `Error::ExitRequestedFromRenderThread` and changes nothing.
    pub fn request_exit_and_wait(&self) -> Result<(), Error> {
        if self.on_render_thread() {
            warn!(target: "glview::thread", "request_exit_and_wait() on {:?} itself", self.id);
            return Err(Error::ExitRequestedFromRenderThread);
        }

        self.update_and_wait(|thread| thread.should_exit = true, |thread| !thread.exited);
        self.join()
    }

    fn join(&self) -> Result<(), Error> {
        let mut join_state = self.join_state.lock().unwrap_or_else(PoisonError::into_inner);
        if let JoinState::Finished(result) = *join_state {
            return result;
        }
        let result = match mem::replace(&mut *join_state, JoinState::Finished(Ok(()))) {
            JoinState::Running(join_handle) => {
                join_handle.join().unwrap_or(Err(Error::RenderThreadPanicked))
            }
            JoinState::Finished(result) => result,
        };
        *join_state = JoinState::Finished(result);
        result
    }

    pub fn is_paused(&self) -> bool {
        self.read(|thread| thread.paused)
    }

    pub fn has_exited(&self) -> bool {
        self.read(|thread| thread.exited)
    }

    /// Whether the thread holds a context and a surface and would draw given the chance.
    pub fn able_to_draw(&self) -> bool {
        self.read(|thread| thread.able_to_draw())
    }
}

impl<E> Drop for RenderThread<E> where E: EglApi {
    fn drop(&mut self) {
        if self.on_render_thread() {
            self.update(|thread| {
                thread.should_exit = true;
                thread.orphaned = true;
            });
            return;
        }

        if let Err(err) = self.request_exit_and_wait() {
            debug!(target: "glview::thread", "{:?} exited with {:?}", self.id, err);
        }
        self.coordinator.unregister_thread(self.id);
    }
}

impl<E> Debug for RenderThread<E> where E: EglApi {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "RenderThread({})", self.id.0)
    }
}

/// The render thread's side: owns the session and runs the loop.
///
/// Dropping it, which happens however the loop ends, including by unwinding, releases the
/// surface and context and marks the thread exited.
struct RenderLoop<E: EglApi> {
    id: RenderThreadId,
    coordinator: Arc<ThreadCoordinator<E>>,
    view: Weak<ViewShared<E>>,
    session: Session<E>,
    /// The renderer has been told the current surface is going away; it must be destroyed on the
    /// next pass.
    surface_destroyed_notified: bool,
}

impl<E> RenderLoop<E> where E: EglApi {
    fn run(mut self) -> Result<(), Error> {
        debug!(target: "glview::thread", "starting {:?}", self.id);
        self.guarded_run()
    }

    fn guarded_run(&mut self) -> Result<(), Error> {
        let coordinator = self.coordinator.clone();
        let id = self.id;

        let mut gl: Option<E::Gl> = None;
        let mut create_egl_context = false;
        let mut create_egl_surface = false;
        let mut create_gl_interface = false;
        let mut lost_egl_context = false;
        let mut size_changed = false;
        let mut want_render_notification = false;
        let mut do_render_notification = false;
        let mut asked_to_release_egl_context = false;
        let mut size = Size2D::zero();
        let mut window = None;

        loop {
            let mut event = None;
            {
                let mut monitor = coordinator.lock();
                loop {
                    if monitor.thread(id).should_exit {
                        return Ok(());
                    }

                    // The renderer hears about a surface going away with the monitor released,
                    // then the pass starts over and the surface is destroyed.
                    if !self.surface_destroyed_notified &&
                            surface_must_stop(monitor.thread(id), lost_egl_context) {
                        drop(monitor);
                        self.notify_surface_destroyed();
                        monitor = coordinator.lock();
                        continue;
                    }
                    if self.surface_destroyed_notified {
                        self.stop_egl_surface_locked(&mut monitor);
                    }

                    if let Some(queued) = monitor.thread_mut(id).event_queue.pop_front() {
                        event = Some(queued);
                        break;
                    }

                    // Update the pause state.
                    let mut pausing = false;
                    {
                        let thread = monitor.thread_mut(id);
                        if thread.paused != thread.request_paused {
                            pausing = thread.request_paused;
                            thread.paused = thread.request_paused;
                            coordinator.notify_all();
                            debug!(target: "glview::pause", "paused is now {} {:?}", thread.paused, id);
                        }
                    }

                    // Do we need to give up the context?
                    if monitor.thread(id).should_release_egl_context {
                        debug!(target: "glview::surface", "releasing context because asked to {:?}", id);
                        self.stop_egl_surface_locked(&mut monitor);
                        self.stop_egl_context_locked(&mut monitor)?;
                        monitor.thread_mut(id).should_release_egl_context = false;
                        asked_to_release_egl_context = true;
                    }

                    // Have we lost the context?
                    if lost_egl_context {
                        self.stop_egl_surface_locked(&mut monitor);
                        self.stop_egl_context_locked(&mut monitor)?;
                        lost_egl_context = false;
                    }

                    // When pausing, release the surface.
                    if pausing && monitor.thread(id).have_egl_surface {
                        debug!(target: "glview::surface", "releasing surface because paused {:?}", id);
                        self.stop_egl_surface_locked(&mut monitor);
                    }

                    // When pausing, optionally release the context.
                    if pausing && monitor.thread(id).have_egl_context {
                        let preserve = match self.view.upgrade() {
                            Some(view) => view.preserve_context_on_pause(),
                            None => false,
                        };
                        if !preserve || monitor.should_release_egl_context_when_pausing() {
                            self.stop_egl_context_locked(&mut monitor)?;
                            debug!(target: "glview::surface", "releasing context because paused {:?}", id);
                        }
                    }

                    // When pausing, optionally terminate EGL.
                    if pausing && monitor.should_terminate_egl_when_pausing() {
                        self.stop_egl_context_locked(&mut monitor)?;
                        self.session.finish()?;
                        debug!(target: "glview::surface", "terminating EGL because paused {:?}", id);
                    }

                    // Have we lost the window?
                    let window_lost = {
                        let thread = monitor.thread(id);
                        thread.native_window.is_none() && !thread.waiting_for_surface
                    };
                    if window_lost {
                        debug!(target: "glview::surface", "noticed window lost {:?}", id);
                        self.stop_egl_surface_locked(&mut monitor);
                        let thread = monitor.thread_mut(id);
                        thread.waiting_for_surface = true;
                        thread.surface_is_bad = false;
                        coordinator.notify_all();
                    }

                    // Have we acquired the window?
                    {
                        let thread = monitor.thread_mut(id);
                        if thread.native_window.is_some() && thread.waiting_for_surface {
                            debug!(target: "glview::surface", "noticed window acquired {:?}", id);
                            thread.waiting_for_surface = false;
                            coordinator.notify_all();
                        }
                    }

                    if do_render_notification {
                        debug!(target: "glview::surface", "sending render notification {:?}", id);
                        want_render_notification = false;
                        do_render_notification = false;
                        monitor.thread_mut(id).render_complete = true;
                        coordinator.notify_all();
                    }

                    // Ready to draw?
                    if monitor.thread(id).ready_to_draw() {
                        // If we don't have a context, try to acquire one.
                        if !monitor.thread(id).have_egl_context {
                            if asked_to_release_egl_context {
                                asked_to_release_egl_context = false;
                            } else {
                                let acquired = monitor.try_acquire_egl_context_locked(id);
                                coordinator.notify_all();
                                if acquired {
                                    if let Err(err) = self.session.start() {
                                        error!(target: "glview::egl", "failed to start EGL: {:?}", err);
                                        // Don't leave an initialized display behind.
                                        if let Err(err) = self.session.finish() {
                                            warn!(target: "glview::egl",
                                                  "teardown after failed start: {:?}",
                                                  err);
                                        }
                                        monitor.release_egl_context_locked(id);
                                        coordinator.notify_all();
                                        return Err(err);
                                    }
                                    monitor.thread_mut(id).have_egl_context = true;
                                    create_egl_context = true;
                                    coordinator.notify_all();
                                }
                            }
                        }

                        let thread = monitor.thread_mut(id);
                        if thread.have_egl_context && !thread.have_egl_surface {
                            thread.have_egl_surface = true;
                            create_egl_surface = true;
                            create_gl_interface = true;
                            size_changed = true;
                        }

                        if thread.have_egl_surface {
                            if thread.size_changed {
                                size_changed = true;
                                size = thread.size;
                                want_render_notification = true;
                                debug!(target: "glview::surface", "want render notification {:?}", id);

                                // Destroy and recreate the surface.
                                create_egl_surface = true;
                                thread.size_changed = false;
                            }
                            thread.request_render = false;
                            window = thread.native_window;
                            coordinator.notify_all();
                            break;
                        }
                    }

                    // This is the only place a render thread waits.
                    trace!(target: "glview::thread", "waiting {:?}: {:?}", id, monitor.thread(id));
                    monitor = coordinator.wait(monitor);
                }
            }

            if let Some(event) = event.take() {
                event();
                continue;
            }

            if create_egl_surface {
                debug!(target: "glview::surface", "creating surface {:?}", id);
                let created = match window {
                    Some(window) => self.session.create_surface(window),
                    None => false,
                };

                {
                    let mut monitor = coordinator.lock();
                    let thread = monitor.thread_mut(id);
                    thread.finished_creating_egl_surface = true;
                    if !created {
                        thread.surface_is_bad = true;
                    }
                    coordinator.notify_all();
                }
                if !created {
                    continue;
                }
                create_egl_surface = false;
            }

            if create_gl_interface {
                gl = self.session.create_gl();
                if let Some(ref gl) = gl {
                    coordinator.check_gl_driver(&gl.renderer());
                }
                create_gl_interface = false;
            }

            let gl = match gl {
                Some(ref gl) => gl,
                None => continue,
            };

            if create_egl_context {
                debug!(target: "glview::renderer", "on_surface_created");
                if let Some(config) = self.session.config() {
                    self.with_renderer(gl, "on_surface_created", |renderer| {
                        renderer.on_surface_created(gl, config)
                    });
                }
                create_egl_context = false;
            }

            if size_changed {
                debug!(target: "glview::renderer",
                       "on_surface_changed({}, {})",
                       size.width,
                       size.height);
                self.with_renderer(gl, "on_surface_changed", |renderer| {
                    renderer.on_surface_changed(gl, size)
                });
                size_changed = false;
            }

            trace!(target: "glview::renderer", "on_draw_frame {:?}", id);
            self.with_renderer(gl, "on_draw_frame", |renderer| renderer.on_draw_frame(gl));

            match self.session.swap() {
                Ok(()) => {}
                Err(WindowingApiError::ContextLost) => {
                    debug!(target: "glview::surface", "context lost {:?}", id);
                    lost_egl_context = true;
                }
                Err(err) => {
                    // Other errors typically mean the window is gone and we haven't been told
                    // yet. Stop drawing until it comes back.
                    warn!(target: "glview::thread", "eglSwapBuffers failed: {:?}", err);
                    let mut monitor = coordinator.lock();
                    monitor.thread_mut(id).surface_is_bad = true;
                    coordinator.notify_all();
                }
            }

            if want_render_notification {
                do_render_notification = true;
            }
        }
    }

    fn with_renderer<F>(&self, gl: &E::Gl, callback: &str, f: F)
                        where F: FnOnce(&mut dyn Renderer<E>) {
        let view = match self.view.upgrade() {
            Some(view) => view,
            None => return,
        };

        let debug_flags = view.debug_flags();
        if debug_flags.contains(DebugFlags::LOG_GL_CALLS) {
            trace!(target: "glview::renderer", "{} {:?}", callback, self.id);
        }
        view.with_renderer(f);
        if debug_flags.contains(DebugFlags::CHECK_GL_ERROR) {
            let err = gl.get_error();
            if err != gl::NO_ERROR {
                error!(target: "glview::renderer", "{}: GL error 0x{:x}", callback, err);
            }
        }
    }

    fn notify_surface_destroyed(&mut self) {
        debug!(target: "glview::renderer", "on_surface_destroyed {:?}", self.id);
        self.session.notify_surface_destroyed();
        self.surface_destroyed_notified = true;
    }

    /// The renderer must already have been notified, unless the thread is unwinding.
    fn stop_egl_surface_locked(&mut self, monitor: &mut MonitorState<E>) {
        let thread = monitor.thread_mut(self.id);
        if thread.have_egl_surface {
            thread.have_egl_surface = false;
            self.session.destroy_surface();
        }
        self.surface_destroyed_notified = false;
    }

    fn stop_egl_context_locked(&mut self, monitor: &mut MonitorState<E>) -> Result<(), Error> {
        let thread = monitor.thread_mut(self.id);
        if !thread.have_egl_context {
            return Ok(());
        }
        thread.have_egl_context = false;
        let result = self.session.finish();
        monitor.release_egl_context_locked(self.id);
        self.coordinator.notify_all();
        result
    }
}

/// Whether this pass of the loop is going to destroy the surface.
fn surface_must_stop<E>(thread: &ThreadState<E>, lost_egl_context: bool) -> bool
                        where E: EglApi {
    let pausing = thread.request_paused && !thread.paused;
    let window_lost = thread.native_window.is_none() && !thread.waiting_for_surface;
    thread.have_egl_surface &&
        (thread.should_release_egl_context || lost_egl_context || pausing || window_lost)
}

impl<E> Drop for RenderLoop<E> where E: EglApi {
    fn drop(&mut self) {
        debug!(target: "glview::thread", "tearing down {:?} at {:?}", self.id, self.session.state());
        let coordinator = self.coordinator.clone();
        let have_egl_surface = coordinator.lock().thread(self.id).have_egl_surface;
        if have_egl_surface && !self.surface_destroyed_notified {
            self.notify_surface_destroyed();
        }

        let mut monitor = coordinator.lock();
        self.stop_egl_surface_locked(&mut monitor);
        if let Err(err) = self.stop_egl_context_locked(&mut monitor) {
            error!(target: "glview::thread", "failed to release context of {:?}: {:?}", self.id, err);
        }
        monitor.thread_exiting_locked(self.id);
        coordinator.notify_all();
    }
}
