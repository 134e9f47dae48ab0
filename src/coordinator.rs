// glview/src/coordinator.rs
//
//! Arbitration of the context right-of-use between render threads.
//!
//! One `ThreadCoordinator` is shared by every render thread that draws through the same driver.
//! Its mutex is the monitor all of those threads' state lives under; its condition variable is
//! the only thing anybody in this crate waits on.

use crate::egl_api::EglApi;
use crate::thread::ThreadState;

use fnv::FnvHashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// GLES 2.0, as encoded by `ro.opengles.version`.
pub const GLES_20: i32 = 0x20000;

/// Renderer string prefix of the driver family that can only keep one context alive.
pub const MSM7K_RENDERER_PREFIX: &str = "Q3Dimension MSM7500 ";

/// Identifies a render thread registered with a coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderThreadId(pub u64);

/// The process-wide arbiter of context ownership and the shared monitor of all render threads.
pub struct ThreadCoordinator<E: EglApi> {
    monitor: Mutex<MonitorState<E>>,
    condvar: Condvar,
}

/// Everything guarded by the shared monitor.
pub(crate) struct MonitorState<E: EglApi> {
    pub(crate) threads: FnvHashMap<RenderThreadId, ThreadState<E>>,
    next_thread_id: u64,
    owner: Option<RenderThreadId>,
    gles_version: i32,
    gles_version_check_complete: bool,
    gles_driver_check_complete: bool,
    multiple_contexts_allowed: bool,
    limited_contexts: bool,
}

impl<E> ThreadCoordinator<E> where E: EglApi {
    /// Creates a coordinator for a driver whose GLES version is unknown.
    pub fn new() -> ThreadCoordinator<E> {
        ThreadCoordinator::with_gles_version(0)
    }

    /// Creates a coordinator for a driver reporting `gles_version` (`GLES_20` for 2.0).
    pub fn with_gles_version(gles_version: i32) -> ThreadCoordinator<E> {
        ThreadCoordinator {
            monitor: Mutex::new(MonitorState {
                threads: FnvHashMap::default(),
                next_thread_id: 0,
                owner: None,
                gles_version,
                gles_version_check_complete: false,
                gles_driver_check_complete: false,
                multiple_contexts_allowed: false,
                limited_contexts: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Locks the shared monitor. A panic on another thread does not wedge the monitor.
    pub(crate) fn lock(&self) -> MutexGuard<'_, MonitorState<E>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Releases the monitor until some thread calls `notify_all()`, then reacquires it.
    pub(crate) fn wait<'a>(&self, guard: MutexGuard<'a, MonitorState<E>>)
                           -> MutexGuard<'a, MonitorState<E>> {
        self.condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_all(&self) {
        self.condvar.notify_all()
    }

    /// Adds a render thread to the monitor.
    pub(crate) fn register_thread(&self, state: ThreadState<E>) -> RenderThreadId {
        let mut monitor = self.lock();
        let id = RenderThreadId(monitor.next_thread_id);
        monitor.next_thread_id += 1;
        monitor.threads.insert(id, state);
        id
    }

    pub(crate) fn unregister_thread(&self, id: RenderThreadId) {
        let mut monitor = self.lock();
        monitor.threads.remove(&id);
        monitor.release_egl_context_locked(id);
        self.notify_all();
    }

    /// Tries once to acquire the right to use a context. Does not block.
    ///
    /// If another thread holds it and contexts are scarce, that thread is asked to let go and
    /// this returns `false`; the caller is expected to try again after the next wakeup.
    pub fn try_acquire(&self, id: RenderThreadId) -> bool {
        let acquired = self.lock().try_acquire_egl_context_locked(id);
        self.notify_all();
        acquired
    }

    /// Gives up the right to use a context, if `id` holds it.
    pub fn release(&self, id: RenderThreadId) {
        self.lock().release_egl_context_locked(id);
        self.notify_all();
    }

    /// The thread currently holding the right to use a context.
    pub fn owner(&self) -> Option<RenderThreadId> {
        self.lock().owner
    }

    /// Whether `id` has been asked to give up its context and has not done so yet.
    pub fn release_requested(&self, id: RenderThreadId) -> bool {
        self.lock().threads.get(&id).map_or(false, |thread| thread.should_release_egl_context)
    }

    pub fn should_release_when_pausing(&self) -> bool {
        self.lock().should_release_egl_context_when_pausing()
    }

    pub fn should_terminate_when_pausing(&self) -> bool {
        self.lock().should_terminate_egl_when_pausing()
    }

    pub fn multiple_contexts_allowed(&self) -> bool {
        let mut monitor = self.lock();
        monitor.check_gles_version();
        monitor.multiple_contexts_allowed
    }

    /// Probes the driver, identified by its `GL_RENDERER` string. Only the first call in the
    /// coordinator's lifetime has any effect.
    pub fn check_gl_driver(&self, renderer: &str) {
        let mut monitor = self.lock();
        if monitor.gles_driver_check_complete {
            return;
        }

        monitor.check_gles_version();
        if monitor.gles_version < GLES_20 {
            monitor.multiple_contexts_allowed = !renderer.starts_with(MSM7K_RENDERER_PREFIX);
            self.notify_all();
        }
        monitor.limited_contexts = !monitor.multiple_contexts_allowed;
        debug!(target: "glview::surface",
               "check_gl_driver renderer = {:?} multiple_contexts_allowed = {} \
                limited_contexts = {}",
               renderer,
               monitor.multiple_contexts_allowed,
               monitor.limited_contexts);
        monitor.gles_driver_check_complete = true;
    }
}

impl<E> Default for ThreadCoordinator<E> where E: EglApi {
    fn default() -> ThreadCoordinator<E> {
        ThreadCoordinator::new()
    }
}

impl<E> Debug for ThreadCoordinator<E> where E: EglApi {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        let monitor = self.lock();
        formatter.debug_struct("ThreadCoordinator")
                 .field("threads", &monitor.threads.len())
                 .field("owner", &monitor.owner)
                 .field("multiple_contexts_allowed", &monitor.multiple_contexts_allowed)
                 .field("limited_contexts", &monitor.limited_contexts)
                 .finish()
    }
}

impl<E> MonitorState<E> where E: EglApi {
    /// The state of a registered render thread.
    ///
    /// Threads stay registered for as long as their `RenderThread` handle lives, which outlasts
    /// both the thread and every caller holding the handle.
    pub(crate) fn thread_mut(&mut self, id: RenderThreadId) -> &mut ThreadState<E> {
        match self.threads.get_mut(&id) {
            Some(thread) => thread,
            None => panic!("render thread {:?} is not registered", id),
        }
    }

    pub(crate) fn thread(&self, id: RenderThreadId) -> &ThreadState<E> {
        match self.threads.get(&id) {
            Some(thread) => thread,
            None => panic!("render thread {:?} is not registered", id),
        }
    }

    /// Marks `id` as exited and drops its claim on the context. The caller notifies.
    pub(crate) fn thread_exiting_locked(&mut self, id: RenderThreadId) {
        debug!(target: "glview::thread", "exiting {:?}", id);
        if let Some(thread) = self.threads.get_mut(&id) {
            thread.exited = true;
            if thread.orphaned {
                self.threads.remove(&id);
            }
        }
        if self.owner == Some(id) {
            self.owner = None;
        }
    }

    /// The caller notifies.
    pub(crate) fn try_acquire_egl_context_locked(&mut self, id: RenderThreadId) -> bool {
        if self.owner.is_none() || self.owner == Some(id) {
            self.owner = Some(id);
            return true;
        }

        self.check_gles_version();
        if self.multiple_contexts_allowed {
            return true;
        }

        // Ask the owning thread to release the context.
        if let Some(owner) = self.owner {
            if let Some(thread) = self.threads.get_mut(&owner) {
                thread.should_release_egl_context = true;
            }
        }
        false
    }

    /// The caller notifies.
    pub(crate) fn release_egl_context_locked(&mut self, id: RenderThreadId) {
        if self.owner == Some(id) {
            self.owner = None;
        }
    }

    /// Release the context when pausing even if the hardware supports multiple contexts, as
    /// otherwise the device could run out of them.
    pub(crate) fn should_release_egl_context_when_pausing(&self) -> bool {
        self.limited_contexts
    }

    pub(crate) fn should_terminate_egl_when_pausing(&mut self) -> bool {
        self.check_gles_version();
        !self.multiple_contexts_allowed
    }

    fn check_gles_version(&mut self) {
        if !self.gles_version_check_complete {
            self.multiple_contexts_allowed = true;
            self.gles_version_check_complete = true;
        }
    }
}
