// glview/src/error.rs
//
//! Various errors that methods can produce.

/// Various errors that methods can produce.
///
/// Everything here except `RendererAlreadySet` and `NoRenderer` is fatal to the render thread
/// that hit it: the thread tears down its surface and context and exits, and the error is
/// handed back from `RenderThread::request_exit_and_wait()`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Error {
    /// The driver could not hand out a display connection.
    NoDisplay,
    /// The display connection could not be initialized.
    DisplayInitializationFailed(WindowingApiError),
    /// Choosing a pixel format (an EGL config) failed.
    PixelFormatSelectionFailed(WindowingApiError),
    /// No config matched the requested channel sizes.
    NoPixelFormatFound,
    /// The system couldn't create an OpenGL context.
    ContextCreationFailed(WindowingApiError),
    /// The system couldn't destroy the OpenGL context.
    ContextDestructionFailed(WindowingApiError),
    /// The view that owns the render thread has been dropped.
    ViewDropped,
    /// A renderer was already attached to this view, so its setup can no longer change.
    RendererAlreadySet,
    /// The operation needs a renderer, but none has been attached yet.
    NoRenderer,
    /// The operating system refused to spawn the render thread.
    ThreadSpawnFailed,
    /// `request_exit_and_wait()` was called on the render thread itself, which would deadlock.
    ExitRequestedFromRenderThread,
    /// A renderer callback panicked and brought the render thread down.
    RenderThreadPanicked,
    /// The native widget type does not match the supplied driver.
    IncompatibleNativeWidget,
}

/// Abstraction of the errors that EGL returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WindowingApiError {
    /// Miscellaneous error.
    Failed,
    /// EGL is not initialized, or could not be initialized, for the specified EGL display
    /// connection.
    NotInitialized,
    /// EGL cannot access a requested resource (for example a context is bound in another
    /// thread).
    BadAccess,
    /// EGL failed to allocate resources for the requested operation.
    BadAlloc,
    /// An unrecognized attribute or attribute value was passed in the attribute list.
    BadAttribute,
    /// The EGL configuration is unsupported.
    BadConfig,
    /// An EGLContext argument does not name a valid EGL rendering context.
    BadContext,
    /// The current surface of the calling thread is a window, pixel buffer or pixmap that is no
    /// longer valid.
    BadCurrentSurface,
    /// An EGLDisplay argument does not name a valid EGL display connection.
    BadDisplay,
    /// Arguments are inconsistent (for example, a valid context requires buffers not supplied by
    /// a valid surface).
    BadMatch,
    /// A NativePixmapType argument does not refer to a valid native pixmap.
    BadNativePixmap,
    /// A NativeWindowType argument does not refer to a valid native window.
    BadNativeWindow,
    /// One or more argument values are invalid.
    BadParameter,
    /// An EGLSurface argument does not name a valid surface (window, pixel buffer or pixmap)
    /// configured for GL rendering.
    BadSurface,
    /// A power management event has occurred. The application must destroy all contexts and
    /// reinitialise OpenGL ES state and objects to continue rendering.
    ContextLost,
}
