// glview/src/platform/egl/mod.rs
//
//! The system EGL driver, on Android and Linux.
//!
//! `libEGL` is opened at runtime. GL entry points are resolved through `eglGetProcAddress`,
//! falling back to `libGLESv2` for core functions older drivers don't export that way.

mod error;

use self::error::last_error;
use crate::egl::types::{EGLConfig, EGLContext, EGLDisplay, EGLNativeWindowType, EGLSurface};
use crate::egl::types::EGLint;
use crate::egl::{self, Egl};
use crate::egl_api::EglApi;
#[cfg(feature = "sm-raw-window-handle-06")]
use crate::Error;
use crate::WindowingApiError;

use libc::{dlopen, dlsym, RTLD_LAZY};
use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::c_void;
use std::ptr;
use std::sync::LazyLock;

thread_local! {
    pub static EGL_FUNCTIONS: Egl = Egl::load_with(get_proc_address);
}

static EGL_LIBRARY: LazyLock<Option<LibraryWrapper>> = LazyLock::new(|| {
    open_library(&[c"libEGL.so.1", c"libEGL.so"])
});

static GLES_LIBRARY: LazyLock<Option<LibraryWrapper>> = LazyLock::new(|| {
    open_library(&[c"libGLESv2.so.2", c"libGLESv2.so"])
});

struct LibraryWrapper(*mut c_void);

unsafe impl Send for LibraryWrapper {}
unsafe impl Sync for LibraryWrapper {}

fn open_library(sonames: &[&CStr]) -> Option<LibraryWrapper> {
    for soname in sonames {
        unsafe {
            let handle = dlopen(soname.as_ptr(), RTLD_LAZY);
            if !handle.is_null() {
                return Some(LibraryWrapper(handle));
            }
        }
    }
    None
}

fn lookup(library: &Option<LibraryWrapper>, symbol_name: &str) -> *const c_void {
    let (library, symbol_name) = match (library, CString::new(symbol_name)) {
        (Some(library), Ok(symbol_name)) => (library, symbol_name),
        _ => return ptr::null(),
    };
    unsafe { dlsym(library.0, symbol_name.as_ptr()).cast_const() }
}

fn get_proc_address(symbol_name: &str) -> *const c_void {
    lookup(&EGL_LIBRARY, symbol_name)
}

fn get_gl_proc_address(symbol_name: &CStr) -> *const c_void {
    let address = EGL_FUNCTIONS.with(|egl| unsafe {
        mem::transmute::<_, *const c_void>(egl.GetProcAddress(symbol_name.as_ptr()))
    });
    if !address.is_null() {
        return address;
    }
    match symbol_name.to_str() {
        Ok(symbol_name) => lookup(&GLES_LIBRARY, symbol_name),
        Err(_) => ptr::null(),
    }
}

macro_rules! egl_handle {
    ($name:ident, $raw:ty) => {
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct $name(pub $raw);

        // EGL handles are plain identifiers and may be used from any thread.
        unsafe impl Send for $name {}
    };
}

egl_handle!(NativeDisplay, EGLDisplay);
egl_handle!(NativeConfig, EGLConfig);
egl_handle!(NativeContext, EGLContext);
egl_handle!(NativeSurface, EGLSurface);
egl_handle!(NativeWindow, EGLNativeWindowType);

impl NativeWindow {
    /// Wraps the native window behind a `raw-window-handle` window handle.
    #[cfg(feature = "sm-raw-window-handle-06")]
    pub fn from_window_handle(handle: rwh_06::WindowHandle) -> Result<NativeWindow, Error> {
        use rwh_06::RawWindowHandle::{AndroidNdk, Xlib};

        match handle.as_raw() {
            AndroidNdk(handle) => Ok(NativeWindow(handle.a_native_window.as_ptr() as *const _)),
            Xlib(handle) => Ok(NativeWindow(handle.window as usize as *const _)),
            _ => Err(Error::IncompatibleNativeWidget),
        }
    }
}

/// The system EGL driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEgl;

impl SystemEgl {
    #[inline]
    pub fn new() -> SystemEgl {
        SystemEgl
    }

    /// Whether `libEGL` could be opened at all.
    pub fn is_available() -> bool {
        EGL_LIBRARY.is_some()
    }
}

fn check(result: egl::types::EGLBoolean) -> Result<(), WindowingApiError> {
    if result == egl::FALSE {
        return Err(last_error());
    }
    Ok(())
}

impl EglApi for SystemEgl {
    type Display = NativeDisplay;
    type Config = NativeConfig;
    type Context = NativeContext;
    type Surface = NativeSurface;
    type NativeWindow = NativeWindow;
    type Gl = glow::Context;

    fn get_display(&self) -> Option<NativeDisplay> {
        if !SystemEgl::is_available() {
            return None;
        }
        let display = EGL_FUNCTIONS.with(|egl| unsafe { egl.GetDisplay(egl::DEFAULT_DISPLAY) });
        if display == egl::NO_DISPLAY {
            return None;
        }
        Some(NativeDisplay(display))
    }

    fn initialize(&self, display: NativeDisplay) -> Result<(i32, i32), WindowingApiError> {
        let (mut major, mut minor) = (0, 0);
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl.Initialize(display.0, &mut major, &mut minor)) })?;
        Ok((major, minor))
    }

    fn terminate(&self, display: NativeDisplay) -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl.Terminate(display.0)) })
    }

    fn config_count(&self, display: NativeDisplay, attributes: &[i32])
                    -> Result<usize, WindowingApiError> {
        let mut config_count = 0;
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl.ChooseConfig(display.0,
                                   attributes.as_ptr(),
                                   ptr::null_mut(),
                                   0,
                                   &mut config_count))
        })?;
        Ok(config_count.max(0) as usize)
    }

    fn choose_configs(&self, display: NativeDisplay, attributes: &[i32], max: usize)
                      -> Result<Vec<NativeConfig>, WindowingApiError> {
        let mut configs: Vec<EGLConfig> = vec![ptr::null(); max];
        let mut config_count = 0;
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl.ChooseConfig(display.0,
                                   attributes.as_ptr(),
                                   configs.as_mut_ptr(),
                                   max as EGLint,
                                   &mut config_count))
        })?;
        configs.truncate(config_count.max(0) as usize);
        Ok(configs.into_iter().map(NativeConfig).collect())
    }

    fn get_config_attrib(&self, display: NativeDisplay, config: NativeConfig, attribute: i32)
                         -> Option<i32> {
        let mut value = 0;
        let result = EGL_FUNCTIONS.with(|egl| unsafe {
            egl.GetConfigAttrib(display.0, config.0, attribute, &mut value)
        });
        if result == egl::FALSE {
            return None;
        }
        Some(value)
    }

    fn create_context(&self,
                      display: NativeDisplay,
                      config: NativeConfig,
                      share_context: Option<NativeContext>,
                      attributes: &[i32])
                      -> Result<NativeContext, WindowingApiError> {
        let share_context = share_context.map_or(egl::NO_CONTEXT, |context| context.0);
        let context = EGL_FUNCTIONS.with(|egl| unsafe {
            egl.CreateContext(display.0, config.0, share_context, attributes.as_ptr())
        });
        if context == egl::NO_CONTEXT {
            return Err(last_error());
        }
        Ok(NativeContext(context))
    }

    fn destroy_context(&self, display: NativeDisplay, context: NativeContext)
                       -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl.DestroyContext(display.0, context.0)) })
    }

    fn create_window_surface(&self,
                             display: NativeDisplay,
                             config: NativeConfig,
                             window: NativeWindow,
                             attributes: &[i32])
                             -> Result<NativeSurface, WindowingApiError> {
        let surface = EGL_FUNCTIONS.with(|egl| unsafe {
            egl.CreateWindowSurface(display.0, config.0, window.0, attributes.as_ptr())
        });
        if surface == egl::NO_SURFACE {
            return Err(last_error());
        }
        Ok(NativeSurface(surface))
    }

    fn destroy_surface(&self, display: NativeDisplay, surface: NativeSurface)
                       -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl.DestroySurface(display.0, surface.0)) })
    }

    fn make_current(&self,
                    display: NativeDisplay,
                    surface: Option<NativeSurface>,
                    context: Option<NativeContext>)
                    -> Result<(), WindowingApiError> {
        let surface = surface.map_or(egl::NO_SURFACE, |surface| surface.0);
        let context = context.map_or(egl::NO_CONTEXT, |context| context.0);
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl.MakeCurrent(display.0, surface, surface, context))
        })
    }

    fn swap_buffers(&self, display: NativeDisplay, surface: NativeSurface)
                    -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl.SwapBuffers(display.0, surface.0)) })
    }

    fn create_gl(&self, _: NativeContext) -> glow::Context {
        unsafe { glow::Context::from_loader_function_cstr(get_gl_proc_address) }
    }
}
