// glview/src/platform/headless/mod.rs
//
//! An in-memory driver with EGL semantics and no GPU behind it.
//!
//! Configs, contexts, surfaces, and windows are plain records. The driver counts everything it
//! creates and destroys, and faults can be injected into it, which makes it the driver the render
//! thread machinery is tested against.

pub mod gl;

pub use self::gl::HeadlessGl;

use crate::config::ChannelSizes;
use crate::egl_api::{attrib, EglApi, RenderableType};
use crate::WindowingApiError;

use fnv::{FnvHashMap, FnvHashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The renderer string reported when none is configured.
pub const DEFAULT_RENDERER: &str = "glview headless";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessDisplay(u32);

/// An index into the driver's config list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessConfig(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessContext(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessSurface(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessWindow(u64);

/// One pixel format the driver offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessConfigDesc {
    pub sizes: ChannelSizes,
    pub renderable: RenderableType,
}

impl HeadlessConfigDesc {
    #[inline]
    pub fn new(sizes: ChannelSizes, renderable: RenderableType) -> HeadlessConfigDesc {
        HeadlessConfigDesc { sizes, renderable }
    }

    /// RGB 888 without alpha, renderable with ES 1 and 2.
    pub fn rgb888(depth: i32, stencil: i32) -> HeadlessConfigDesc {
        HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 0, depth, stencil),
                                RenderableType::OPENGL_ES | RenderableType::OPENGL_ES2)
    }

    /// A config list shaped like what a typical phone driver reports.
    pub fn typical() -> Vec<HeadlessConfigDesc> {
        let es = RenderableType::OPENGL_ES | RenderableType::OPENGL_ES2 | RenderableType::OPENGL_ES3;
        vec![
            HeadlessConfigDesc::new(ChannelSizes::new(5, 6, 5, 0, 0, 0), es),
            HeadlessConfigDesc::new(ChannelSizes::new(5, 6, 5, 0, 16, 0), es),
            HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 8, 0, 0), es),
            HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 8, 24, 8), es),
            HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 0, 0, 0), es),
            HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 0, 24, 8), es),
            HeadlessConfigDesc::new(ChannelSizes::new(8, 8, 8, 0, 16, 0), es),
        ]
    }

    fn attrib(&self, index: usize, name: i32) -> Option<i32> {
        match name {
            attrib::RED_SIZE => Some(self.sizes.red),
            attrib::GREEN_SIZE => Some(self.sizes.green),
            attrib::BLUE_SIZE => Some(self.sizes.blue),
            attrib::ALPHA_SIZE => Some(self.sizes.alpha),
            attrib::DEPTH_SIZE => Some(self.sizes.depth),
            attrib::STENCIL_SIZE => Some(self.sizes.stencil),
            attrib::RENDERABLE_TYPE => Some(self.renderable.bits()),
            attrib::CONFIG_ID => Some(index as i32 + 1),
            _ => None,
        }
    }

    /// `eglChooseConfig` matching: sizes are minimums, the renderable type is a mask, the config
    /// ID is exact, and `DONT_CARE` matches anything.
    fn matches(&self, index: usize, attributes: &[i32]) -> Result<bool, WindowingApiError> {
        for pair in attributes.chunks(2) {
            let (name, value) = match *pair {
                [attrib::NONE, ..] => break,
                [name, value] => (name, value),
                _ => return Err(WindowingApiError::BadAttribute),
            };
            if value == attrib::DONT_CARE {
                continue;
            }
            let actual = self.attrib(index, name).ok_or(WindowingApiError::BadAttribute)?;
            let matched = match name {
                attrib::RENDERABLE_TYPE => actual & value == value,
                attrib::CONFIG_ID => actual == value,
                _ => actual >= value,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// What the driver has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub initializations: u32,
    pub terminations: u32,
    pub contexts_created: u32,
    pub contexts_destroyed: u32,
    pub max_live_contexts: u32,
    pub surfaces_created: u32,
    pub surfaces_destroyed: u32,
    pub swaps: u32,
    pub clears: u32,
    pub finishes: u32,
}

pub(crate) struct HeadlessState {
    configs: Vec<HeadlessConfigDesc>,
    renderer: String,
    display_available: bool,
    init_count: u32,
    next_id: u64,
    windows: FnvHashSet<HeadlessWindow>,
    contexts: FnvHashSet<HeadlessContext>,
    surfaces: FnvHashMap<HeadlessSurface, HeadlessWindow>,
    fail_context_creation: Option<WindowingApiError>,
    fail_next_swap: Option<WindowingApiError>,
    pub(crate) pending_gl_error: u32,
    pub(crate) clear_color: [f32; 4],
    pub(crate) stats: HeadlessStats,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_initialized(&self) -> Result<(), WindowingApiError> {
        if self.init_count == 0 {
            return Err(WindowingApiError::NotInitialized);
        }
        Ok(())
    }

    fn config(&self, config: HeadlessConfig) -> Result<HeadlessConfigDesc, WindowingApiError> {
        self.configs.get(config.0).copied().ok_or(WindowingApiError::BadConfig)
    }

    fn matching_configs(&self, attributes: &[i32])
                        -> Result<Vec<HeadlessConfig>, WindowingApiError> {
        let mut configs = vec![];
        for (index, desc) in self.configs.iter().enumerate() {
            if desc.matches(index, attributes)? {
                configs.push(HeadlessConfig(index));
            }
        }
        Ok(configs)
    }
}

/// The headless driver. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HeadlessEgl {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessEgl {
    /// A driver offering `HeadlessConfigDesc::typical()`.
    pub fn new() -> HeadlessEgl {
        HeadlessEgl::with_configs(HeadlessConfigDesc::typical())
    }

    pub fn with_configs(configs: Vec<HeadlessConfigDesc>) -> HeadlessEgl {
        HeadlessEgl {
            state: Arc::new(Mutex::new(HeadlessState {
                configs,
                renderer: DEFAULT_RENDERER.to_owned(),
                display_available: true,
                init_count: 0,
                next_id: 0,
                windows: FnvHashSet::default(),
                contexts: FnvHashSet::default(),
                surfaces: FnvHashMap::default(),
                fail_context_creation: None,
                fail_next_swap: None,
                pending_gl_error: 0,
                clear_color: [0.0; 4],
                stats: HeadlessStats::default(),
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the `GL_RENDERER` string contexts report.
    pub fn set_renderer(&self, renderer: &str) {
        self.lock().renderer = renderer.to_owned();
    }

    /// Makes `get_display()` fail (or succeed again).
    pub fn set_display_available(&self, available: bool) {
        self.lock().display_available = available;
    }

    /// Makes every context creation fail with `error` until cleared with `None`.
    pub fn set_context_creation_error(&self, error: Option<WindowingApiError>) {
        self.lock().fail_context_creation = error;
    }

    /// Makes the next swap fail with `error`.
    pub fn fail_next_swap(&self, error: WindowingApiError) {
        self.lock().fail_next_swap = Some(error);
    }

    /// Makes the next `glGetError` return `error`.
    pub fn set_gl_error(&self, error: u32) {
        self.lock().pending_gl_error = error;
    }

    /// The error the next `glGetError` will return.
    pub fn pending_gl_error(&self) -> u32 {
        self.lock().pending_gl_error
    }

    /// Creates a native window surfaces can be bound to.
    pub fn create_window(&self) -> HeadlessWindow {
        let mut state = self.lock();
        let window = HeadlessWindow(state.next_id());
        state.windows.insert(window);
        window
    }

    /// Destroys a native window. Surfaces bound to it stop presenting.
    pub fn destroy_window(&self, window: HeadlessWindow) {
        self.lock().windows.remove(&window);
    }

    pub fn stats(&self) -> HeadlessStats {
        self.lock().stats
    }

    pub fn live_contexts(&self) -> usize {
        self.lock().contexts.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.lock().surfaces.len()
    }

    /// Whether any display connection is still initialized.
    pub fn is_initialized(&self) -> bool {
        self.lock().init_count > 0
    }

    /// The last color passed to `glClearColor`.
    pub fn clear_color(&self) -> [f32; 4] {
        self.lock().clear_color
    }

    pub fn config_desc(&self, config: HeadlessConfig) -> Option<HeadlessConfigDesc> {
        self.lock().config(config).ok()
    }
}

impl Default for HeadlessEgl {
    fn default() -> HeadlessEgl {
        HeadlessEgl::new()
    }
}

impl EglApi for HeadlessEgl {
    type Display = HeadlessDisplay;
    type Config = HeadlessConfig;
    type Context = HeadlessContext;
    type Surface = HeadlessSurface;
    type NativeWindow = HeadlessWindow;
    type Gl = HeadlessGl;

    fn get_display(&self) -> Option<HeadlessDisplay> {
        if self.lock().display_available {
            Some(HeadlessDisplay(0))
        } else {
            None
        }
    }

    fn initialize(&self, _: HeadlessDisplay) -> Result<(i32, i32), WindowingApiError> {
        let mut state = self.lock();
        state.init_count += 1;
        state.stats.initializations += 1;
        Ok((1, 5))
    }

    fn terminate(&self, _: HeadlessDisplay) -> Result<(), WindowingApiError> {
        let mut state = self.lock();
        state.check_initialized()?;
        state.init_count -= 1;
        state.stats.terminations += 1;
        Ok(())
    }

    fn config_count(&self, _: HeadlessDisplay, attributes: &[i32])
                    -> Result<usize, WindowingApiError> {
        let state = self.lock();
        state.check_initialized()?;
        Ok(state.matching_configs(attributes)?.len())
    }

    fn choose_configs(&self, _: HeadlessDisplay, attributes: &[i32], max: usize)
                      -> Result<Vec<HeadlessConfig>, WindowingApiError> {
        let state = self.lock();
        state.check_initialized()?;
        let mut configs = state.matching_configs(attributes)?;
        configs.truncate(max);
        Ok(configs)
    }

    fn get_config_attrib(&self, _: HeadlessDisplay, config: HeadlessConfig, attribute: i32)
                         -> Option<i32> {
        self.lock().config(config).ok()?.attrib(config.0, attribute)
    }

    fn create_context(&self,
                      _: HeadlessDisplay,
                      config: HeadlessConfig,
                      _: Option<HeadlessContext>,
                      attributes: &[i32])
                      -> Result<HeadlessContext, WindowingApiError> {
        let mut state = self.lock();
        state.check_initialized()?;
        if let Some(err) = state.fail_context_creation {
            return Err(err);
        }

        let desc = state.config(config)?;
        let mut client_version = 1;
        for pair in attributes.chunks(2) {
            match *pair {
                [attrib::NONE, ..] => break,
                [attrib::CONTEXT_CLIENT_VERSION, value] => client_version = value,
                _ => return Err(WindowingApiError::BadAttribute),
            }
        }
        if let Some(required) = RenderableType::for_client_version(client_version as u8) {
            if !desc.renderable.contains(required) {
                return Err(WindowingApiError::BadConfig);
            }
        }

        let context = HeadlessContext(state.next_id());
        state.contexts.insert(context);
        state.stats.contexts_created += 1;
        state.stats.max_live_contexts = state.stats.max_live_contexts.max(state.contexts.len() as u32);
        Ok(context)
    }

    fn destroy_context(&self, _: HeadlessDisplay, context: HeadlessContext)
                       -> Result<(), WindowingApiError> {
        let mut state = self.lock();
        if !state.contexts.remove(&context) {
            return Err(WindowingApiError::BadContext);
        }
        state.stats.contexts_destroyed += 1;
        Ok(())
    }

    fn create_window_surface(&self,
                             _: HeadlessDisplay,
                             config: HeadlessConfig,
                             window: HeadlessWindow,
                             _: &[i32])
                             -> Result<HeadlessSurface, WindowingApiError> {
        let mut state = self.lock();
        state.check_initialized()?;
        state.config(config)?;
        if !state.windows.contains(&window) {
            return Err(WindowingApiError::BadNativeWindow);
        }

        let surface = HeadlessSurface(state.next_id());
        state.surfaces.insert(surface, window);
        state.stats.surfaces_created += 1;
        Ok(surface)
    }

    fn destroy_surface(&self, _: HeadlessDisplay, surface: HeadlessSurface)
                       -> Result<(), WindowingApiError> {
        let mut state = self.lock();
        if state.surfaces.remove(&surface).is_none() {
            return Err(WindowingApiError::BadSurface);
        }
        state.stats.surfaces_destroyed += 1;
        Ok(())
    }

    fn make_current(&self,
                    _: HeadlessDisplay,
                    surface: Option<HeadlessSurface>,
                    context: Option<HeadlessContext>)
                    -> Result<(), WindowingApiError> {
        let state = self.lock();
        if let Some(surface) = surface {
            match state.surfaces.get(&surface) {
                None => return Err(WindowingApiError::BadSurface),
                Some(window) if !state.windows.contains(window) => {
                    return Err(WindowingApiError::BadNativeWindow)
                }
                Some(_) => {}
            }
        }
        if let Some(context) = context {
            if !state.contexts.contains(&context) {
                return Err(WindowingApiError::BadContext);
            }
        }
        Ok(())
    }

    fn swap_buffers(&self, _: HeadlessDisplay, surface: HeadlessSurface)
                    -> Result<(), WindowingApiError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_next_swap.take() {
            return Err(err);
        }
        match state.surfaces.get(&surface) {
            None => return Err(WindowingApiError::BadSurface),
            Some(window) if !state.windows.contains(window) => {
                return Err(WindowingApiError::BadNativeWindow)
            }
            Some(_) => {}
        }
        state.stats.swaps += 1;
        Ok(())
    }

    fn create_gl(&self, context: HeadlessContext) -> HeadlessGl {
        let renderer = self.lock().renderer.clone();
        HeadlessGl::new(self.clone(), context, renderer)
    }
}
