// glview/src/ar.rs
//
//! A render surface view that paints the camera feed of an augmented-reality engine.
//!
//! The engine itself (pose tracking, marker recognition) is opaque; it is reached only through
//! `ArEngine`.

use crate::config::{ChannelSizes, ComponentSizeChooser, ConfigRequest};
use crate::coordinator::ThreadCoordinator;
use crate::egl_api::EglApi;
use crate::factory::DefaultContextFactory;
use crate::gl::{ClearMask, GlFunctions};
use crate::view::{RenderSurfaceView, Renderer};
use crate::Error;

use euclid::default::Size2D;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// The ES client version the engine renders with.
pub const AR_CLIENT_VERSION: u8 = 2;

/// The two calls the view makes into the AR engine.
pub trait ArEngine: Send + Sync {
    /// Paints the current camera frame into the current viewport. Called on the render thread
    /// with the context current.
    fn render_camera(&self, viewport: Size2D<i32>, screen_angle: i32);
    /// Updates the camera projection after a layout change.
    fn update_projection(&self, camera: Size2D<i32>, viewport: Size2D<i32>, geo_angle: i32);
    /// The size of the camera frames.
    fn camera_size(&self) -> Size2D<i32>;
}

/// The orientation the host's configuration reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// The rotation of the display from its natural orientation, in quarter turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// Maps the platform's `0..=3` rotation index.
    pub fn from_index(index: i32) -> Option<Rotation> {
        match index {
            0 => Some(Rotation::Rotation0),
            1 => Some(Rotation::Rotation90),
            2 => Some(Rotation::Rotation180),
            3 => Some(Rotation::Rotation270),
            _ => None,
        }
    }
}

/// Normalizes the orientation so that it is independent of the device class: a screen angle of
/// 0 is always landscape, 90 always portrait, and so on.
///
/// Returns `(screen_angle, geo_angle)`.
pub fn normalized_angles(orientation: Orientation, rotation: Rotation) -> (i32, i32) {
    match (orientation, rotation) {
        (Orientation::Landscape, Rotation::Rotation0) => (0, 0),
        (Orientation::Landscape, Rotation::Rotation90) => (0, 270),
        (Orientation::Landscape, Rotation::Rotation180) => (180, 180),
        (Orientation::Landscape, Rotation::Rotation270) => (180, 90),
        (Orientation::Portrait, Rotation::Rotation0) => (90, 0),
        (Orientation::Portrait, Rotation::Rotation90) => (270, 270),
        (Orientation::Portrait, Rotation::Rotation180) => (270, 180),
        (Orientation::Portrait, Rotation::Rotation270) => (90, 90),
    }
}

/// Where and how the camera frame is painted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArViewport {
    pub size: Size2D<i32>,
    pub screen_angle: i32,
}

struct ArRendererState {
    engine: Arc<dyn ArEngine>,
    viewport: Mutex<ArViewport>,
    active: AtomicBool,
}

/// Clears the frame and has the engine paint the camera feed into it.
///
/// Clones share their state, so the view keeps one to update the viewport while the render
/// thread draws with another.
#[derive(Clone)]
pub struct ArRenderer {
    state: Arc<ArRendererState>,
}

impl ArRenderer {
    /// The renderer starts inactive: it draws nothing until `set_active(true)`.
    pub fn new(engine: Arc<dyn ArEngine>) -> ArRenderer {
        ArRenderer {
            state: Arc::new(ArRendererState {
                engine,
                viewport: Mutex::new(ArViewport::default()),
                active: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.state.active.store(active, Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn viewport(&self) -> ArViewport {
        *self.state.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the new viewport and forwards the projection change to the engine.
    pub fn update_viewport(&self, size: Size2D<i32>, screen_angle: i32, geo_angle: i32) {
        *self.state.viewport.lock().unwrap_or_else(PoisonError::into_inner) =
            ArViewport { size, screen_angle };
        let engine = &self.state.engine;
        engine.update_projection(engine.camera_size(), size, geo_angle);
    }
}

impl<E> Renderer<E> for ArRenderer where E: EglApi {
    fn on_surface_created(&mut self, gl: &E::Gl, _: E::Config) {
        gl.clear_color(1.0, 1.0, 1.0, 1.0);
    }

    fn on_surface_changed(&mut self, _: &E::Gl, _: Size2D<i32>) {}

    fn on_surface_destroyed(&mut self) {}

    fn on_draw_frame(&mut self, gl: &E::Gl) {
        if !self.is_active() {
            return;
        }

        gl.clear(ClearMask::COLOR | ClearMask::DEPTH);
        let viewport = self.viewport();
        self.state.engine.render_camera(viewport.size, viewport.screen_angle);
        gl.finish();
    }
}

/// The chooser the AR view uses: RGB 888 with a 16-bit depth buffer out of the ES 2 configs with
/// at least 4 bits per color channel, settling for any depth of 16 bits or more.
pub fn ar_config_chooser() -> ComponentSizeChooser {
    let request = ConfigRequest::new(ChannelSizes::new(8, 8, 8, 0, 16, 0), AR_CLIENT_VERSION);
    ComponentSizeChooser::new(request).with_minimum(ChannelSizes::new(4, 4, 4, 0, 0, 0))
                                      .relax_depth(true)
}

/// A render surface view set up for the AR engine.
pub struct ArView<E: EglApi> {
    view: RenderSurfaceView<E>,
    renderer: ArRenderer,
}

impl<E> ArView<E> where E: EglApi {
    /// Configures the view, attaches an active `ArRenderer`, and starts the render thread.
    pub fn new(egl: Arc<E>, coordinator: Arc<ThreadCoordinator<E>>, engine: Arc<dyn ArEngine>)
               -> Result<ArView<E>, Error> {
        let mut view = RenderSurfaceView::new(egl, coordinator);
        view.set_context_client_version(AR_CLIENT_VERSION)?;
        view.set_context_factory(DefaultContextFactory::new(AR_CLIENT_VERSION))?;
        view.set_config_chooser(ar_config_chooser())?;

        let renderer = ArRenderer::new(engine);
        view.set_renderer(renderer.clone())?;
        renderer.set_active(true);
        Ok(ArView { view, renderer })
    }

    #[inline]
    pub fn view(&self) -> &RenderSurfaceView<E> {
        &self.view
    }

    #[inline]
    pub fn view_mut(&mut self) -> &mut RenderSurfaceView<E> {
        &mut self.view
    }

    #[inline]
    pub fn renderer(&self) -> &ArRenderer {
        &self.renderer
    }

    /// The view was laid out. Recomputes the viewport and the normalized angles and hands them
    /// to the renderer.
    pub fn on_layout(&self,
                     changed: bool,
                     left: i32,
                     top: i32,
                     right: i32,
                     bottom: i32,
                     orientation: Orientation,
                     rotation: Rotation) {
        if !changed {
            return;
        }
        let (screen_angle, geo_angle) = normalized_angles(orientation, rotation);
        self.renderer.update_viewport(Size2D::new(right - left, bottom - top),
                                      screen_angle,
                                      geo_angle);
    }
}
