// glview/src/tests.rs
//
//! Unit tests, run against the headless driver.

use crate::ar::{self, ArEngine, ArView, Orientation, Rotation};
use crate::config::{ChannelSizes, ComponentSizeChooser, ConfigChooser, ConfigRequest};
use crate::coordinator::{RenderThreadId, ThreadCoordinator, MSM7K_RENDERER_PREFIX};
use crate::egl_api::{attrib, EglApi, RenderableType};
use crate::factory::{DefaultContextFactory, DefaultWindowSurfaceFactory};
use crate::platform::headless::{HeadlessConfigDesc, HeadlessEgl, HeadlessGl};
use crate::session::{Session, SessionState};
use crate::thread::{RenderMode, ThreadState};
use crate::view::{DebugFlags, GlWrapper, RenderSurfaceView, Renderer, ViewShared};
use crate::{Error, WindowingApiError};

use euclid::default::Size2D;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq)]
enum Callback {
    SurfaceCreated,
    SurfaceChanged(i32, i32),
    SurfaceDestroyed,
    DrawFrame,
}

#[derive(Clone, Default)]
struct CallbackLog {
    callbacks: Arc<Mutex<Vec<Callback>>>,
    frames: Arc<AtomicUsize>,
}

impl CallbackLog {
    fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    fn callbacks(&self) -> Vec<Callback> {
        self.callbacks.lock().unwrap().clone()
    }

    fn count(&self, callback: Callback) -> usize {
        self.callbacks().into_iter().filter(|&logged| logged == callback).count()
    }

    fn clear(&self) {
        self.callbacks.lock().unwrap().clear()
    }
}

struct RecordingRenderer {
    log: CallbackLog,
}

impl Renderer<HeadlessEgl> for RecordingRenderer {
    fn on_surface_created(&mut self, _: &HeadlessGl, _: <HeadlessEgl as EglApi>::Config) {
        self.log.callbacks.lock().unwrap().push(Callback::SurfaceCreated);
    }

    fn on_surface_changed(&mut self, _: &HeadlessGl, size: Size2D<i32>) {
        self.log.callbacks.lock().unwrap().push(Callback::SurfaceChanged(size.width, size.height));
    }

    fn on_surface_destroyed(&mut self) {
        self.log.callbacks.lock().unwrap().push(Callback::SurfaceDestroyed);
    }

    fn on_draw_frame(&mut self, _: &HeadlessGl) {
        // Don't flood the log in continuous mode.
        let mut callbacks = self.log.callbacks.lock().unwrap();
        if callbacks.last() != Some(&Callback::DrawFrame) {
            callbacks.push(Callback::DrawFrame);
        }
        self.log.frames.fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickingRenderer;

impl Renderer<HeadlessEgl> for PanickingRenderer {
    fn on_surface_created(&mut self, _: &HeadlessGl, _: <HeadlessEgl as EglApi>::Config) {}
    fn on_surface_changed(&mut self, _: &HeadlessGl, _: Size2D<i32>) {}
    fn on_surface_destroyed(&mut self) {}
    fn on_draw_frame(&mut self, _: &HeadlessGl) {
        panic!("renderer exploded");
    }
}

fn wait_until<F>(mut condition: F) -> bool where F: FnMut() -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn new_view(egl: &HeadlessEgl, coordinator: &Arc<ThreadCoordinator<HeadlessEgl>>)
            -> (RenderSurfaceView<HeadlessEgl>, CallbackLog) {
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());
    let log = CallbackLog::default();
    view.set_renderer(RecordingRenderer { log: log.clone() }).unwrap();
    (view, log)
}

// Returns once the render thread has run an event queued now, so everything it was going to do
// in response to earlier state changes has been done.
fn sync_with_render_thread(view: &RenderSurfaceView<HeadlessEgl>) {
    let (sender, receiver) = mpsc::channel();
    view.queue_event(move || drop(sender.send(()))).unwrap();
    receiver.recv_timeout(TIMEOUT).unwrap();
}

fn chooser(red: i32, green: i32, blue: i32, alpha: i32, depth: i32, stencil: i32)
           -> ComponentSizeChooser {
    ComponentSizeChooser::new(ConfigRequest::new(ChannelSizes::new(red, green, blue, alpha, depth,
                                                                   stencil),
                                                 0))
}

fn initialized_display(egl: &HeadlessEgl) -> <HeadlessEgl as EglApi>::Display {
    let display = egl.get_display().unwrap();
    egl.initialize(display).unwrap();
    display
}

#[test]
fn test_chooser_matches_colors_exactly_and_depth_at_least() {
    const SIZES: [i32; 6] = [0, 4, 5, 6, 8, 16];
    const DEPTHS: [i32; 4] = [0, 16, 24, 32];

    let mut rng = StdRng::seed_from_u64(0x6c76);
    for _ in 0..200 {
        let config_count = rng.gen_range(1..10);
        let configs: Vec<_> = (0..config_count).map(|_| {
            let sizes = ChannelSizes::new(SIZES[rng.gen_range(0..SIZES.len())],
                                          SIZES[rng.gen_range(0..SIZES.len())],
                                          SIZES[rng.gen_range(0..SIZES.len())],
                                          SIZES[rng.gen_range(0..SIZES.len())],
                                          DEPTHS[rng.gen_range(0..DEPTHS.len())],
                                          SIZES[rng.gen_range(0..SIZES.len())]);
            HeadlessConfigDesc::new(sizes, RenderableType::OPENGL_ES2)
        }).collect();

        // Ask for something that exists about half the time.
        let wanted = if rng.gen_bool(0.5) {
            configs[rng.gen_range(0..configs.len())].sizes
        } else {
            ChannelSizes::new(8, 8, 8, 0, DEPTHS[rng.gen_range(0..DEPTHS.len())], 0)
        };
        let satisfies = |desc: &HeadlessConfigDesc| {
            desc.sizes.red == wanted.red &&
                desc.sizes.green == wanted.green &&
                desc.sizes.blue == wanted.blue &&
                desc.sizes.alpha == wanted.alpha &&
                desc.sizes.depth >= wanted.depth &&
                desc.sizes.stencil >= wanted.stencil
        };

        let egl = HeadlessEgl::with_configs(configs.clone());
        let display = initialized_display(&egl);
        let chooser = ComponentSizeChooser::new(ConfigRequest::new(wanted, 0));
        match chooser.choose_config(&egl, display) {
            Ok(config) => {
                let chosen = egl.config_desc(config).unwrap();
                assert!(satisfies(&chosen));
                // The first one in driver order.
                assert_eq!(Some(chosen), configs.iter().copied().find(|desc| satisfies(desc)));
            }
            Err(err) => {
                assert_eq!(err, Error::NoPixelFormatFound);
                assert!(!configs.iter().any(|desc| satisfies(desc)));
            }
        }
    }
}

#[test]
fn test_chooser_without_driver_matches_fails() {
    let egl = HeadlessEgl::with_configs(vec![
        HeadlessConfigDesc::new(ChannelSizes::new(5, 6, 5, 0, 16, 0), RenderableType::OPENGL_ES2),
    ]);
    let display = initialized_display(&egl);
    assert_eq!(chooser(8, 8, 8, 0, 16, 0).choose_config(&egl, display),
               Err(Error::NoPixelFormatFound));

    // The driver has candidates, but none survive the exact pass.
    let loose = chooser(8, 8, 8, 0, 16, 0).with_minimum(ChannelSizes::new(4, 4, 4, 0, 0, 0));
    assert_eq!(loose.choose_config(&egl, display), Err(Error::NoPixelFormatFound));
}

#[test]
fn test_chooser_depth_relaxation() {
    let egl = HeadlessEgl::with_configs(vec![HeadlessConfigDesc::rgb888(24, 0)]);
    let display = initialized_display(&egl);
    let strict = chooser(8, 8, 8, 0, 32, 0).with_minimum(ChannelSizes::new(4, 4, 4, 0, 0, 0));
    assert_eq!(strict.choose_config(&egl, display), Err(Error::NoPixelFormatFound));

    let relaxed = strict.relax_depth(true);
    let config = relaxed.choose_config(&egl, display).unwrap();
    assert_eq!(egl.get_config_attrib(display, config, attrib::DEPTH_SIZE), Some(24));
}

#[test]
fn test_config_spec_constrains_renderable_type() {
    let sizes = ChannelSizes::new(8, 8, 8, 0, 16, 0);
    let es2 = ComponentSizeChooser::new(ConfigRequest::new(sizes, 2)).config_spec();
    assert_eq!(&es2[12..], &[attrib::RENDERABLE_TYPE, RenderableType::OPENGL_ES2.bits(),
                             attrib::NONE]);
    let es3 = ComponentSizeChooser::new(ConfigRequest::new(sizes, 3)).config_spec();
    assert_eq!(es3[13], RenderableType::OPENGL_ES3.bits());
    let any = ComponentSizeChooser::new(ConfigRequest::new(sizes, 0)).config_spec();
    assert_eq!(any.len(), 13);
    assert_eq!(any.last(), Some(&attrib::NONE));

    // ES 2 contexts can't be created from configs that don't render ES 2.
    let egl = HeadlessEgl::with_configs(vec![
        HeadlessConfigDesc::new(sizes, RenderableType::OPENGL_ES),
    ]);
    let display = initialized_display(&egl);
    let chooser = ComponentSizeChooser::new(ConfigRequest::new(sizes, 2));
    assert_eq!(chooser.choose_config(&egl, display), Err(Error::NoPixelFormatFound));
}

#[test]
fn test_session_without_view() {
    let egl = Arc::new(HeadlessEgl::new());
    let mut session = Session::new(egl.clone(), Weak::new());
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(session.start(), Err(Error::ViewDropped));
    assert_eq!(session.state(), SessionState::DisplayInitialized);
    assert_eq!(session.swap(), Err(WindowingApiError::BadSurface));

    session.finish().unwrap();
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(!egl.is_initialized());
    // Idempotent.
    session.finish().unwrap();
    session.destroy_surface();
    assert_eq!(egl.stats().terminations, 1);
}

#[test]
fn test_session_walks_through_every_state() {
    let egl = Arc::new(HeadlessEgl::new());
    let view = Arc::new(ViewShared::new(Box::new(RecordingRenderer { log: CallbackLog::default() }),
                                        Box::new(ComponentSizeChooser::simple(true, 0)),
                                        Box::new(DefaultContextFactory::new(0)),
                                        Box::new(DefaultWindowSurfaceFactory),
                                        None));
    let mut session = Session::new(egl.clone(), Arc::downgrade(&view));

    egl.set_context_creation_error(Some(WindowingApiError::BadAlloc));
    assert_eq!(session.start(), Err(Error::ContextCreationFailed(WindowingApiError::BadAlloc)));
    assert_eq!(session.state(), SessionState::ConfigChosen);
    session.finish().unwrap();
    assert_eq!(session.state(), SessionState::Uninitialized);

    egl.set_context_creation_error(None);
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::ContextCreated);
    assert!(session.create_surface(egl.create_window()));
    assert_eq!(session.state(), SessionState::SurfaceCreated);
    session.destroy_surface();
    assert_eq!(session.state(), SessionState::ContextCreated);
    session.finish().unwrap();
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(egl.live_contexts(), 0);
    assert!(!egl.is_initialized());
}

#[test]
fn test_coordinator_with_limited_contexts() {
    let coordinator = ThreadCoordinator::<HeadlessEgl>::new();
    let first = coordinator.register_thread(ThreadState::new(RenderMode::Continuously));
    let second = coordinator.register_thread(ThreadState::new(RenderMode::Continuously));

    coordinator.check_gl_driver(&format!("{}Adreno", MSM7K_RENDERER_PREFIX));
    assert!(!coordinator.multiple_contexts_allowed());
    assert!(coordinator.should_release_when_pausing());
    assert!(coordinator.should_terminate_when_pausing());

    assert!(coordinator.try_acquire(first));
    assert!(coordinator.try_acquire(first));
    assert_eq!(coordinator.owner(), Some(first));

    assert!(!coordinator.try_acquire(second));
    assert!(coordinator.release_requested(first));
    assert!(!coordinator.release_requested(second));
    assert_eq!(coordinator.owner(), Some(first));

    // Releasing on behalf of a non-owner changes nothing.
    coordinator.release(second);
    assert_eq!(coordinator.owner(), Some(first));

    coordinator.release(first);
    assert!(coordinator.try_acquire(second));
    assert_eq!(coordinator.owner(), Some(second));

    // Only the first probe counts.
    coordinator.check_gl_driver("Some Other GPU");
    assert!(!coordinator.multiple_contexts_allowed());
}

#[test]
fn test_coordinator_with_multiple_contexts() {
    let coordinator = ThreadCoordinator::<HeadlessEgl>::new();
    let first = coordinator.register_thread(ThreadState::new(RenderMode::Continuously));
    let second = coordinator.register_thread(ThreadState::new(RenderMode::Continuously));
    coordinator.check_gl_driver("Some Other GPU");

    assert!(coordinator.try_acquire(first));
    assert!(coordinator.try_acquire(second));
    assert!(!coordinator.release_requested(first));
    assert!(!coordinator.should_release_when_pausing());
    assert!(!coordinator.should_terminate_when_pausing());

    // GLES 2 drivers are never probed into limited mode.
    let gles2 = ThreadCoordinator::<HeadlessEgl>::with_gles_version(crate::coordinator::GLES_20);
    gles2.check_gl_driver(&format!("{}Adreno", MSM7K_RENDERER_PREFIX));
    assert!(gles2.multiple_contexts_allowed());
}

#[test]
fn test_continuous_rendering_without_requests() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    assert_eq!(view.render_mode(), RenderMode::Continuously);

    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() >= 5));

    let callbacks = log.callbacks();
    assert_eq!(&callbacks[..3], &[
        Callback::SurfaceCreated,
        Callback::SurfaceChanged(480, 800),
        Callback::DrawFrame,
    ]);
    assert!(egl.stats().swaps >= 4);
}

#[test]
fn test_render_when_dirty() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    view.set_render_mode(RenderMode::WhenDirty);
    assert_eq!(view.render_mode(), RenderMode::WhenDirty);

    // The resize that comes with the surface draws one frame, then the thread blocks.
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() == 1));
    sync_with_render_thread(&view);
    sync_with_render_thread(&view);
    assert_eq!(log.frames(), 1);

    for frames in 2..5 {
        view.request_render();
        assert!(wait_until(|| log.frames() == frames));
        sync_with_render_thread(&view);
        assert_eq!(log.frames(), frames);
    }
}

#[test]
fn test_pause_resume_converges() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    let thread = view.render_thread().unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..40 {
        if rng.gen_bool(0.5) {
            view.on_pause();
            assert!(thread.is_paused());
            assert_eq!(egl.live_surfaces(), 0);
            assert_eq!(egl.live_contexts(), 0);
        } else {
            view.on_resume();
            assert!(!thread.is_paused());
        }
    }

    view.on_resume();
    let frames = log.frames();
    assert!(wait_until(|| log.frames() > frames));
    assert_eq!(egl.live_contexts(), 1);
    assert_eq!(egl.live_surfaces(), 1);
}

#[test]
fn test_pause_preserving_context() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (mut view, log) = new_view(&egl, &coordinator);
    view.set_preserve_context_on_pause(true);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));

    view.on_pause();
    assert_eq!(egl.live_contexts(), 1);
    assert_eq!(egl.live_surfaces(), 0);

    view.on_resume();
    let frames = log.frames();
    assert!(wait_until(|| log.frames() > frames));
    assert_eq!(egl.stats().contexts_created, 1);
    assert_eq!(log.count(Callback::SurfaceCreated), 1);
}

#[test]
fn test_surface_destroyed_then_created() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    let window = egl.create_window();
    view.surface_texture_available(window, 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    let thread = view.render_thread().unwrap();

    let before = egl.stats();
    assert!(view.surface_texture_destroyed());
    egl.destroy_window(window);
    let after_destroy = egl.stats();
    assert_eq!(after_destroy.surfaces_destroyed - before.surfaces_destroyed, 1);
    assert_eq!(egl.live_surfaces(), 0);
    assert_eq!(log.count(Callback::SurfaceDestroyed), 1);

    sync_with_render_thread(&view);
    let frames = log.frames();
    sync_with_render_thread(&view);
    assert_eq!(log.frames(), frames);

    log.clear();
    thread.surface_created(egl.create_window());
    assert!(wait_until(|| log.frames() > frames));
    let after_create = egl.stats();
    assert_eq!(after_create.surfaces_created - after_destroy.surfaces_created, 1);
    assert_eq!(after_create.surfaces_destroyed, after_destroy.surfaces_destroyed);
    assert_eq!(&log.callbacks()[..2], &[Callback::SurfaceChanged(480, 800), Callback::DrawFrame]);
    assert_eq!(egl.stats().contexts_created, 1);
}

#[test]
fn test_exit_and_reattach() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (mut view, log) = new_view(&egl, &coordinator);
    view.set_render_mode(RenderMode::WhenDirty);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));

    assert_eq!(view.on_detached_from_window(), Ok(()));
    assert!(view.render_thread().unwrap().has_exited());
    let frames = log.frames();
    assert_eq!(egl.live_surfaces(), 0);
    assert_eq!(egl.live_contexts(), 0);
    assert!(!egl.is_initialized());
    assert_eq!(log.callbacks().last(), Some(&Callback::SurfaceDestroyed));
    // Asking again is harmless.
    assert_eq!(view.render_thread().unwrap().request_exit_and_wait(), Ok(()));
    assert_eq!(log.frames(), frames);

    view.on_attached_to_window().unwrap();
    let thread = view.render_thread().unwrap();
    assert!(!thread.has_exited());
    assert_eq!(view.render_mode(), RenderMode::WhenDirty);

    log.clear();
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > frames));
    assert_eq!(log.callbacks()[0], Callback::SurfaceCreated);
    assert_eq!(egl.stats().contexts_created, 2);
}

#[test]
fn test_exit_from_render_thread_is_refused() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, _log) = new_view(&egl, &coordinator);
    let view = Arc::new(view);

    let (sender, receiver) = mpsc::channel();
    let weak_view = Arc::downgrade(&view);
    view.queue_event(move || {
        let result = weak_view.upgrade().map(|view| {
            let result = view.render_thread().unwrap().request_exit_and_wait();
            // A blocking setter called from here must not deadlock either.
            view.on_pause();
            result
        });
        drop(sender.send(result));
    }).unwrap();

    let result = receiver.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(result, Some(Err(Error::ExitRequestedFromRenderThread)));
    let thread = view.render_thread().unwrap();
    assert!(wait_until(|| thread.is_paused()));
    assert!(!thread.has_exited());
}

#[test]
fn test_context_loss_rebuilds_everything() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    assert_eq!(egl.stats().contexts_created, 1);

    egl.fail_next_swap(WindowingApiError::ContextLost);
    assert!(wait_until(|| egl.stats().contexts_created == 2));
    let frames = log.frames();
    assert!(wait_until(|| log.frames() > frames));

    assert_eq!(egl.live_contexts(), 1);
    assert_eq!(egl.live_surfaces(), 1);
    assert_eq!(log.count(Callback::SurfaceCreated), 2);
    assert_eq!(log.count(Callback::SurfaceDestroyed), 1);
    drop(view);
    assert_eq!(egl.live_contexts(), 0);
}

#[test]
fn test_bad_swap_stops_drawing_until_new_surface() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    let thread = view.render_thread().unwrap();

    egl.fail_next_swap(WindowingApiError::BadNativeWindow);
    assert!(wait_until(|| !thread.able_to_draw()));
    sync_with_render_thread(&view);
    let frames = log.frames();
    sync_with_render_thread(&view);
    assert_eq!(log.frames(), frames);
    assert_eq!(egl.stats().contexts_created, 1);

    view.surface_texture_destroyed();
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > frames));
}

#[test]
fn test_fatal_initialization_error_is_reported() {
    let egl = HeadlessEgl::new();
    egl.set_context_creation_error(Some(WindowingApiError::BadAlloc));
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (mut view, log) = new_view(&egl, &coordinator);
    view.surface_texture_available(egl.create_window(), 480, 800);

    let thread = view.render_thread().unwrap();
    assert!(wait_until(|| thread.has_exited()));
    assert_eq!(view.on_detached_from_window(),
               Err(Error::ContextCreationFailed(WindowingApiError::BadAlloc)));
    assert_eq!(log.frames(), 0);
    assert!(!egl.is_initialized());
    assert_eq!(coordinator.owner(), None);
}

#[test]
fn test_missing_pixel_format_is_reported() {
    let egl = HeadlessEgl::with_configs(vec![
        HeadlessConfigDesc::new(ChannelSizes::new(5, 6, 5, 0, 16, 0), RenderableType::OPENGL_ES),
    ]);
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (mut view, _log) = new_view(&egl, &coordinator);
    view.surface_texture_available(egl.create_window(), 480, 800);

    let thread = view.render_thread().unwrap();
    assert!(wait_until(|| thread.has_exited()));
    assert_eq!(view.on_detached_from_window(), Err(Error::NoPixelFormatFound));
}

#[test]
fn test_renderer_panic_is_reported() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());
    view.set_renderer(PanickingRenderer).unwrap();
    view.surface_texture_available(egl.create_window(), 480, 800);

    let thread = view.render_thread().unwrap();
    assert!(wait_until(|| thread.has_exited()));
    assert_eq!(view.on_detached_from_window(), Err(Error::RenderThreadPanicked));
    assert_eq!(egl.live_surfaces(), 0);
    assert_eq!(egl.live_contexts(), 0);
}

#[test]
fn test_limited_contexts_are_shared_between_views() {
    let egl = HeadlessEgl::new();
    egl.set_renderer(&format!("{}Adreno", MSM7K_RENDERER_PREFIX));
    let coordinator = Arc::new(ThreadCoordinator::new());

    let (first, first_log) = new_view(&egl, &coordinator);
    first.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| first_log.frames() > 0));
    assert!(!coordinator.multiple_contexts_allowed());

    let (second, second_log) = new_view(&egl, &coordinator);
    second.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| second_log.frames() > 0));
    let first_frames = first_log.frames();
    assert!(wait_until(|| first_log.frames() > first_frames));

    assert_eq!(egl.stats().max_live_contexts, 1);
    drop(first);
    drop(second);
    assert_eq!(egl.live_contexts(), 0);
}

#[test]
fn test_view_setup_errors() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());

    // Nothing to forward to yet.
    assert_eq!(view.queue_event(|| ()), Err(Error::NoRenderer));
    view.on_pause();
    view.on_resume();
    view.request_render();
    assert!(view.surface_texture_destroyed());
    assert_eq!(view.on_detached_from_window(), Ok(()));
    view.on_attached_to_window().unwrap();
    assert!(view.render_thread().is_none());

    view.set_context_client_version(2).unwrap();
    view.set_simple_config_chooser(false).unwrap();
    view.set_renderer(RecordingRenderer { log: CallbackLog::default() }).unwrap();

    let log = CallbackLog::default();
    assert_eq!(view.set_renderer(RecordingRenderer { log }), Err(Error::RendererAlreadySet));
    assert_eq!(view.set_context_client_version(3), Err(Error::RendererAlreadySet));
    assert_eq!(view.set_config_chooser_sizes(8, 8, 8, 8, 0, 0), Err(Error::RendererAlreadySet));
    assert_eq!(view.set_simple_config_chooser(true), Err(Error::RendererAlreadySet));
    assert_eq!(view.context_client_version(), 2);

    // These stay adjustable.
    view.set_preserve_context_on_pause(true);
    assert!(view.preserve_context_on_pause());
    view.set_debug_flags(DebugFlags::LOG_GL_CALLS);
    assert_eq!(view.debug_flags(), DebugFlags::LOG_GL_CALLS);
}

#[test]
fn test_check_gl_error_consumes_errors() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (mut view, log) = new_view(&egl, &coordinator);
    view.set_debug_flags(DebugFlags::CHECK_GL_ERROR);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));

    egl.set_gl_error(0x0502);
    assert!(wait_until(|| egl.pending_gl_error() == crate::gl::NO_ERROR));
}

struct CoordinatorQueryingRenderer {
    coordinator: Arc<ThreadCoordinator<HeadlessEgl>>,
    owners: Arc<Mutex<Vec<Option<RenderThreadId>>>>,
    log: CallbackLog,
}

impl Renderer<HeadlessEgl> for CoordinatorQueryingRenderer {
    fn on_surface_created(&mut self, _: &HeadlessGl, _: <HeadlessEgl as EglApi>::Config) {}
    fn on_surface_changed(&mut self, _: &HeadlessGl, _: Size2D<i32>) {}

    fn on_surface_destroyed(&mut self) {
        self.owners.lock().unwrap().push(self.coordinator.owner());
    }

    fn on_draw_frame(&mut self, _: &HeadlessGl) {
        self.log.frames.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_surface_destroyed_callback_may_use_coordinator() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let owners = Arc::new(Mutex::new(vec![]));
    let log = CallbackLog::default();
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());
    view.set_renderer(CoordinatorQueryingRenderer {
        coordinator: coordinator.clone(),
        owners: owners.clone(),
        log: log.clone(),
    }).unwrap();
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    let thread_id = view.render_thread().unwrap().id();

    // Pause from another thread so a hang fails the test instead of wedging it.
    let view = Arc::new(view);
    let pausing_view = view.clone();
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        pausing_view.on_pause();
        drop(sender.send(()));
    });
    receiver.recv_timeout(TIMEOUT).unwrap();

    // The context is still held while the renderer hears about the surface.
    assert_eq!(*owners.lock().unwrap(), vec![Some(thread_id)]);
    assert_eq!(egl.live_surfaces(), 0);
    assert_eq!(coordinator.owner(), None);
}

#[test]
fn test_surface_texture_updated_requests_frame() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let (view, log) = new_view(&egl, &coordinator);
    view.set_render_mode(RenderMode::WhenDirty);
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() == 1));
    sync_with_render_thread(&view);
    sync_with_render_thread(&view);
    assert_eq!(log.frames(), 1);

    view.surface_texture_updated();
    assert!(wait_until(|| log.frames() == 2));
    sync_with_render_thread(&view);
    sync_with_render_thread(&view);
    assert_eq!(log.frames(), 2);
}

struct CountingChooser {
    inner: ComponentSizeChooser,
    calls: Arc<AtomicUsize>,
}

impl ConfigChooser<HeadlessEgl> for CountingChooser {
    fn choose_config(&self, egl: &HeadlessEgl, display: <HeadlessEgl as EglApi>::Display)
                     -> Result<<HeadlessEgl as EglApi>::Config, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.choose_config(egl, display)
    }
}

#[test]
fn test_failed_spawn_keeps_view_configurable() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    view.set_config_chooser(CountingChooser {
        inner: ComponentSizeChooser::simple(true, 0),
        calls: calls.clone(),
    }).unwrap();

    let result = view.set_renderer_with(RecordingRenderer { log: CallbackLog::default() },
                                        |_| Err(Error::ThreadSpawnFailed));
    assert_eq!(result, Err(Error::ThreadSpawnFailed));
    assert!(view.render_thread().is_none());
    assert_eq!(view.queue_event(|| ()), Err(Error::NoRenderer));

    // The chooser set before the failure is still the one used.
    let log = CallbackLog::default();
    view.set_renderer(RecordingRenderer { log: log.clone() }).unwrap();
    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() > 0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

struct CountingWrapper {
    wraps: Arc<AtomicUsize>,
}

impl GlWrapper<HeadlessEgl> for CountingWrapper {
    fn wrap(&self, gl: HeadlessGl) -> HeadlessGl {
        self.wraps.fetch_add(1, Ordering::SeqCst);
        gl
    }
}

#[test]
fn test_gl_wrapper_wraps_each_new_binding() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let mut view = RenderSurfaceView::new(Arc::new(egl.clone()), coordinator.clone());
    let wraps = Arc::new(AtomicUsize::new(0));
    view.set_gl_wrapper(CountingWrapper { wraps: wraps.clone() }).unwrap();
    let log = CallbackLog::default();
    view.set_renderer(RecordingRenderer { log: log.clone() }).unwrap();
    assert_eq!(view.set_gl_wrapper(CountingWrapper { wraps: wraps.clone() }),
               Err(Error::RendererAlreadySet));

    view.surface_texture_available(egl.create_window(), 480, 800);
    assert!(wait_until(|| log.frames() >= 3));
    assert_eq!(wraps.load(Ordering::SeqCst), 1);

    // A new context means a new binding to wrap.
    view.on_pause();
    view.on_resume();
    let frames = log.frames();
    assert!(wait_until(|| log.frames() > frames));
    assert_eq!(wraps.load(Ordering::SeqCst), 2);
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum EngineCall {
    RenderCamera(Size2D<i32>, i32),
    UpdateProjection(Size2D<i32>, Size2D<i32>, i32),
}

#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
}

impl ArEngine for FakeEngine {
    fn render_camera(&self, viewport: Size2D<i32>, screen_angle: i32) {
        let mut calls = self.calls.lock().unwrap();
        let call = EngineCall::RenderCamera(viewport, screen_angle);
        if calls.last() != Some(&call) {
            calls.push(call);
        }
    }

    fn update_projection(&self, camera: Size2D<i32>, viewport: Size2D<i32>, geo_angle: i32) {
        self.calls.lock().unwrap().push(EngineCall::UpdateProjection(camera, viewport, geo_angle));
    }

    fn camera_size(&self) -> Size2D<i32> {
        Size2D::new(640, 480)
    }
}

#[test]
fn test_orientation_normalization() {
    let expected = [
        (Orientation::Landscape, [(0, 0), (0, 270), (180, 180), (180, 90)]),
        (Orientation::Portrait, [(90, 0), (270, 270), (270, 180), (90, 90)]),
    ];
    for (orientation, angles) in expected {
        for (index, &angle) in angles.iter().enumerate() {
            let rotation = Rotation::from_index(index as i32).unwrap();
            assert_eq!(ar::normalized_angles(orientation, rotation), angle);
        }
    }
    assert_eq!(Rotation::from_index(4), None);
}

#[test]
fn test_ar_view_paints_camera() {
    let egl = HeadlessEgl::new();
    let coordinator = Arc::new(ThreadCoordinator::new());
    let engine = Arc::new(FakeEngine::default());
    let view = ArView::new(Arc::new(egl.clone()), coordinator, engine.clone()).unwrap();
    assert_eq!(view.view().context_client_version(), ar::AR_CLIENT_VERSION);
    assert!(view.renderer().is_active());

    view.on_layout(false, 0, 0, 800, 480, Orientation::Landscape, Rotation::Rotation90);
    assert!(engine.calls.lock().unwrap().is_empty());
    view.on_layout(true, 0, 0, 800, 480, Orientation::Landscape, Rotation::Rotation90);
    assert_eq!(engine.calls.lock().unwrap()[0],
               EngineCall::UpdateProjection(Size2D::new(640, 480), Size2D::new(800, 480), 270));

    view.view().surface_texture_available(egl.create_window(), 800, 480);
    assert!(wait_until(|| egl.stats().finishes > 0));
    assert_eq!(egl.clear_color(), [1.0, 1.0, 1.0, 1.0]);
    assert!(egl.stats().clears > 0);
    assert!(engine.calls
                  .lock()
                  .unwrap()
                  .contains(&EngineCall::RenderCamera(Size2D::new(800, 480), 0)));
}

#[test]
fn test_ar_config_chooser() {
    let egl = HeadlessEgl::new();
    let display = initialized_display(&egl);
    let config = ar::ar_config_chooser().choose_config(&egl, display).unwrap();
    let chosen = egl.config_desc(config).unwrap();
    assert_eq!((chosen.sizes.red, chosen.sizes.green, chosen.sizes.blue, chosen.sizes.alpha),
               (8, 8, 8, 0));
    assert!(chosen.sizes.depth >= 16);
}
