// glview/src/platform/mod.rs
//
//! Drivers implementing `EglApi`.

pub mod headless;

#[cfg(egl_backend)]
pub mod egl;
