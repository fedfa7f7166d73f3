//! Shared engine core for the native and WASM viewers.
//!
//! The same frame loop drives both builds: the native viewer runs it without
//! an immersive session, the web viewer layers WebXR hit-testing on top.
//! Platform-specific pieces (surface presentation, XR session plumbing) are
//! abstracted via traits so the core compiles to both targets.

#![cfg_attr(target_arch = "wasm32", allow(clippy::unused_unit))]

pub mod app;
pub mod camera;
pub mod geometry;
pub mod hittest;
pub mod loader;
pub mod scene;
pub mod xr;

#[cfg(not(target_arch = "wasm32"))]
pub mod renderer;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

// Re-export core types
pub use app::*;
pub use camera::*;
pub use hittest::*;
pub use scene::*;
pub use xr::*;
