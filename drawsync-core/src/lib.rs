//! Synchronization core of a shared drawing board.
//!
//! Local pen input is previewed immediately and sent to an authoritative peer, which puts every
//! participant's commands into one global order. The echoed commands are applied to the shared
//! [`state::LayerStack`], replacing the matching previews.

pub mod blend;
pub mod color;
pub mod commands;
pub mod controller;
pub mod editor;
pub mod fill;
pub mod id;
pub mod preview;
pub mod raster;
pub mod render;
pub mod session;
pub mod state;
pub mod stroke;
pub mod tools;
pub mod util;

pub use controller::{Controller, ControllerConfig, ControllerError, Inbound, Notice, Outbound};
