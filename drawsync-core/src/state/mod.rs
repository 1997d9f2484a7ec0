//! # State
//!
//! The authoritative document state. Only the [`BoardEditor`](crate::editor::BoardEditor) mutates it.

pub mod layers;

pub use layers::{Layer, LayerSource, LayerStack, Snapshot, StackError, StackEvent};
