//! Public facade crate for `websynth`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `websynth-core`.

pub use websynth_core::*;
