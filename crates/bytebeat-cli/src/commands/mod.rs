//! CLI command implementations.

pub mod check;
pub mod common;
pub mod play;
pub mod render;
pub mod wav;
