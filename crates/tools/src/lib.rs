//! Developer tooling: frame inspector, frame timing, FPS counter.
//!
//! # Invariants
//! - Tools only read orchestrator state; they never advance frames.

mod inspector;
mod timer;

pub use inspector::{FrameInspector, FrameSummary};
pub use timer::{FpsCounter, FrameTimer};

pub fn crate_info() -> &'static str {
    "pingpong-tools v0.1.0"
}
