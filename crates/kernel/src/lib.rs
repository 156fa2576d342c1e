//! Orchestrator Kernel: alternates two slots of GPU state between a compute pass
//! and a render pass.
//!
//! # Invariants
//! - Parity flips exactly once per frame whose compute pass runs, never on paused frames.
//! - The two binding sets are built once at initialize and never rebuilt.
//! - A frame's render draw is recorded after its compute dispatch; submission
//!   order is the only synchronization.
//! - Every slot and binding set the orchestrator creates is released exactly once.

pub mod backend;
pub mod orchestrator;

pub use backend::{Backend, BackendError};
pub use orchestrator::{
    FrameEvent, FrameState, FrameStats, Orchestrator, OrchestratorError, ReleaseReport,
};

pub fn crate_info() -> &'static str {
    "pingpong-kernel v0.1.0"
}
