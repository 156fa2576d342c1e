//! CPU reference backend: executes the orchestrator's commands on plain byte
//! buffers so slot alternation can be observed without a GPU.
//!
//! # Invariants
//! - Commands recorded into one encoder execute strictly in recording order.
//! - Every slot buffer is followed by a canary guard zone one workgroup long.
//! - A draw snapshots the slot contents at the moment it executes.

mod backend;
mod buffer;
pub mod kernels;

pub use backend::{
    AllocationCounters, Command, DrawRecord, SoftwareBackend, SoftwareBindingSet, SoftwareEncoder,
    SoftwareError, SoftwareSlot,
};
pub use buffer::{CANARY, GuardedBuffer};
pub use kernels::{Invocation, Kernel};

pub fn crate_info() -> &'static str {
    "pingpong-software v0.1.0"
}
