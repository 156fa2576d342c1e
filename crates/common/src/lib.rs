//! Shared value types for the pingpong workspace.
//!
//! # Invariants
//! - A `SlotId` is always 0 or 1.
//! - A `SlotLayout` never describes an empty or overflowing buffer.
//! - A `WorkgroupSize` is never zero.

pub mod config;
pub mod types;

pub use config::{ConfigError, DemoConfig, ImageConfig, NBodyConfig};
pub use types::{ImageFilter, LayoutError, Parity, SlotId, SlotLayout, WorkgroupSize, dispatch_groups};

pub fn crate_info() -> &'static str {
    "pingpong-common v0.1.0"
}
