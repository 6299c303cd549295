//! GPU compute plumbing for trihit.
//!
//! This crate owns everything that talks to the accelerator:
//! - Device acquisition and device-loss notification ([`GpuContext`])
//! - Generic dispatch of a WGSL kernel over flat `f32` storage buffers
//!   ([`KernelDispatcher`], [`run_kernel`])

#![warn(missing_docs)]

mod context;
mod dispatch;

pub use context::{DeviceEvent, GpuContext, GpuError, LossReason};
pub use dispatch::{
    run_kernel, workgroup_count, DispatchOptions, KernelDispatcher, KernelProgram, NamedBuffer,
    FLOAT32_SIZE,
};
