#![warn(missing_docs)]

//! Brute-force nearest-hit ray/triangle intersection on a data-parallel
//! accelerator.
//!
//! Every ray is tested against every triangle (Möller–Trumbore), optionally
//! many times over to stress throughput. The nearest positive distance per
//! ray is reported, or `+∞` when nothing is hit.
//!
//! # Architecture
//!
//! - [`Ray`], [`Triangle`] - Scene records
//! - [`codec`] - Flat `f32` wire layout shared with the kernel
//! - [`kernel`] - The WGSL kernel program and its options
//! - [`reference`] - Host evaluation of the same kernel arithmetic
//! - [`backend`] - GPU and CPU backends behind [`IntersectionBackend`]
//! - [`scene`] - Random scene generation
//! - [`harness`] - Fixture-driven validation of a backend
//! - [`plot`] - Plotly figure output
//!
//! # Example
//!
//! ```
//! use trihit::{intersect, CpuBackend, KernelOptions, Ray, Triangle};
//!
//! let rays = [Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0])];
//! let triangles = [Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 0.0])];
//!
//! let mut backend = CpuBackend::new();
//! let distances = intersect(&mut backend, &rays, &triangles, &KernelOptions::default())?;
//! assert_eq!(distances, Some(vec![1.0]));
//! # Ok::<(), trihit::TrihitError>(())
//! ```

mod error;
mod geometry;
pub mod backend;
pub mod codec;
pub mod fixtures;
pub mod harness;
pub mod kernel;
pub mod plot;
pub mod reference;
pub mod scene;

pub use backend::{
    hit_count, intersect, CpuBackend, GpuBackend, HitSummary, IntersectionBackend,
    IntersectionBuffers,
};
pub use error::{CodecError, Result, TrihitError};
pub use fixtures::{fixtures, TestCase};
pub use geometry::{Ray, Triangle, Vec3};
pub use harness::{run_test_cases, CaseOutcome, CaseStatus, HarnessReport, TEST_TOLERANCE};
pub use kernel::{EpsilonPolicy, KernelOptions, WORKGROUP_SIZE};
pub use scene::{seeded_rng, RunSettings, Scene};
