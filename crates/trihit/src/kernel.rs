//! The intersection kernel program and the options it is rendered with.
//!
//! The WGSL text is a data asset with placeholders for the repeat count,
//! workgroup size, epsilon, and rejection variant. Ray and triangle counts
//! are never baked in; the kernel reads them from the bound buffers.

use serde::{Deserialize, Serialize};
use trihit_compute::KernelProgram;

/// WGSL template for the intersection kernel.
pub const RAY_INTERSECTION_SHADER: &str = include_str!("shaders/ray_intersection.wgsl");

/// Default workgroup size; 64 suits most GPUs.
pub const WORKGROUP_SIZE: u32 = 64;

/// The epsilon used by the kernel's acceptance tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EpsilonPolicy {
    /// `1e-7`: rejects near-parallel rays and grazing edge hits a little
    /// more eagerly, absorbing rounding noise.
    #[default]
    Fixed1e7,
    /// Smallest positive normal `f32` (`≈1.18e-38`): accepts almost every
    /// candidate, including ones decided by rounding noise.
    SmallestNormal,
}

impl EpsilonPolicy {
    /// The epsilon value.
    pub fn value(self) -> f32 {
        match self {
            EpsilonPolicy::Fixed1e7 => 1e-7,
            EpsilonPolicy::SmallestNormal => f32::MIN_POSITIVE,
        }
    }
}

/// Parameters the kernel program is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    /// How many times the full ray-vs-all-triangles loop is repeated.
    pub intersection_count: u32,
    /// Work items per workgroup.
    pub workgroup_size: u32,
    /// Epsilon for the acceptance tests.
    pub epsilon: EpsilonPolicy,
    /// Also reject candidates with `u > 1 + ε`.
    pub reject_u_above_one: bool,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            intersection_count: 1,
            workgroup_size: WORKGROUP_SIZE,
            epsilon: EpsilonPolicy::default(),
            reject_u_above_one: false,
        }
    }
}

impl KernelOptions {
    /// Options with a different repeat count.
    pub fn with_intersection_count(self, intersection_count: u32) -> Self {
        Self {
            intersection_count,
            ..self
        }
    }

    /// Render the WGSL program text.
    pub fn source(&self) -> String {
        RAY_INTERSECTION_SHADER
            .replace(
                "{{INTERSECTION_COUNT}}",
                &self.intersection_count.to_string(),
            )
            .replace("{{WORKGROUP_SIZE}}", &self.workgroup_size.to_string())
            .replace("{{EPSILON}}", &wgsl_f32(self.epsilon.value()))
            .replace(
                "{{REJECT_U_ABOVE_ONE}}",
                if self.reject_u_above_one { "true" } else { "false" },
            )
    }

    /// The rendered program, ready for dispatch.
    pub fn program(&self) -> KernelProgram {
        KernelProgram::wgsl(
            format!("ray intersections x{}", self.intersection_count),
            self.source(),
        )
    }
}

/// Format an `f32` as a WGSL `f32` literal that parses back to the same value.
fn wgsl_f32(value: f32) -> String {
    format!("{value:e}f")
}
