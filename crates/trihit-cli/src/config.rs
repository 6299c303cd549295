//! Run configuration: built-in presets, an optional TOML file, then CLI
//! flags, each layer overriding the previous one.
//!
//! ```toml
//! seed = 7
//!
//! [plot]
//! ray_count = 200
//!
//! [stress]
//! intersection_count = 500
//!
//! [dispatch]
//! backend = "gpu"
//! timeout_secs = 120
//!
//! [kernel]
//! workgroup_size = 64
//! epsilon = "fixed1e7"
//! reject_u_above_one = false
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use trihit::{EpsilonPolicy, KernelOptions, RunSettings, WORKGROUP_SIZE};
use trihit_compute::DispatchOptions;

/// Where the kernel runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// WGSL program on a GPU adapter.
    #[default]
    Gpu,
    /// Reference evaluator on the rayon pool.
    Cpu,
}

/// Partial run sizes; unset fields fall back to the preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOverrides {
    /// Number of rays.
    pub ray_count: Option<usize>,
    /// Number of triangles.
    pub triangle_count: Option<usize>,
    /// Repeats of the full intersection loop.
    pub intersection_count: Option<u32>,
}

impl RunOverrides {
    /// Apply the set fields on top of `base`.
    pub fn apply(&self, base: RunSettings) -> RunSettings {
        RunSettings {
            ray_count: self.ray_count.unwrap_or(base.ray_count),
            triangle_count: self.triangle_count.unwrap_or(base.triangle_count),
            intersection_count: self.intersection_count.unwrap_or(base.intersection_count),
        }
    }

    /// Fields set in `other` win.
    pub fn merge(self, other: RunOverrides) -> RunOverrides {
        RunOverrides {
            ray_count: other.ray_count.or(self.ray_count),
            triangle_count: other.triangle_count.or(self.triangle_count),
            intersection_count: other.intersection_count.or(self.intersection_count),
        }
    }
}

/// The `[dispatch]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Where the kernel runs.
    pub backend: BackendKind,
    /// Readback wait limit; unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

/// The `[kernel]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Work items per workgroup.
    pub workgroup_size: u32,
    /// Tolerance used by the rejection tests.
    pub epsilon: EpsilonPolicy,
    /// Also reject hits with `u > 1 + ε`.
    pub reject_u_above_one: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            workgroup_size: WORKGROUP_SIZE,
            epsilon: EpsilonPolicy::default(),
            reject_u_above_one: false,
        }
    }
}

/// Everything a run needs besides the subcommand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Scene RNG seed; unset draws one from the OS.
    pub seed: Option<u64>,
    /// Sizes for `trihit plot`.
    pub plot: RunOverrides,
    /// Sizes for `trihit stress`.
    pub stress: RunOverrides,
    /// Backend and readback settings.
    pub dispatch: DispatchConfig,
    /// Kernel source parameters.
    pub kernel: KernelConfig,
}

impl RunConfig {
    /// Read `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Settings for the `plot` run.
    pub fn plot_settings(&self) -> RunSettings {
        self.plot.apply(RunSettings::plot())
    }

    /// Settings for the `stress` run.
    pub fn stress_settings(&self) -> RunSettings {
        self.stress.apply(RunSettings::stress())
    }

    /// Kernel options for a run repeating the loop `intersection_count` times.
    pub fn kernel_options(&self, intersection_count: u32) -> KernelOptions {
        KernelOptions {
            intersection_count,
            workgroup_size: self.kernel.workgroup_size,
            epsilon: self.kernel.epsilon,
            reject_u_above_one: self.kernel.reject_u_above_one,
        }
    }

    /// Options for the GPU dispatcher.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            timeout: self.dispatch.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<()> {
        if self.kernel.workgroup_size == 0 {
            bail!("kernel.workgroup_size must be positive");
        }
        if self.dispatch.timeout_secs == Some(0) {
            bail!("dispatch.timeout_secs must be positive");
        }
        self.plot_settings()
            .validate()
            .context("invalid [plot] settings")?;
        self.stress_settings()
            .validate()
            .context("invalid [stress] settings")?;
        Ok(())
    }
}
