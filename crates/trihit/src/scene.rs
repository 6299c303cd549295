//! Random scene generation.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrihitError};
use crate::geometry::{Ray, Triangle, Vec3};

/// Half-extent of the cube positions and vertices are drawn from.
pub const SCENE_EXTENT: f32 = 100.0;

/// Sizes of one generated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Number of rays.
    pub ray_count: usize,
    /// Number of triangles.
    pub triangle_count: usize,
    /// Repeats of the full intersection loop.
    pub intersection_count: u32,
}

impl RunSettings {
    /// A scene small enough to draw: 1000 rays, 50 triangles, one pass.
    pub const fn plot() -> Self {
        Self {
            ray_count: 1000,
            triangle_count: 50,
            intersection_count: 1,
        }
    }

    /// A throughput workload: 20000 rays, 3000 triangles, 20000 passes.
    pub const fn stress() -> Self {
        Self {
            ray_count: 20_000,
            triangle_count: 3000,
            intersection_count: 20_000,
        }
    }

    /// Reject settings that cannot be dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.ray_count == 0 {
            return Err(TrihitError::InvalidSettings(
                "ray_count must be positive".into(),
            ));
        }
        if self.intersection_count == 0 {
            return Err(TrihitError::InvalidSettings(
                "intersection_count must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Rays and triangles for one run.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Rays, one work item each.
    pub rays: Vec<Ray>,
    /// Triangles tested against every ray.
    pub triangles: Vec<Triangle>,
}

impl Scene {
    /// Generate a fresh random scene sized by `settings`.
    pub fn generate<R: Rng + ?Sized>(settings: &RunSettings, rng: &mut R) -> Self {
        let rays = generate_rays(rng, settings.ray_count);
        let triangles = generate_triangles(rng, settings.triangle_count);
        log::debug!(
            "generated scene: {} rays, {} triangles",
            rays.len(),
            triangles.len()
        );
        Self { rays, triangles }
    }
}

/// An RNG seeded from `seed`, or from the OS when none is given.
pub fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    }
}

fn random_point<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    Vec3::new(
        rng.random_range(-SCENE_EXTENT..=SCENE_EXTENT),
        rng.random_range(-SCENE_EXTENT..=SCENE_EXTENT),
        rng.random_range(-SCENE_EXTENT..=SCENE_EXTENT),
    )
}

/// Uniformly distributed unit vector.
///
/// Rejection-samples the cube `[-1, 1]³` until the point lies in the unit
/// ball, then normalizes. The origin is rejected too.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let norm_squared = p.norm_squared();
        if norm_squared <= 1.0 && norm_squared > 0.0 {
            return p / norm_squared.sqrt();
        }
    }
}

/// `count` rays with positions in `[-100, 100]³` and uniform unit directions.
pub fn generate_rays<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Ray> {
    (0..count)
        .map(|_| {
            let position = random_point(rng);
            Ray::from_unit(position, random_unit_vector(rng))
        })
        .collect()
}

/// `count` triangles with vertices in `[-100, 100]³`. May be degenerate.
pub fn generate_triangles<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Triangle> {
    (0..count)
        .map(|_| Triangle::new(random_point(rng), random_point(rng), random_point(rng)))
        .collect()
}
