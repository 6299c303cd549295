//! Backends that run the intersection kernel.
//!
//! [`GpuBackend`] dispatches the WGSL program through the compute
//! orchestrator. [`CpuBackend`] runs the host reference evaluator on the
//! rayon pool, so everything above this layer can be exercised without a
//! GPU.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use trihit_compute::{DispatchOptions, GpuContext, KernelDispatcher, NamedBuffer};

use crate::codec::{encode_rays, encode_triangles, initial_results};
use crate::error::{Result, TrihitError};
use crate::geometry::{Ray, Triangle};
use crate::kernel::KernelOptions;
use crate::reference;

/// Encoded buffers for one intersection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntersectionBuffers {
    /// Rays, 6 floats each.
    pub rays: Vec<f32>,
    /// Triangles, 9 floats each.
    pub triangles: Vec<f32>,
    /// One distance per ray, `+∞` initially.
    pub distances: Vec<f32>,
}

impl IntersectionBuffers {
    /// Encode a scene, with every distance starting at `+∞`.
    pub fn encode(rays: &[Ray], triangles: &[Triangle]) -> Self {
        Self {
            rays: encode_rays(rays),
            triangles: encode_triangles(triangles),
            distances: initial_results(rays.len()),
        }
    }
}

/// Something that can run the intersection kernel over encoded buffers.
pub trait IntersectionBackend {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Whether the backend has a device to run on.
    fn is_available(&self) -> bool {
        true
    }

    /// Run the kernel and return the final distances.
    ///
    /// `Ok(None)` means the backend has no device to run on.
    fn dispatch(
        &mut self,
        buffers: IntersectionBuffers,
        options: &KernelOptions,
    ) -> Result<Option<Vec<f32>>>;
}

/// Nearest-hit distance for every ray, in ray order.
///
/// `Ok(None)` if the backend is unavailable, whatever the inputs. Otherwise
/// an empty ray list yields an empty result and an empty triangle list
/// yields all `+∞`, without dispatching.
pub fn intersect<B: IntersectionBackend + ?Sized>(
    backend: &mut B,
    rays: &[Ray],
    triangles: &[Triangle],
    options: &KernelOptions,
) -> Result<Option<Vec<f32>>> {
    if !backend.is_available() {
        return Ok(None);
    }
    if rays.is_empty() {
        return Ok(Some(Vec::new()));
    }
    if triangles.is_empty() {
        debug!("No triangles: all {} rays miss", rays.len());
        return Ok(Some(initial_results(rays.len())));
    }
    backend.dispatch(IntersectionBuffers::encode(rays, triangles), options)
}

/// Runs the kernel on a GPU through [`KernelDispatcher`].
pub struct GpuBackend {
    dispatcher: Option<KernelDispatcher>,
}

impl GpuBackend {
    /// Probe for an adapter. With none available the backend still exists,
    /// but every dispatch returns `Ok(None)`.
    pub fn new(options: DispatchOptions) -> Result<Self> {
        let dispatcher = GpuContext::probe_blocking()?
            .map(|ctx| KernelDispatcher::new(ctx).with_options(options));
        if dispatcher.is_none() {
            warn!("No compute-capable GPU adapter; GPU runs will be skipped");
        }
        Ok(Self { dispatcher })
    }

    /// Wrap an existing dispatcher.
    pub fn from_dispatcher(dispatcher: KernelDispatcher) -> Self {
        Self {
            dispatcher: Some(dispatcher),
        }
    }

    /// The device context, if any.
    pub fn context(&self) -> Option<&GpuContext> {
        self.dispatcher.as_ref().map(KernelDispatcher::context)
    }
}

impl IntersectionBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn is_available(&self) -> bool {
        self.dispatcher.is_some()
    }

    fn dispatch(
        &mut self,
        buffers: IntersectionBuffers,
        options: &KernelOptions,
    ) -> Result<Option<Vec<f32>>> {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return Ok(None);
        };

        let ray_count = u32::try_from(buffers.distances.len()).map_err(|_| {
            TrihitError::InvalidSettings(format!(
                "{} rays exceed the dispatchable work item count",
                buffers.distances.len()
            ))
        })?;

        let program = options.program();
        let named = [
            NamedBuffer::input("rays", buffers.rays),
            NamedBuffer::input("triangles", buffers.triangles),
            NamedBuffer::output("distances", buffers.distances),
        ];
        let outputs = dispatcher.run(&program, &named, ray_count, options.workgroup_size)?;
        Ok(outputs.into_iter().next())
    }
}

/// Runs the host reference evaluator on rayon's thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Create a CPU backend.
    pub fn new() -> Self {
        Self
    }
}

impl IntersectionBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn dispatch(
        &mut self,
        mut buffers: IntersectionBuffers,
        options: &KernelOptions,
    ) -> Result<Option<Vec<f32>>> {
        let start = Instant::now();
        reference::evaluate(
            &buffers.rays,
            &buffers.triangles,
            &mut buffers.distances,
            options,
        )?;
        info!(
            "CPU evaluation of {} rays took {:?}",
            buffers.distances.len(),
            start.elapsed()
        );
        Ok(Some(buffers.distances))
    }
}

/// Number of rays that hit something.
pub fn hit_count(distances: &[f32]) -> usize {
    distances.iter().filter(|d| d.is_finite()).count()
}

/// Aggregate view of a result buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSummary {
    /// Rays dispatched.
    pub rays: usize,
    /// Rays with a finite distance.
    pub hits: usize,
    /// Smallest finite distance.
    pub nearest: Option<f32>,
    /// Largest finite distance.
    pub farthest: Option<f32>,
}

impl HitSummary {
    /// Summarize a result buffer.
    pub fn from_distances(distances: &[f32]) -> Self {
        let finite = || distances.iter().copied().filter(|d| d.is_finite());
        Self {
            rays: distances.len(),
            hits: hit_count(distances),
            nearest: finite().reduce(f32::min),
            farthest: finite().reduce(f32::max),
        }
    }
}

impl fmt::Display for HitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} rays hit", self.hits, self.rays)?;
        if let (Some(nearest), Some(farthest)) = (self.nearest, self.farthest) {
            write!(f, ", nearest {nearest:.3}, farthest {farthest:.3}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl IntersectionBackend for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn is_available(&self) -> bool {
            false
        }

        fn dispatch(
            &mut self,
            _buffers: IntersectionBuffers,
            _options: &KernelOptions,
        ) -> Result<Option<Vec<f32>>> {
            Ok(None)
        }
    }

    fn down_ray(x: f32) -> Ray {
        Ray::new([x, 0.0, 1.0], [0.0, 0.0, -1.0])
    }

    fn unit_triangle() -> Triangle {
        Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 0.0])
    }

    #[test]
    fn test_cpu_backend_intersects() {
        let mut backend = CpuBackend::new();
        let distances = intersect(
            &mut backend,
            &[down_ray(0.0), down_ray(2.0)],
            &[unit_triangle()],
            &KernelOptions::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(distances, vec![1.0, f32::INFINITY]);
    }

    #[test]
    fn test_empty_inputs_skip_dispatch() {
        let mut backend = CpuBackend::new();
        let options = KernelOptions::default();

        let none = intersect(&mut backend, &[], &[unit_triangle()], &options).unwrap();
        assert_eq!(none, Some(vec![]));

        let misses = intersect(&mut backend, &[down_ray(0.0)], &[], &options).unwrap();
        assert_eq!(misses, Some(vec![f32::INFINITY]));
    }

    #[test]
    fn test_unavailable_backend_never_answers() {
        let mut backend = Unavailable;
        let options = KernelOptions::default();

        let no_rays = intersect(&mut backend, &[], &[unit_triangle()], &options).unwrap();
        assert_eq!(no_rays, None);

        let no_triangles = intersect(&mut backend, &[down_ray(0.0)], &[], &options).unwrap();
        assert_eq!(no_triangles, None);

        let skipped =
            intersect(&mut backend, &[down_ray(0.0)], &[unit_triangle()], &options).unwrap();
        assert_eq!(skipped, None);
    }

    #[test]
    fn test_gpu_backend_without_device_is_unavailable() {
        let mut gpu = GpuBackend { dispatcher: None };
        assert!(!gpu.is_available());
        assert!(gpu.context().is_none());
        let distances =
            intersect(&mut gpu, &[down_ray(0.0)], &[], &KernelOptions::default()).unwrap();
        assert_eq!(distances, None);
    }

    #[test]
    fn test_buffers_encode() {
        let buffers = IntersectionBuffers::encode(&[down_ray(0.0)], &[unit_triangle()]);
        assert_eq!(buffers.rays.len(), 6);
        assert_eq!(buffers.triangles.len(), 9);
        assert_eq!(buffers.distances, vec![f32::INFINITY]);
    }

    #[test]
    fn test_cpu_backend_rejects_partial_records() {
        let buffers = IntersectionBuffers {
            rays: vec![0.0; 5],
            triangles: vec![0.0; 9],
            distances: vec![f32::INFINITY],
        };
        let err = CpuBackend
            .dispatch(buffers, &KernelOptions::default())
            .unwrap_err();
        assert!(matches!(err, TrihitError::Codec(_)));
    }

    #[test]
    fn test_hit_summary() {
        let summary = HitSummary::from_distances(&[3.0, f32::INFINITY, 1.5, 7.25]);
        assert_eq!(summary.rays, 4);
        assert_eq!(summary.hits, 3);
        assert_eq!(summary.nearest, Some(1.5));
        assert_eq!(summary.farthest, Some(7.25));
        assert_eq!(
            summary.to_string(),
            "3/4 rays hit, nearest 1.500, farthest 7.250"
        );
    }

    #[test]
    fn test_hit_summary_no_hits() {
        let summary = HitSummary::from_distances(&[f32::INFINITY; 2]);
        assert_eq!(summary.hits, 0);
        assert_eq!(summary.nearest, None);
        assert_eq!(summary.to_string(), "0/2 rays hit");
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_matches_cpu() {
        let mut gpu = GpuBackend::new(DispatchOptions::default()).unwrap();
        assert!(gpu.is_available());
        let mut rng = crate::scene::seeded_rng(Some(3));
        let scene = crate::Scene::generate(
            &crate::RunSettings {
                ray_count: 200,
                triangle_count: 40,
                intersection_count: 1,
            },
            &mut rng,
        );
        let options = KernelOptions::default();
        let on_gpu = intersect(&mut gpu, &scene.rays, &scene.triangles, &options)
            .unwrap()
            .unwrap();
        let on_cpu = intersect(&mut CpuBackend, &scene.rays, &scene.triangles, &options)
            .unwrap()
            .unwrap();
        assert_eq!(on_gpu.len(), on_cpu.len());
        for (g, c) in on_gpu.iter().zip(&on_cpu) {
            assert!(crate::harness::distances_match(*g, *c), "{g} vs {c}");
        }
    }
}
