//! Host evaluation of the intersection kernel.
//!
//! Same arithmetic, same order, same single-precision floats as the WGSL
//! program, one work item per ray. Used by the CPU backend and to pin the
//! kernel semantics down in tests.

use rayon::prelude::*;

use crate::codec::{self, GpuRay, GpuTriangle};
use crate::error::CodecError;
use crate::geometry::Vec3;
use crate::kernel::KernelOptions;

/// Möller–Trumbore test of one ray against one triangle.
///
/// Returns the candidate distance `t` if the triangle passes the rejection
/// tests and `t > ε`. Whether it is nearer than the current hit is up to the
/// caller.
#[inline]
pub fn candidate_distance(
    ray: &GpuRay,
    triangle: &GpuTriangle,
    options: &KernelOptions,
) -> Option<f32> {
    let eps = options.epsilon.value();
    let eps1 = 1.0 + eps;

    let origin = Vec3::from(ray.position);
    let direction = Vec3::from(ray.direction);
    let edge1 = Vec3::from(triangle.edge1);
    let edge2 = Vec3::from(triangle.edge2);

    let ray_cross_e2 = direction.cross(&edge2);
    let det = edge1.dot(&ray_cross_e2);

    let inv_det = 1.0 / det;
    let offset = origin - Vec3::from(triangle.origin);
    let u = inv_det * offset.dot(&ray_cross_e2);

    let offset_cross_e1 = offset.cross(&edge1);
    let v = inv_det * direction.dot(&offset_cross_e1);

    let t = inv_det * edge2.dot(&offset_cross_e1);

    let missed = (det.abs() < eps)
        | (u < -eps)
        | (v < -eps)
        | (u + v > eps1)
        | (options.reject_u_above_one & (u > eps1));

    (!missed && t > eps).then_some(t)
}

/// Run the kernel body for one ray, starting from `current`.
///
/// Triangles are visited in ascending order and only a strictly nearer
/// candidate replaces the stored distance, so exact ties keep the first
/// triangle.
pub fn nearest_hit(
    ray: &GpuRay,
    triangles: &[GpuTriangle],
    options: &KernelOptions,
    current: f32,
) -> f32 {
    let mut nearest = current;
    for _ in 0..options.intersection_count {
        for triangle in triangles {
            if let Some(t) = candidate_distance(ray, triangle, options) {
                if t < nearest {
                    nearest = t;
                }
            }
        }
    }
    nearest
}

/// Evaluate the kernel over encoded buffers, writing into `distances`.
///
/// Work item `i` updates `distances[i]`; slots past the last ray are left
/// alone, like grid padding on the device.
pub fn evaluate(
    rays: &[f32],
    triangles: &[f32],
    distances: &mut [f32],
    options: &KernelOptions,
) -> Result<(), CodecError> {
    let rays = codec::ray_records(rays)?;
    let triangles = codec::triangle_records(triangles)?;

    distances
        .par_iter_mut()
        .enumerate()
        .for_each(|(index, distance)| {
            if let Some(ray) = rays.get(index) {
                *distance = nearest_hit(ray, triangles, options, *distance);
            }
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_rays, encode_triangles, initial_results};
    use crate::geometry::{Ray, Triangle};
    use crate::kernel::EpsilonPolicy;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn unit_triangle() -> Triangle {
        Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 0.0])
    }

    fn run(rays: &[Ray], triangles: &[Triangle], options: &KernelOptions) -> Vec<f32> {
        let mut distances = initial_results(rays.len());
        evaluate(
            &encode_rays(rays),
            &encode_triangles(triangles),
            &mut distances,
            options,
        )
        .unwrap();
        distances
    }

    #[test]
    fn test_downward_hit() {
        let rays = [Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0])];
        let d = run(&rays, &[unit_triangle()], &KernelOptions::default());
        assert_relative_eq!(d[0], 1.0);
    }

    #[test]
    fn test_facing_away_misses() {
        let rays = [Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, 1.0])];
        let d = run(&rays, &[unit_triangle()], &KernelOptions::default());
        assert_eq!(d[0], f32::INFINITY);
    }

    #[test]
    fn test_parallel_ray_misses() {
        let rays = [Ray::new([-2.0, 0.0, 0.0], [1.0, 0.0, 0.0])];
        let d = run(&rays, &[unit_triangle()], &KernelOptions::default());
        assert_eq!(d[0], f32::INFINITY);
    }

    #[test]
    fn test_degenerate_triangle_never_hits() {
        let degenerate = Triangle::new([0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 2.0, 0.0]);
        let rays = [Ray::new([1.0, 1.0, 5.0], [0.0, 0.0, -1.0])];
        for epsilon in [EpsilonPolicy::Fixed1e7, EpsilonPolicy::SmallestNormal] {
            let options = KernelOptions {
                epsilon,
                ..Default::default()
            };
            assert_eq!(run(&rays, &[degenerate], &options)[0], f32::INFINITY);
        }
    }

    #[test]
    fn test_nearest_of_stacked_triangles() {
        let triangles: Vec<Triangle> = [5.0, 2.0, 7.0]
            .iter()
            .map(|z| Triangle::new([-1.0, -1.0, *z], [-1.0, 1.0, *z], [1.0, 0.0, *z]))
            .collect();
        let rays = [Ray::new([0.0, 0.0, 10.0], [0.0, 0.0, -1.0])];
        let d = run(&rays, &triangles, &KernelOptions::default());
        assert_relative_eq!(d[0], 3.0);
    }

    #[test]
    fn test_origin_on_triangle_is_not_a_hit() {
        // t = 0 fails t > ε.
        let rays = [Ray::new([0.0, 0.0, 0.0], [0.0, 0.0, -1.0])];
        let d = run(&rays, &[unit_triangle()], &KernelOptions::default());
        assert_eq!(d[0], f32::INFINITY);
    }

    #[test]
    fn test_existing_nearer_distance_is_kept() {
        let ray = GpuRay::from(&Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0]));
        let tri = GpuTriangle::from(&unit_triangle());
        let d = nearest_hit(&ray, &[tri], &KernelOptions::default(), 0.5);
        assert_eq!(d, 0.5);
    }

    #[test]
    fn test_padding_slots_untouched() {
        let rays = encode_rays(&[Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0])]);
        let tris = encode_triangles(&[unit_triangle()]);
        let mut distances = vec![f32::INFINITY, -42.0];
        evaluate(&rays, &tris, &mut distances, &KernelOptions::default()).unwrap();
        assert_relative_eq!(distances[0], 1.0);
        assert_eq!(distances[1], -42.0);
    }

    #[test]
    fn test_u_above_one_variant_agrees_away_from_boundary() {
        // u > 1 + ε with v >= -ε already fails u + v <= 1 + ε, so the extra
        // test only matters within rounding of the boundary.
        let tri = GpuTriangle::from(&unit_triangle());
        let strict = KernelOptions {
            reject_u_above_one: true,
            ..Default::default()
        };
        let lenient = KernelOptions::default();
        for start in [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [5.0, 5.0, 1.0], [-1.0, 3.0, 1.0]] {
            let ray = GpuRay::from(&Ray::new(start, [0.0, 0.0, -1.0]));
            assert_eq!(
                candidate_distance(&ray, &tri, &strict),
                candidate_distance(&ray, &tri, &lenient),
                "start {start:?}"
            );
        }
    }

    #[test]
    fn test_invalid_buffers() {
        let mut distances = initial_results(1);
        assert!(evaluate(&[0.0; 5], &[], &mut distances, &KernelOptions::default()).is_err());
        assert!(evaluate(&[0.0; 6], &[0.0; 8], &mut distances, &KernelOptions::default()).is_err());
    }

    fn coord() -> impl Strategy<Value = f32> {
        -100.0f32..100.0
    }

    fn arb_ray() -> impl Strategy<Value = Ray> {
        ([coord(), coord(), coord()], [coord(), coord(), coord()])
            .prop_filter("direction must be non-zero", |(_, d)| {
                Vec3::from(*d).norm() > 1e-3
            })
            .prop_map(|(p, d)| Ray::new(p, d))
    }

    fn arb_triangle() -> impl Strategy<Value = Triangle> {
        [
            [coord(), coord(), coord()],
            [coord(), coord(), coord()],
            [coord(), coord(), coord()],
        ]
        .prop_map(|[a, b, c]| Triangle::new(a, b, c))
    }

    proptest! {
        #[test]
        fn test_repetition_is_idempotent(
            rays in prop::collection::vec(arb_ray(), 1..8),
            triangles in prop::collection::vec(arb_triangle(), 0..12),
        ) {
            let once = run(&rays, &triangles, &KernelOptions::default());
            let thrice = run(&rays, &triangles, &KernelOptions::default().with_intersection_count(3));
            prop_assert_eq!(once, thrice);
        }

        #[test]
        fn test_result_is_minimum_accepted_candidate(
            ray in arb_ray(),
            triangles in prop::collection::vec(arb_triangle(), 0..12),
        ) {
            let options = KernelOptions::default();
            let gpu_ray = GpuRay::from(&ray);
            let expected = triangles
                .iter()
                .filter_map(|t| candidate_distance(&gpu_ray, &GpuTriangle::from(t), &options))
                .fold(f32::INFINITY, f32::min);
            let got = run(&[ray], &triangles, &options)[0];
            prop_assert_eq!(got, expected);
            prop_assert!(got == f32::INFINITY || got > options.epsilon.value());
        }

        #[test]
        fn test_no_triangles_means_infinity(rays in prop::collection::vec(arb_ray(), 1..8)) {
            let d = run(&rays, &[], &KernelOptions::default());
            prop_assert!(d.iter().all(|x| *x == f32::INFINITY));
        }
    }
}
