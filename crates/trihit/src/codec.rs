//! Flat `f32` wire layout for rays, triangles, and results.
//!
//! Rays are 6 floats (position, direction). Triangles are 9 floats
//! (origin `p1`, `edge1 = p2 - p1`, `edge2 = p3 - p1`), so the kernel never
//! recomputes vertex differences per ray. Results are one float per ray,
//! starting at `+∞`.
//!
//! Nothing here sanitizes input: NaN coordinates are passed through.

use bytemuck::{Pod, Zeroable};

use crate::error::CodecError;
use crate::geometry::{Ray, Triangle, Vec3};

/// Floats per encoded ray.
pub const RAY_STRIDE: usize = 6;

/// Floats per encoded triangle.
pub const TRIANGLE_STRIDE: usize = 9;

/// Kernel-side ray layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuRay {
    /// Ray start position.
    pub position: [f32; 3],
    /// Unit direction.
    pub direction: [f32; 3],
}

impl From<&Ray> for GpuRay {
    fn from(ray: &Ray) -> Self {
        Self {
            position: ray.position.into(),
            direction: ray.direction.into(),
        }
    }
}

impl From<&GpuRay> for Ray {
    fn from(ray: &GpuRay) -> Self {
        Ray {
            position: ray.position.into(),
            direction: ray.direction.into(),
        }
    }
}

/// Kernel-side triangle layout (edge-vector encoding).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuTriangle {
    /// First vertex.
    pub origin: [f32; 3],
    /// `p2 - p1`.
    pub edge1: [f32; 3],
    /// `p3 - p1`.
    pub edge2: [f32; 3],
}

impl From<&Triangle> for GpuTriangle {
    fn from(triangle: &Triangle) -> Self {
        let (edge1, edge2) = triangle.edges();
        Self {
            origin: triangle.p1.into(),
            edge1: edge1.into(),
            edge2: edge2.into(),
        }
    }
}

impl From<&GpuTriangle> for Triangle {
    fn from(triangle: &GpuTriangle) -> Self {
        Triangle::from_edges(
            Vec3::from(triangle.origin),
            Vec3::from(triangle.edge1),
            Vec3::from(triangle.edge2),
        )
    }
}

/// Encode rays as 6 floats each, in input order.
pub fn encode_rays(rays: &[Ray]) -> Vec<f32> {
    let mut out = Vec::with_capacity(rays.len() * RAY_STRIDE);
    for ray in rays {
        let record: [f32; RAY_STRIDE] = bytemuck::cast(GpuRay::from(ray));
        out.extend_from_slice(&record);
    }
    out
}

/// Encode triangles as 9 floats each (origin, edge1, edge2), in input order.
pub fn encode_triangles(triangles: &[Triangle]) -> Vec<f32> {
    let mut out = Vec::with_capacity(triangles.len() * TRIANGLE_STRIDE);
    for triangle in triangles {
        let record: [f32; TRIANGLE_STRIDE] = bytemuck::cast(GpuTriangle::from(triangle));
        out.extend_from_slice(&record);
    }
    out
}

/// A result buffer of `count` distances, all `+∞` (no intersection yet).
pub fn initial_results(count: usize) -> Vec<f32> {
    vec![f32::INFINITY; count]
}

/// View a flat buffer as kernel-side records.
fn records<T: Pod>(buffer: &[f32], stride: usize) -> Result<&[T], CodecError> {
    if buffer.len() % stride != 0 {
        return Err(CodecError {
            len: buffer.len(),
            stride,
        });
    }
    bytemuck::try_cast_slice(buffer).map_err(|_| CodecError {
        len: buffer.len(),
        stride,
    })
}

/// View an encoded ray buffer as [`GpuRay`] records without copying.
pub fn ray_records(buffer: &[f32]) -> Result<&[GpuRay], CodecError> {
    records(buffer, RAY_STRIDE)
}

/// View an encoded triangle buffer as [`GpuTriangle`] records without copying.
pub fn triangle_records(buffer: &[f32]) -> Result<&[GpuTriangle], CodecError> {
    records(buffer, TRIANGLE_STRIDE)
}

/// Decode a buffer produced by [`encode_rays`].
pub fn decode_rays(buffer: &[f32]) -> Result<Vec<Ray>, CodecError> {
    Ok(ray_records(buffer)?.iter().map(Ray::from).collect())
}

/// Decode a buffer produced by [`encode_triangles`].
///
/// Vertices are recovered as `p2 = p1 + edge1`, `p3 = p1 + edge2`, which can
/// differ from the originals by rounding.
pub fn decode_triangles(buffer: &[f32]) -> Result<Vec<Triangle>, CodecError> {
    Ok(triangle_records(buffer)?.iter().map(Triangle::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_rays_layout() {
        let rays = [
            Ray::from_unit([1.0, 2.0, 3.0], [0.0, 0.0, -1.0]),
            Ray::from_unit([4.0, 5.0, 6.0], [1.0, 0.0, 0.0]),
        ];
        assert_eq!(
            encode_rays(&rays),
            vec![1.0, 2.0, 3.0, 0.0, 0.0, -1.0, 4.0, 5.0, 6.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_encode_triangles_uses_edges() {
        let tri = Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 0.0]);
        assert_eq!(
            encode_triangles(&[tri]),
            vec![-1.0, -1.0, 0.0, 0.0, 2.0, 0.0, 2.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_initial_results() {
        let results = initial_results(3);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|d| *d == f32::INFINITY));
        assert!(initial_results(0).is_empty());
    }

    #[test]
    fn test_nan_passes_through() {
        let ray = Ray::from_unit([f32::NAN, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let encoded = encode_rays(&[ray]);
        assert!(encoded[0].is_nan());
    }

    #[test]
    fn test_decode_rejects_partial_records() {
        let err = decode_rays(&[0.0; 7]).unwrap_err();
        assert_eq!(err, CodecError { len: 7, stride: 6 });
        assert!(decode_triangles(&[0.0; 10]).is_err());
        assert!(decode_triangles(&[]).unwrap().is_empty());
    }

    fn coord() -> impl Strategy<Value = f32> {
        -100.0f32..100.0
    }

    fn vec3() -> impl Strategy<Value = [f32; 3]> {
        [coord(), coord(), coord()]
    }

    proptest! {
        #[test]
        fn test_ray_round_trip(position in vec3(), direction in vec3()) {
            let ray = Ray { position: position.into(), direction: direction.into() };
            let decoded = decode_rays(&encode_rays(&[ray])).unwrap();
            prop_assert_eq!(decoded, vec![ray]);
        }

        #[test]
        fn test_triangle_round_trip(p1 in vec3(), p2 in vec3(), p3 in vec3()) {
            let tri = Triangle::new(p1, p2, p3);
            let decoded = decode_triangles(&encode_triangles(&[tri])).unwrap();
            prop_assert_eq!(decoded.len(), 1);
            prop_assert_eq!(decoded[0].p1, tri.p1);
            prop_assert!((decoded[0].p2 - tri.p2).norm() <= 1e-4);
            prop_assert!((decoded[0].p3 - tri.p3).norm() <= 1e-4);
        }
    }
}
