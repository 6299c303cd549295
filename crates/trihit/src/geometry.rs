//! Ray and triangle records.

use nalgebra::Vector3;

/// A vector in 3D space, single precision like the kernel.
pub type Vec3 = Vector3<f32>;

/// Tolerance on `‖direction‖ - 1` accepted by [`Ray::from_unit`].
const UNIT_TOLERANCE: f32 = 1e-5;

/// A ray defined by a start position and a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start position of the ray.
    pub position: Vec3,
    /// Unit direction of the ray.
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray from position and direction.
    ///
    /// The direction will be normalized. A zero direction yields NaN
    /// components, which the kernel treats as a miss.
    pub fn new(position: impl Into<Vec3>, direction: impl Into<Vec3>) -> Self {
        Self {
            position: position.into(),
            direction: direction.into().normalize(),
        }
    }

    /// Create a ray whose direction is already a unit vector.
    pub fn from_unit(position: impl Into<Vec3>, direction: impl Into<Vec3>) -> Self {
        let direction = direction.into();
        debug_assert!(
            (direction.norm() - 1.0).abs() <= UNIT_TOLERANCE,
            "ray direction {direction:?} is not a unit vector"
        );
        Self {
            position: position.into(),
            direction,
        }
    }

    /// Evaluate the ray at distance `t`: `position + t * direction`.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.position + self.direction * t
    }
}

/// A triangle given by its three vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex; the origin of the edge-vector encoding.
    pub p1: Vec3,
    /// Second vertex.
    pub p2: Vec3,
    /// Third vertex.
    pub p3: Vec3,
}

impl Triangle {
    /// Create a triangle from three vertices.
    pub fn new(p1: impl Into<Vec3>, p2: impl Into<Vec3>, p3: impl Into<Vec3>) -> Self {
        Self {
            p1: p1.into(),
            p2: p2.into(),
            p3: p3.into(),
        }
    }

    /// Rebuild a triangle from its origin and edge vectors.
    pub fn from_edges(origin: Vec3, edge1: Vec3, edge2: Vec3) -> Self {
        Self {
            p1: origin,
            p2: origin + edge1,
            p3: origin + edge2,
        }
    }

    /// Edge vectors `(p2 - p1, p3 - p1)`.
    #[inline]
    pub fn edges(&self) -> (Vec3, Vec3) {
        (self.p2 - self.p1, self.p3 - self.p1)
    }

    /// Whether the triangle has zero area (`edge1 × edge2 = 0`).
    ///
    /// Degenerate triangles are valid input; they are never hit.
    pub fn is_degenerate(&self) -> bool {
        let (edge1, edge2) = self.edges();
        edge1.cross(&edge2) == Vec3::zeros()
    }

    /// The three vertices in order.
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.p1, self.p2, self.p3]
    }
}
