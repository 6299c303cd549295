//! Hand-derived intersection cases with known distances.

use crate::geometry::{Ray, Triangle};

/// A named scene and the distance expected for each of its rays.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Case name, used in reports.
    pub name: &'static str,
    /// Rays, one work item each.
    pub rays: Vec<Ray>,
    /// Triangles.
    pub triangles: Vec<Triangle>,
    /// Expected distance per ray; `+∞` for a miss.
    pub expected: Vec<f32>,
}

fn down(x: f32, y: f32, z: f32) -> Ray {
    Ray::from_unit([x, y, z], [0.0, 0.0, -1.0])
}

/// The triangle most cases aim at: lies in `z = 0` and covers the origin.
fn base_triangle() -> Triangle {
    Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 0.0])
}

fn raised_triangle(z: f32) -> Triangle {
    Triangle::new([-0.5, -0.5, z], [2.0, 2.0, z], [0.0, 3.0, z])
}

/// Every built-in case.
pub fn fixtures() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "ray-fired-downwards",
            rays: vec![down(0.0, 0.0, 1.0)],
            triangles: vec![base_triangle()],
            expected: vec![1.0],
        },
        TestCase {
            name: "ray-fired-upwards",
            rays: vec![Ray::from_unit([0.0, 0.0, 1.0], [0.0, 0.0, 1.0])],
            triangles: vec![base_triangle()],
            expected: vec![f32::INFINITY],
        },
        TestCase {
            name: "two-rays-fired-downwards",
            rays: vec![down(0.0, 0.0, 1.0), down(2.0, 0.0, 1.0)],
            triangles: vec![base_triangle()],
            expected: vec![1.0, f32::INFINITY],
        },
        TestCase {
            name: "ray-fired-downwards-edge",
            rays: vec![down(-0.5, 0.0, 1.0)],
            triangles: vec![base_triangle()],
            expected: vec![1.0],
        },
        TestCase {
            name: "ray-fired-downwards-reversed-triangle",
            rays: vec![down(0.0, 0.0, 1.0)],
            triangles: vec![Triangle::new(
                [-1.0, 1.0, 0.0],
                [-1.0, -1.0, 0.0],
                [1.0, 0.0, 0.0],
            )],
            expected: vec![1.0],
        },
        TestCase {
            name: "overlapping-triangles",
            rays: vec![down(0.0, 0.0, 8.0)],
            triangles: vec![
                Triangle::new([-1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 0.0, 3.0]),
                raised_triangle(4.0),
            ],
            expected: vec![4.0],
        },
        TestCase {
            name: "ray-fired-diagonally",
            rays: vec![Ray::new([1.0, 2.0, 2.0], [-1.0, -2.0, -2.0])],
            triangles: vec![Triangle::new(
                [-100.0, -1.0, 0.0],
                [100.0, -0.5, 0.0],
                [0.2, 0.1, 0.0],
            )],
            expected: vec![3.0],
        },
        TestCase {
            name: "non-power-of-two-1",
            rays: vec![down(0.0, 0.0, 10.0)],
            triangles: vec![Triangle::new(
                [-2.0, -1.0, 4.0],
                [0.0, 0.0, 4.0],
                [1.0, 3.0, 4.0],
            )],
            expected: vec![6.0],
        },
        TestCase {
            name: "non-power-of-two-2",
            rays: vec![down(0.0, 0.0, 10.0)],
            triangles: vec![raised_triangle(4.0)],
            expected: vec![6.0],
        },
        TestCase {
            name: "non-power-of-two-3",
            rays: vec![down(0.0, 0.0, 100.0)],
            triangles: vec![raised_triangle(40.0)],
            expected: vec![60.0],
        },
    ]
}

/// Look a case up by name.
pub fn fixture(name: &str) -> Option<TestCase> {
    fixtures().into_iter().find(|case| case.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixtures_are_consistent() {
        let cases = fixtures();
        assert_eq!(cases.len(), 10);
        for case in &cases {
            assert_eq!(case.rays.len(), case.expected.len(), "{}", case.name);
            assert!(!case.triangles.is_empty(), "{}", case.name);
        }
    }

    #[test]
    fn test_fixture_names_unique() {
        let names: HashSet<_> = fixtures().iter().map(|c| c.name).collect();
        assert_eq!(names.len(), fixtures().len());
    }

    #[test]
    fn test_fixture_lookup() {
        assert_eq!(fixture("ray-fired-upwards").unwrap().expected, vec![f32::INFINITY]);
        assert!(fixture("no-such-case").is_none());
    }
}
