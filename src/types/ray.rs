use crate::types::vector::{safe_rcp3, BVH_FAR};
use na::{Point3, Vector3};

/// Nearest hit found so far. `t` only ever shrinks during traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersection {
    pub t: f32,
    pub u: f32,
    pub v: f32,
    pub prim: u32,
    pub inst: u32,
}

impl Default for Intersection {
    fn default() -> Self {
        Self {
            t: BVH_FAR,
            u: 0.0,
            v: 0.0,
            prim: 0,
            inst: 0,
        }
    }
}

impl Intersection {
    pub fn is_hit(&self) -> bool {
        self.t < BVH_FAR
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
    /// Safe reciprocal of `direction`.
    pub rd: Vector3<f32>,
    pub hit: Intersection,
}

impl Ray {
    /// Builds a ray with a normalized direction and an unbounded hit distance.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self::with_t_max(origin, direction, BVH_FAR)
    }

    pub fn with_t_max(origin: Point3<f32>, direction: Vector3<f32>, t_max: f32) -> Self {
        let direction = direction.try_normalize(0.0).unwrap_or(direction);
        Self {
            origin,
            direction,
            rd: safe_rcp3(&direction),
            hit: Intersection {
                t: t_max,
                ..Intersection::default()
            },
        }
    }

    /// Origin and direction taken as given, without normalizing. Used when
    /// moving a ray into instance space so that `t` stays in world units.
    pub fn raw(origin: Point3<f32>, direction: Vector3<f32>, hit: Intersection) -> Self {
        Self {
            origin,
            direction,
            rd: safe_rcp3(&direction),
            hit,
        }
    }

    pub fn at(&self, t: f32) -> Point3<f32> {
        self.origin + t * self.direction
    }

    pub fn set(&mut self, origin: Point3<f32>, direction: Vector3<f32>) {
        *self = Self::new(origin, direction);
    }

    /// Octant index of the direction; bit 2 for negative x, bit 1 for y, bit 0 for z.
    pub fn octant(&self) -> u32 {
        (if self.direction.x < 0.0 { 4 } else { 0 })
            | (if self.direction.y < 0.0 { 2 } else { 0 })
            | (if self.direction.z < 0.0 { 1 } else { 0 })
    }
}
