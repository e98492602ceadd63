use crate::types::ray::Ray;
use crate::types::vector::{half_area, max_point, min_point, BVH_FAR};
use na::{Matrix4, Point3, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BBox {
    // a, b are opposite corners
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Self {
        Self {
            min: min_point(&a, &b),
            max: max_point(&a, &b),
        }
    }

    /// Inverted box that any `grow` or `merge` replaces.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(BVH_FAR, BVH_FAR, BVH_FAR),
            max: Point3::new(-BVH_FAR, -BVH_FAR, -BVH_FAR),
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3<f32>>,
    {
        let mut bbox = Self::empty();
        for p in points {
            bbox.grow(p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, p: &Point3<f32>) {
        self.min = min_point(&self.min, p);
        self.max = max_point(&self.max, p);
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: min_point(&self.min, &other.min),
            max: max_point(&self.max, &other.max),
        }
    }

    /// Overlap of two boxes; empty when they are disjoint.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            min: max_point(&self.min, &other.min),
            max: min_point(&self.max, &other.max),
        }
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn centroid(&self) -> Point3<f32> {
        na::center(&self.min, &self.max)
    }

    pub fn get_longest_axis(&self) -> usize {
        let e = self.extent();
        if e.y > e.x && e.y > e.z {
            1
        } else if e.z > e.x && e.z > e.y {
            2
        } else {
            0
        }
    }

    pub fn half_area(&self) -> f32 {
        half_area(&self.extent())
    }

    pub fn get_surface_area(&self) -> f32 {
        2.0 * self.half_area()
    }

    /// True when `other` lies inside this box, allowing `eps` of slack.
    pub fn contains(&self, other: &Self, eps: f32) -> bool {
        (0..3).all(|a| other.min[a] >= self.min[a] - eps && other.max[a] <= self.max[a] + eps)
    }

    pub fn corner(&self, i: usize) -> Point3<f32> {
        Point3::new(
            if i & 1 != 0 { self.max.x } else { self.min.x },
            if i & 2 != 0 { self.max.y } else { self.min.y },
            if i & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    /// Bounds of the eight transformed corners.
    pub fn transform(&self, m: &Matrix4<f32>) -> Self {
        let mut out = Self::empty();
        for i in 0..8 {
            out.grow(&m.transform_point(&self.corner(i)));
        }
        out
    }

    /// Slab test. Returns the entry distance, or `BVH_FAR` when the box is
    /// missed or lies beyond the current hit.
    pub fn intersect(&self, ray: &Ray) -> f32 {
        let tx1 = (self.min.x - ray.origin.x) * ray.rd.x;
        let tx2 = (self.max.x - ray.origin.x) * ray.rd.x;
        let mut tmin = tx1.min(tx2);
        let mut tmax = tx1.max(tx2);
        let ty1 = (self.min.y - ray.origin.y) * ray.rd.y;
        let ty2 = (self.max.y - ray.origin.y) * ray.rd.y;
        tmin = tmin.max(ty1.min(ty2));
        tmax = tmax.min(ty1.max(ty2));
        let tz1 = (self.min.z - ray.origin.z) * ray.rd.z;
        let tz2 = (self.max.z - ray.origin.z) * ray.rd.z;
        tmin = tmin.max(tz1.min(tz2));
        tmax = tmax.min(tz1.max(tz2));

        if tmax >= tmin && tmin < ray.hit.t && tmax >= 0.0 {
            tmin
        } else {
            BVH_FAR
        }
    }

    pub fn hit(&self, ray: &Ray) -> bool {
        self.intersect(ray) < BVH_FAR
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}
