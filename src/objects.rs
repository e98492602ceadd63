pub mod instance;
pub mod quad_mesh;
pub mod sphere;
pub mod tri_mesh;

use crate::bvh::compressed::CompressedBvh;
use crate::bvh::wide::Bvh8;
use crate::bvh::Bvh;
use crate::types::ray::Ray;
use na::Point3;
use std::borrow::Borrow;

use tri_mesh::{intersect_tri, tri_occludes};

/// Anything a ray can be traced against. Every tree layout implements it so
/// renderers and tests can be written once and monomorphized per layout.
pub trait Hittable {
    /// Updates `ray.hit` with the nearest hit closer than `ray.hit.t` and
    /// returns a traversal step count.
    fn intersect(&self, ray: &mut Ray) -> u32;
    /// True when anything lies closer than `ray.hit.t`.
    fn is_occluded(&self, ray: &Ray) -> bool;
}

impl Hittable for Bvh {
    fn intersect(&self, ray: &mut Ray) -> u32 {
        Bvh::intersect(self, ray)
    }

    fn is_occluded(&self, ray: &Ray) -> bool {
        Bvh::is_occluded(self, ray)
    }
}

impl<B: Borrow<Bvh>> Hittable for Bvh8<B> {
    fn intersect(&self, ray: &mut Ray) -> u32 {
        Bvh8::intersect(self, ray)
    }

    fn is_occluded(&self, ray: &Ray) -> bool {
        Bvh8::is_occluded(self, ray)
    }
}

impl Hittable for CompressedBvh {
    fn intersect(&self, ray: &mut Ray) -> u32 {
        CompressedBvh::intersect(self, ray)
    }

    fn is_occluded(&self, ray: &Ray) -> bool {
        CompressedBvh::is_occluded(self, ray)
    }
}

/// Triangle soup without any acceleration structure. Tests every triangle,
/// which makes it the reference the trees are checked against.
pub struct TriangleSoup<'a> {
    verts: &'a [Point3<f32>],
}

impl<'a> TriangleSoup<'a> {
    pub fn new(verts: &'a [Point3<f32>]) -> Self {
        Self { verts }
    }
}

impl Hittable for TriangleSoup<'_> {
    fn intersect(&self, ray: &mut Ray) -> u32 {
        for (prim, tri) in self.verts.chunks_exact(3).enumerate() {
            intersect_tri(ray, &tri[0], &tri[1], &tri[2], prim as u32);
        }
        (self.verts.len() / 3) as u32
    }

    fn is_occluded(&self, ray: &Ray) -> bool {
        self.verts
            .chunks_exact(3)
            .any(|tri| tri_occludes(ray, &tri[0], &tri[1], &tri[2]))
    }
}
