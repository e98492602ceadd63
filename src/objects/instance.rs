use crate::bvh::bbox::BBox;
use crate::bvh::Bvh;
use crate::error::{BvhError, Result};
use crate::objects::Hittable;
use crate::types::ray::Ray;
use na::{Matrix4, Point3, Vector3};

/// A bottom-level tree placed in the world by a 4x4 transform.
///
/// `world_bounds` is a cached value: it changes only when `update` is called,
/// so several transform edits can be batched before the top level is rebuilt.
#[derive(Clone, Debug)]
pub struct BlasInstance<'a> {
    blas: &'a Bvh,
    transform: Matrix4<f32>,
    inv_transform: Matrix4<f32>,
    world_bounds: BBox,
}

impl<'a> BlasInstance<'a> {
    pub fn new(blas: &'a Bvh) -> Self {
        Self {
            blas,
            transform: Matrix4::identity(),
            inv_transform: Matrix4::identity(),
            world_bounds: blas.bounds(),
        }
    }

    pub fn with_transform(blas: &'a Bvh, transform: Matrix4<f32>) -> Result<Self> {
        let mut instance = Self::new(blas);
        instance.set_transform(transform)?;
        instance.update();
        Ok(instance)
    }

    pub fn set_transform(&mut self, transform: Matrix4<f32>) -> Result<()> {
        let inv = transform.try_inverse().ok_or(BvhError::SingularTransform)?;
        self.transform = transform;
        self.inv_transform = inv;
        Ok(())
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        self.transform = Matrix4::new_translation(&offset) * self.transform;
        self.inv_transform *= Matrix4::new_translation(&-offset);
    }

    /// Rotation about the world y axis, applied after the current transform.
    pub fn rotate_y(&mut self, angle: f32) {
        self.transform = Matrix4::new_rotation(Vector3::y() * angle) * self.transform;
        self.inv_transform *= Matrix4::new_rotation(Vector3::y() * -angle);
    }

    /// Recomputes the world bounds from the eight transformed corners of the
    /// bottom-level root box.
    pub fn update(&mut self) {
        self.world_bounds = self.blas.bounds().transform(&self.transform);
    }

    pub fn blas(&self) -> &'a Bvh {
        self.blas
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn world_bounds(&self) -> BBox {
        self.world_bounds
    }

    pub fn transform_point(&self, p: &Point3<f32>) -> Point3<f32> {
        self.transform.transform_point(p)
    }

    pub fn transform_vector(&self, v: &Vector3<f32>) -> Vector3<f32> {
        self.transform.transform_vector(v)
    }

    /// The ray in instance space. The direction is not renormalized, so hit
    /// distances stay comparable with the world-space ray.
    pub fn to_local(&self, ray: &Ray) -> Ray {
        Ray::raw(
            self.inv_transform.transform_point(&ray.origin),
            self.inv_transform.transform_vector(&ray.direction),
            ray.hit,
        )
    }
}

impl Bvh {
    /// Builds a top-level tree over the cached world bounds of `instances`.
    /// Leaves index into the same slice.
    pub fn build_tlas(&mut self, instances: &[BlasInstance]) -> Result<()> {
        let boxes: Vec<BBox> = instances.iter().map(|i| i.world_bounds).collect();
        self.build_over_boxes(&boxes)
    }

    /// Traces a world-space ray through a top-level tree built with
    /// `build_tlas` over the same `instances`. Improved hits are tagged with
    /// the instance index in `hit.inst`.
    ///
    /// Returns 0 without touching the ray when this is not a box tree or
    /// `instances` does not have one entry per box.
    pub fn intersect_tlas(&self, ray: &mut Ray, instances: &[BlasInstance]) -> u32 {
        if !self.over_boxes() || instances.len() != self.tri_count as usize {
            return 0;
        }
        let mut blas_steps = 0;
        let tlas_steps = self.traverse_with(ray, |ray, idx| {
            let instance = &instances[idx as usize];
            let mut local = instance.to_local(ray);
            blas_steps += instance.blas.intersect(&mut local);
            if local.hit.t < ray.hit.t {
                ray.hit = local.hit;
                ray.hit.inst = idx;
            }
        });
        tlas_steps + blas_steps
    }

    pub fn is_occluded_tlas(&self, ray: &Ray, instances: &[BlasInstance]) -> bool {
        let mut shadow = *ray;
        self.intersect_tlas(&mut shadow, instances);
        shadow.hit.t < ray.hit.t
    }
}

/// Two-level scene: a top-level tree and the instances it was built over.
pub struct Tlas<'a> {
    bvh: Bvh,
    instances: Vec<BlasInstance<'a>>,
}

impl<'a> Tlas<'a> {
    pub fn new(instances: Vec<BlasInstance<'a>>) -> Result<Self> {
        let mut bvh = Bvh::new();
        bvh.build_tlas(&instances)?;
        Ok(Self { bvh, instances })
    }

    pub fn instances(&self) -> &[BlasInstance<'a>] {
        &self.instances
    }

    /// Access for moving instances; call `update` on each edited instance,
    /// then `rebuild`.
    pub fn instances_mut(&mut self) -> &mut [BlasInstance<'a>] {
        &mut self.instances
    }

    pub fn rebuild(&mut self) -> Result<()> {
        self.bvh.build_tlas(&self.instances)
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }
}

impl Hittable for Tlas<'_> {
    fn intersect(&self, ray: &mut Ray) -> u32 {
        self.bvh.intersect_tlas(ray, &self.instances)
    }

    fn is_occluded(&self, ray: &Ray) -> bool {
        self.bvh.is_occluded_tlas(ray, &self.instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn singular_transform_is_rejected() {
        let mut blas = Bvh::new();
        blas.build(&unit_square()).unwrap();
        let mut instance = BlasInstance::new(&blas);
        let flat = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(instance.set_transform(flat), Err(BvhError::SingularTransform)));
        assert_eq!(instance.transform(), &Matrix4::identity());
    }

    #[test]
    fn bounds_follow_update_only() {
        let mut blas = Bvh::new();
        blas.build(&unit_square()).unwrap();
        let mut instance = BlasInstance::new(&blas);
        instance.translate(Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(instance.world_bounds().min.x, 0.0);
        instance.update();
        assert!((instance.world_bounds().min.x - 5.0).abs() < 1e-6);
        assert!((instance.transform_point(&Point3::origin()).x - 5.0).abs() < 1e-6);
        assert_eq!(instance.transform_vector(&Vector3::x()), Vector3::x());
    }

    #[test]
    fn tlas_tags_instance_and_keeps_world_distance() {
        let mut blas = Bvh::new();
        blas.build(&unit_square()).unwrap();
        let near = BlasInstance::with_transform(&blas, Matrix4::new_translation(&Vector3::new(0.0, 0.0, 2.0))).unwrap();
        // scaled up and pushed further away
        let far = BlasInstance::with_transform(
            &blas,
            Matrix4::new_translation(&Vector3::new(-1.0, -1.0, 6.0)) * Matrix4::new_scaling(3.0),
        )
        .unwrap();
        let tlas = Tlas::new(vec![far, near]).unwrap();

        let mut ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
        tlas.intersect(&mut ray);
        assert!((ray.hit.t - 3.0).abs() < 1e-5);
        assert_eq!(ray.hit.inst, 1);

        let mut ray = Ray::new(Point3::new(1.5, 1.5, -1.0), Vector3::z());
        tlas.intersect(&mut ray);
        assert!((ray.hit.t - 7.0).abs() < 1e-5);
        assert_eq!(ray.hit.inst, 0);
        assert!(tlas.is_occluded(&Ray::new(Point3::new(1.5, 1.5, -1.0), Vector3::z())));
    }

    #[test]
    fn mismatched_instances_are_ignored() {
        let mut blas = Bvh::new();
        blas.build(&unit_square()).unwrap();
        let a = BlasInstance::new(&blas);
        let b = BlasInstance::with_transform(&blas, Matrix4::new_translation(&Vector3::new(3.0, 0.0, 0.0))).unwrap();
        let mut tlas = Bvh::new();
        tlas.build_tlas(&[a.clone(), b]).unwrap();
        let origin = Point3::new(3.5, 0.5, -1.0);

        // one instance short of what the tree was built over
        let mut ray = Ray::new(origin, Vector3::z());
        assert_eq!(tlas.intersect_tlas(&mut ray, &[a.clone()]), 0);
        assert!(!ray.hit.is_hit());
        assert!(!tlas.is_occluded_tlas(&ray, &[a.clone()]));

        // a triangle tree is not a top-level tree
        assert_eq!(blas.intersect_tlas(&mut ray, &[a.clone(), a]), 0);
        assert!(!ray.hit.is_hit());
    }
}
