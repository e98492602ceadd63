#![allow(dead_code)]

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raybvh::{Hittable, Ray};

/// Rays starting on a sphere of radius 3 and aimed at random points inside
/// the unit cube, where the random test scenes live.
pub fn rays(count: usize, seed: u64) -> Vec<Ray> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let from = Vector3::new(
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
            )
            .try_normalize(1e-3)
            .unwrap_or_else(Vector3::z)
                * 3.0;
            let to = Point3::new(
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
            );
            let origin = Point3::from(from);
            Ray::new(origin, to - origin)
        })
        .collect()
}

pub fn nearest<H: Hittable + ?Sized>(scene: &H, ray: &Ray) -> f32 {
    let mut ray = *ray;
    scene.intersect(&mut ray);
    ray.hit.t
}

/// Number of rays on which two scenes report different nearest distances.
pub fn mismatches<A: Hittable + ?Sized, B: Hittable + ?Sized>(reference: &A, scene: &B, rays: &[Ray], eps: f32) -> usize {
    rays.iter()
        .filter(|ray| (nearest(reference, ray) - nearest(scene, ray)).abs() > eps)
        .count()
}

/// Rays along the six coordinate axes, entering the unit cube from outside.
/// Two direction components are exactly zero.
pub fn axis_rays(count: usize, seed: u64) -> Vec<Ray> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let axis = i % 3;
            let sign = if (i / 3) % 2 == 0 { 1.0 } else { -1.0 };
            let mut origin = Point3::new(
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
            );
            origin[axis] = -3.0 * sign;
            let mut direction = Vector3::zeros();
            direction[axis] = sign;
            Ray::new(origin, direction)
        })
        .collect()
}
