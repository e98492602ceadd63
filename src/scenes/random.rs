use na::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Scene;
use crate::camera::Camera;
use crate::config::DemoConfig;

/// Small random triangles scattered through a cube, seeded for repeatability.
pub struct Random;

impl Random {
    pub fn triangles(count: u32, seed: u64) -> Vec<Point3<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut verts = Vec::with_capacity(count as usize * 3);
        for _ in 0..count {
            let base = Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            verts.push(base);
            for _ in 0..2 {
                let offset = Vector3::new(
                    rng.gen_range(-0.1..0.1),
                    rng.gen_range(-0.1..0.1),
                    rng.gen_range(-0.1..0.1),
                );
                verts.push(base + offset);
            }
        }
        verts
    }
}

impl Scene for Random {
    fn build_camera(config: &DemoConfig) -> Camera {
        Camera::new(
            config.aspect_ratio,
            config.image_width,
            50.0,
            Point3::new(0.0, 0.0, 3.5),
            Point3::origin(),
        )
    }

    fn build_scene(config: &DemoConfig) -> Vec<Point3<f32>> {
        Self::triangles(config.triangles.max(1), config.seed)
    }
}
