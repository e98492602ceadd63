use na::{Point3, Vector3};

use super::Scene;
use crate::camera::Camera;
use crate::config::DemoConfig;
use crate::objects::quad_mesh::{quads_to_mesh, Quad};
use crate::objects::sphere::Sphere;

/// Tessellated spheres on a 5x5 grid above a floor.
pub struct SphereGrid;

impl Scene for SphereGrid {
    fn build_camera(config: &DemoConfig) -> Camera {
        Camera::new(
            config.aspect_ratio,
            config.image_width,
            45.0,
            Point3::new(0.0, 6.0, 14.0),
            Point3::new(0.0, 0.5, 0.0),
        )
    }

    fn build_scene(_config: &DemoConfig) -> Vec<Point3<f32>> {
        let mut mesh = quads_to_mesh(&[Quad::new(
            &Point3::new(-10.0, 0.0, -10.0),
            &Vector3::new(0.0, 0.0, 20.0),
            &Vector3::new(20.0, 0.0, 0.0),
        )]);
        for i in 0..5 {
            for j in 0..5 {
                let center = Point3::new(i as f32 * 2.5 - 5.0, 1.0, j as f32 * 2.5 - 5.0);
                mesh.append(&Sphere::new(center, 1.0).tessellate(24));
            }
        }
        mesh.to_soup()
    }
}
