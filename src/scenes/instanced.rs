use na::{Matrix4, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Scene;
use crate::camera::Camera;
use crate::config::DemoConfig;
use crate::objects::quad_mesh::{quads_to_mesh, Quad};
use crate::objects::sphere::Sphere;
use crate::objects::tri_mesh::TriMesh;

/// One bottom-level mesh placed many times with random rotations.
pub struct Instanced;

impl Instanced {
    /// A sphere resting on a box, in instance space.
    pub fn blas_mesh() -> TriMesh {
        let mut mesh = quads_to_mesh(&Quad::new_box(&Point3::new(-0.5, -0.5, -0.5), &Point3::new(0.5, 0.0, 0.5)));
        mesh.append(&Sphere::new(Point3::new(0.0, 0.4, 0.0), 0.4).tessellate(16));
        mesh
    }

    /// A 6x6 grid of placements, each turned about y and slightly scaled.
    pub fn transforms(seed: u64) -> Vec<Matrix4<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(36);
        for i in 0..6 {
            for j in 0..6 {
                let offset = Vector3::new(i as f32 * 1.6 - 4.0, 0.0, j as f32 * 1.6 - 4.0);
                let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
                let scale: f32 = rng.gen_range(0.7..1.2);
                out.push(
                    Matrix4::new_translation(&offset)
                        * Matrix4::new_rotation(Vector3::y() * angle)
                        * Matrix4::new_scaling(scale),
                );
            }
        }
        out
    }
}

impl Scene for Instanced {
    fn build_camera(config: &DemoConfig) -> Camera {
        Camera::new(
            config.aspect_ratio,
            config.image_width,
            45.0,
            Point3::new(0.0, 7.0, 11.0),
            Point3::origin(),
        )
    }

    /// The instances baked into world space.
    fn build_scene(config: &DemoConfig) -> Vec<Point3<f32>> {
        let blas = Self::blas_mesh();
        let mut world = TriMesh::default();
        for m in Self::transforms(config.seed) {
            let mut copy = blas.clone();
            copy.transform(&m);
            world.append(&copy);
        }
        world.to_soup()
    }
}
