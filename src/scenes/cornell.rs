use na::{Matrix4, Point3, Vector3};

use super::Scene;
use crate::camera::Camera;
use crate::config::DemoConfig;
use crate::objects::quad_mesh::{quads_to_mesh, Quad};

pub struct Cornell;

impl Scene for Cornell {
    fn build_camera(config: &DemoConfig) -> Camera {
        Camera::new(
            config.aspect_ratio,
            config.image_width,
            40.0,
            Point3::new(278.0, 278.0, -800.0),
            Point3::new(278.0, 278.0, 0.0),
        )
    }

    fn build_scene(_config: &DemoConfig) -> Vec<Point3<f32>> {
        let walls = [
            Quad::new(
                &Point3::new(555.0, 0.0, 0.0),
                &Vector3::new(0.0, 555.0, 0.0),
                &Vector3::new(0.0, 0.0, 555.0),
            ),
            Quad::new(
                &Point3::new(0.0, 0.0, 0.0),
                &Vector3::new(0.0, 555.0, 0.0),
                &Vector3::new(0.0, 0.0, 555.0),
            ),
            Quad::new(
                &Point3::new(343.0, 554.0, 332.0),
                &Vector3::new(-130.0, 0.0, 0.0),
                &Vector3::new(0.0, 0.0, -105.0),
            ),
            Quad::new(
                &Point3::new(0.0, 0.0, 0.0),
                &Vector3::new(555.0, 0.0, 0.0),
                &Vector3::new(0.0, 0.0, 555.0),
            ),
            Quad::new(
                &Point3::new(555.0, 555.0, 555.0),
                &Vector3::new(-555.0, 0.0, 0.0),
                &Vector3::new(0.0, 0.0, -555.0),
            ),
            Quad::new(
                &Point3::new(0.0, 0.0, 555.5),
                &Vector3::new(555.0, 0.0, 0.0),
                &Vector3::new(0.0, 555.0, 0.0),
            ),
        ];
        let mut mesh = quads_to_mesh(&walls);

        let mut box1 = quads_to_mesh(&Quad::new_box(&Point3::origin(), &Point3::new(165.0, 330.0, 165.0)));
        box1.transform(
            &(Matrix4::new_translation(&Vector3::new(265.0, 0.0, 295.0))
                * Matrix4::new_rotation(Vector3::y() * 15.0_f32.to_radians())),
        );

        let mut box2 = quads_to_mesh(&Quad::new_box(&Point3::origin(), &Point3::new(165.0, 165.0, 165.0)));
        box2.transform(
            &(Matrix4::new_translation(&Vector3::new(130.0, 0.0, 65.0))
                * Matrix4::new_rotation(Vector3::y() * -18.0_f32.to_radians())),
        );

        mesh.append(&box1);
        mesh.append(&box2);
        mesh.to_soup()
    }
}
