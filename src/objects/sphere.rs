use crate::objects::tri_mesh::TriMesh;
use na::{Point3, Vector3};

#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Latitude-longitude tessellation with `segments` slices and
    /// `segments / 2` stacks. The poles get a single triangle fan each.
    pub fn tessellate(&self, segments: u32) -> TriMesh {
        let segments = segments.max(3);
        let stacks = (segments / 2).max(2);
        let mut positions = Vec::with_capacity(((stacks + 1) * (segments + 1)) as usize);
        for i in 0..=stacks {
            let theta = std::f32::consts::PI * i as f32 / stacks as f32;
            for j in 0..=segments {
                let phi = 2.0 * std::f32::consts::PI * j as f32 / segments as f32;
                let dir = Vector3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                positions.push(self.center + dir * self.radius);
            }
        }
        let row = segments + 1;
        let mut indices = Vec::with_capacity((stacks * segments * 6) as usize);
        for i in 0..stacks {
            for j in 0..segments {
                let a = i * row + j;
                let b = a + row;
                if i != 0 {
                    indices.extend_from_slice(&[a, b, a + 1]);
                }
                if i != stacks - 1 {
                    indices.extend_from_slice(&[a + 1, b, b + 1]);
                }
            }
        }
        TriMesh::new(positions, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tessellation_lies_on_sphere() {
        let sphere = Sphere::new(Point3::new(1.0, 2.0, 3.0), 2.0);
        let mesh = sphere.tessellate(12);
        // 6 stacks: two polar fans of 12 plus 4 bands of 24
        assert_eq!(mesh.tri_count(), 12 * 2 + 4 * 24);
        let soup = mesh.to_soup();
        assert!(soup.iter().all(|p| ((p - sphere.center).norm() - 2.0).abs() < 1e-5));
    }
}
