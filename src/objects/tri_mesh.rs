use crate::bvh::bbox::BBox;
use crate::types::ray::Ray;
use na::{Matrix4, Point3, Vector3};

/// Moller-Trumbore without the distance test: `(t, u, v)` when the ray's
/// line crosses the triangle.
pub(crate) fn moller_trumbore(ray: &Ray, v0: &Point3<f32>, v1: &Point3<f32>, v2: &Point3<f32>) -> Option<(f32, f32, f32)> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(&edge2);
    let a = edge1.dot(&h);
    // ray parallel to triangle
    if a.abs() < 1e-7 {
        return None;
    }
    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&edge1);
    let v = f * ray.direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some((f * edge2.dot(&q), u, v))
}

/// Registers a hit on `ray` if the triangle is closer than the current one.
pub fn intersect_tri(ray: &mut Ray, v0: &Point3<f32>, v1: &Point3<f32>, v2: &Point3<f32>, prim: u32) -> bool {
    match moller_trumbore(ray, v0, v1, v2) {
        Some((t, u, v)) if t > 0.0 && t < ray.hit.t => {
            ray.hit.t = t;
            ray.hit.u = u;
            ray.hit.v = v;
            ray.hit.prim = prim;
            true
        }
        _ => false,
    }
}

pub fn tri_occludes(ray: &Ray, v0: &Point3<f32>, v1: &Point3<f32>, v2: &Point3<f32>) -> bool {
    matches!(moller_trumbore(ray, v0, v1, v2), Some((t, _, _)) if t > 0.0 && t < ray.hit.t)
}

/// Baldwin-Weber transform of a triangle: three rows that map world space
/// into barycentric space. Degenerate triangles yield all zeros and never hit.
pub fn precompute_triangle(v0: &Point3<f32>, v1: &Point3<f32>, v2: &Point3<f32>) -> [f32; 12] {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let n = e1.cross(&e2);
    let d = v0.coords.dot(&n);
    let mut t = [0.0; 12];
    if n.x.abs() > n.y.abs() && n.x.abs() > n.z.abs() {
        let x1 = v1.y * v0.z - v1.z * v0.y;
        let x2 = v2.y * v0.z - v2.z * v0.y;
        let rn = 1.0 / n.x;
        t = [
            0.0, e2.z * rn, -e2.y * rn, x2 * rn, //
            0.0, -e1.z * rn, e1.y * rn, -x1 * rn, //
            1.0, n.y * rn, n.z * rn, -d * rn,
        ];
    } else if n.y.abs() > n.z.abs() {
        let x1 = v1.z * v0.x - v1.x * v0.z;
        let x2 = v2.z * v0.x - v2.x * v0.z;
        let rn = 1.0 / n.y;
        t = [
            -e2.z * rn, 0.0, e2.x * rn, x2 * rn, //
            e1.z * rn, 0.0, -e1.x * rn, -x1 * rn, //
            n.x * rn, 1.0, n.z * rn, -d * rn,
        ];
    } else if n.z.abs() > 0.0 {
        let x1 = v1.x * v0.y - v1.y * v0.x;
        let x2 = v2.x * v0.y - v2.y * v0.x;
        let rn = 1.0 / n.z;
        t = [
            e2.y * rn, -e2.x * rn, 0.0, x2 * rn, //
            -e1.y * rn, e1.x * rn, 0.0, -x1 * rn, //
            n.x * rn, n.y * rn, 1.0, -d * rn,
        ];
    }
    t
}

/// Intersects a triangle stored as a Baldwin-Weber transform. Returns `(t, u, v)`
/// when the hit is closer than `t_max`.
pub fn intersect_precomputed(ray: &Ray, t: &[f32], t_max: f32) -> Option<(f32, f32, f32)> {
    let o = &ray.origin;
    let d = &ray.direction;
    let trans_s = t[8] * o.x + t[9] * o.y + t[10] * o.z + t[11];
    let trans_d = t[8] * d.x + t[9] * d.y + t[10] * d.z;
    let ta = -trans_s / trans_d;
    if !(ta > 0.0 && ta < t_max) {
        return None;
    }
    let w = ray.at(ta);
    let u = t[0] * w.x + t[1] * w.y + t[2] * w.z + t[3];
    let v = t[4] * w.x + t[5] * w.y + t[6] * w.z + t[7];
    if u >= 0.0 && v >= 0.0 && u + v < 1.0 {
        Some((ta, u, v))
    } else {
        None
    }
}

/// Indexed triangle mesh. Hierarchies consume the flattened soup.
#[derive(Clone, Debug, Default)]
pub struct TriMesh {
    positions: Vec<Point3<f32>>,
    indices: Vec<u32>,
}

impl TriMesh {
    pub fn new(positions: Vec<Point3<f32>>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    /// Mesh whose vertices are already a soup: every three form a triangle.
    pub fn from_soup(positions: Vec<Point3<f32>>) -> Self {
        let indices = (0..positions.len() as u32).collect();
        Self { positions, indices }
    }

    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> BBox {
        BBox::from_points(&self.positions)
    }

    pub fn append(&mut self, other: &TriMesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    pub fn transform(&mut self, m: &Matrix4<f32>) {
        for p in &mut self.positions {
            *p = m.transform_point(p);
        }
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        self.transform(&Matrix4::new_translation(&offset));
    }

    pub fn to_soup(&self) -> Vec<Point3<f32>> {
        self.indices
            .chunks_exact(3)
            .flat_map(|t| t.iter().map(|&i| self.positions[i as usize]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> [Point3<f32>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn moller_trumbore_hits_inside() {
        let [v0, v1, v2] = tri();
        let mut ray = Ray::new(Point3::new(0.2, 0.2, -1.0), Vector3::new(0.0, 0.0, 1.0));
        assert!(intersect_tri(&mut ray, &v0, &v1, &v2, 7));
        assert!((ray.hit.t - 1.0).abs() < 1e-6);
        assert_eq!(ray.hit.prim, 7);
        // a second, farther test must not overwrite the hit
        let far = [v0 + Vector3::z(), v1 + Vector3::z(), v2 + Vector3::z()];
        assert!(!intersect_tri(&mut ray, &far[0], &far[1], &far[2], 8));
        assert_eq!(ray.hit.prim, 7);
    }

    #[test]
    fn parallel_ray_misses() {
        let [v0, v1, v2] = tri();
        let ray = Ray::new(Point3::new(0.2, 0.2, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(!tri_occludes(&ray, &v0, &v1, &v2));
    }

    #[test]
    fn precomputed_agrees_with_moller_trumbore() {
        let v0 = Point3::new(0.3, -0.2, 1.0);
        let v1 = Point3::new(2.0, 0.1, 1.5);
        let v2 = Point3::new(0.1, 1.7, 0.8);
        let t = precompute_triangle(&v0, &v1, &v2);
        let mut ray = Ray::new(Point3::new(0.5, 0.4, -3.0), Vector3::new(0.05, 0.02, 1.0));
        let (ta, u, v) = intersect_precomputed(&ray, &t, ray.hit.t).unwrap();
        assert!(intersect_tri(&mut ray, &v0, &v1, &v2, 0));
        assert!((ta - ray.hit.t).abs() < 1e-4);
        assert!((u - ray.hit.u).abs() < 1e-4);
        assert!((v - ray.hit.v).abs() < 1e-4);
    }
}
