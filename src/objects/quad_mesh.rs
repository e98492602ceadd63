use crate::bvh::bbox::BBox;
use crate::objects::tri_mesh::TriMesh;
use na::{Point3, Vector3};

/// Parallelogram spanned by `u` and `v` from `origin`. Only used to author
/// scenes; it is split into two triangles before any tree sees it.
#[derive(Clone, Copy, Debug)]
pub struct Quad {
    origin: Point3<f32>,
    u: Vector3<f32>,
    v: Vector3<f32>,
}

impl Quad {
    pub fn new(origin: &Point3<f32>, u: &Vector3<f32>, v: &Vector3<f32>) -> Self {
        Self {
            origin: *origin,
            u: *u,
            v: *v,
        }
    }

    /// The six faces of the box with opposite corners `a` and `b`.
    pub fn new_box(a: &Point3<f32>, b: &Point3<f32>) -> Vec<Quad> {
        let min = Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z));
        let max = Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z));

        let dx = Vector3::new(max.x - min.x, 0.0, 0.0);
        let dy = Vector3::new(0.0, max.y - min.y, 0.0);
        let dz = Vector3::new(0.0, 0.0, max.z - min.z);

        vec![
            Quad::new(&Point3::new(min.x, min.y, max.z), &dx, &dy),
            Quad::new(&Point3::new(max.x, min.y, max.z), &-dz, &dy),
            Quad::new(&Point3::new(max.x, min.y, min.z), &-dx, &dy),
            Quad::new(&Point3::new(min.x, min.y, min.z), &dz, &dy),
            Quad::new(&Point3::new(min.x, max.y, max.z), &dx, &-dz),
            Quad::new(&Point3::new(min.x, min.y, min.z), &dx, &dz),
        ]
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.origin, self.origin + self.u + self.v).merge(&BBox::new(self.origin + self.u, self.origin + self.v))
    }

    pub fn to_triangles(&self) -> [Point3<f32>; 6] {
        let (o, u, v) = (self.origin, self.u, self.v);
        [o, o + u, o + v, o + u, o + u + v, o + v]
    }
}

/// Triangle soup of a set of quads.
pub fn quads_to_mesh(quads: &[Quad]) -> TriMesh {
    TriMesh::from_soup(quads.iter().flat_map(|q| q.to_triangles()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_has_twelve_triangles_on_its_surface() {
        let quads = Quad::new_box(&Point3::new(1.0, 2.0, 3.0), &Point3::new(0.0, 0.0, 0.0));
        let mesh = quads_to_mesh(&quads);
        assert_eq!(mesh.tri_count(), 12);
        let bounds = mesh.bounds();
        assert_eq!(bounds.min, Point3::origin());
        assert_eq!(bounds.max, Point3::new(1.0, 2.0, 3.0));
        for q in &quads {
            assert!(bounds.contains(&q.bbox(), 0.0));
        }
    }
}
