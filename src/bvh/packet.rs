use crate::bvh::bbox::BBox;
use crate::bvh::{Bvh, BvhNode};
use crate::types::ray::Ray;
use na::{Point3, Vector3};

/// Rays per packet: 4x4 tiles of 4x4 rays.
pub const PACKET_SIZE: usize = 256;
const TOP_LEFT: usize = 0;
const TOP_RIGHT: usize = 51;
const BOTTOM_LEFT: usize = 204;
const BOTTOM_RIGHT: usize = 255;

/// Four outward-facing planes through the packet's corner rays.
struct Frustum {
    origin: Point3<f32>,
    planes: [Vector3<f32>; 4],
    dists: [f32; 4],
}

impl Frustum {
    fn new(packet: &[Ray; PACKET_SIZE]) -> Self {
        let o = packet[TOP_LEFT].origin;
        let corner = |i: usize| packet[i].origin + packet[i].direction;
        let (p0, p1, p2, p3) = (
            corner(TOP_LEFT),
            corner(TOP_RIGHT),
            corner(BOTTOM_LEFT),
            corner(BOTTOM_RIGHT),
        );
        let center = (p0.coords + p1.coords + p2.coords + p3.coords) * 0.25 - o.coords;
        // the winding depends on the camera's handedness; make every normal face out
        let plane = |a: Point3<f32>, b: Point3<f32>| {
            let n = (a - o)
                .cross(&(a - b))
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros);
            if n.dot(&center) > 0.0 {
                -n
            } else {
                n
            }
        };
        let planes = [plane(p0, p2), plane(p3, p1), plane(p1, p0), plane(p2, p3)];
        let dists = planes.map(|n| o.coords.dot(&n));
        Self { origin: o, planes, dists }
    }

    /// True when the box lies entirely outside one of the planes. Only the
    /// box corner nearest to each plane needs testing.
    fn culls(&self, bounds: &BBox) -> bool {
        self.planes.iter().zip(self.dists).any(|(n, d)| {
            let p = Vector3::new(
                if n.x < 0.0 { bounds.max.x } else { bounds.min.x },
                if n.y < 0.0 { bounds.max.y } else { bounds.min.y },
                if n.z < 0.0 { bounds.max.z } else { bounds.min.z },
            );
            p.dot(n) > d
        })
    }

    /// Slab test of one packet ray against a box, using the shared origin.
    fn slab(&self, ray: &Ray, bounds: &BBox) -> Option<f32> {
        let t1 = (bounds.min - self.origin).component_mul(&ray.rd);
        let t2 = (bounds.max - self.origin).component_mul(&ray.rd);
        let tmin = t1.x.min(t2.x).max(t1.y.min(t2.y)).max(t1.z.min(t2.z));
        let tmax = t1.x.max(t2.x).min(t1.y.max(t2.y)).min(t1.z.max(t2.z));
        (tmax >= tmin && tmin < ray.hit.t && tmax >= 0.0).then_some(tmin)
    }

    /// Decides whether the active range `first..=last` visits a child, and
    /// narrows the range to the rays that actually hit it.
    fn visit(&self, packet: &[Ray; PACKET_SIZE], bounds: &BBox, first: usize, last: usize) -> Option<(f32, usize, usize)> {
        let early = self.slab(&packet[first], bounds);
        if let Some(dist) = early {
            return Some((dist, first, last));
        }
        if self.culls(bounds) {
            return None;
        }
        let (dist, first) = (first..=last).find_map(|i| self.slab(&packet[i], bounds).map(|d| (d, i)))?;
        let last = (first..=last)
            .rev()
            .find(|&i| self.slab(&packet[i], bounds).is_some())
            .unwrap_or(first);
        Some((dist, first, last))
    }
}

fn pack(node: u32, first: usize, last: usize) -> u64 {
    (node as u64) << 16 | (first as u64) << 8 | last as u64
}

fn unpack(entry: u64) -> (u32, usize, usize) {
    ((entry >> 16) as u32, ((entry >> 8) & 0xff) as usize, (entry & 0xff) as usize)
}

impl Bvh {
    /// Traces a coherent packet of 256 rays sharing the origin of ray 0,
    /// laid out as 4x4 tiles of 4x4 rays. Each ray's `hit` is updated as
    /// by `intersect`.
    pub fn intersect_256(&self, packet: &mut [Ray; PACKET_SIZE]) {
        if !self.is_built() || self.over_boxes() {
            return;
        }
        let frustum = Frustum::new(packet);
        let mut stack: Vec<u64> = Vec::with_capacity(64);
        let (mut node_idx, mut first, mut last) = (0u32, 0usize, PACKET_SIZE - 1);
        loop {
            let node = &self.nodes[node_idx as usize];
            if node.is_leaf() {
                self.packet_leaf(node, &frustum.origin, &mut packet[first..=last]);
            } else {
                let left = &self.nodes[node.left_first as usize];
                let right = &self.nodes[node.left_first as usize + 1];
                let visit_left = frustum.visit(packet, &left.bounds, first, last);
                let visit_right = frustum.visit(packet, &right.bounds, first, last);
                let next = match (visit_left, visit_right) {
                    (Some(l), Some(r)) => {
                        if l.0 < r.0 {
                            stack.push(pack(node.left_first + 1, r.1, r.2));
                            Some((node.left_first, l.1, l.2))
                        } else {
                            stack.push(pack(node.left_first, l.1, l.2));
                            Some((node.left_first + 1, r.1, r.2))
                        }
                    }
                    (Some(l), None) => Some((node.left_first, l.1, l.2)),
                    (None, Some(r)) => Some((node.left_first + 1, r.1, r.2)),
                    (None, None) => None,
                };
                if let Some((n, f, l)) = next {
                    (node_idx, first, last) = (n, f, l);
                    continue;
                }
            }
            match stack.pop() {
                Some(entry) => (node_idx, first, last) = unpack(entry),
                None => break,
            }
        }
    }

    /// Moller-Trumbore over a leaf for every active ray; the origin-dependent
    /// terms are computed once per triangle.
    fn packet_leaf(&self, node: &BvhNode, origin: &Point3<f32>, rays: &mut [Ray]) {
        for &prim in self.leaf_prims(node) {
            let [v0, v1, v2] = self.triangle(prim);
            let edge1 = v1 - v0;
            let edge2 = v2 - v0;
            let s = origin - v0;
            let q = s.cross(&edge1);
            let tq = edge2.dot(&q);
            for ray in rays.iter_mut() {
                let h = ray.direction.cross(&edge2);
                let a = edge1.dot(&h);
                if a.abs() < 1e-7 {
                    continue;
                }
                let f = 1.0 / a;
                let u = f * s.dot(&h);
                if !(0.0..=1.0).contains(&u) {
                    continue;
                }
                let v = f * ray.direction.dot(&q);
                if v < 0.0 || u + v > 1.0 {
                    continue;
                }
                let t = f * tq;
                if t > 0.0 && t < ray.hit.t {
                    ray.hit.t = t;
                    ray.hit.u = u;
                    ray.hit.v = v;
                    ray.hit.prim = prim;
                }
            }
        }
    }
}
