use super::{CompressedBvh, CompressedNode, TriPayload};
use crate::bvh::bits::{extract_byte, find_msb, popc, sign_extend_s8x4};
use crate::objects::tri_mesh::{intersect_precomputed, moller_trumbore};
use crate::types::ray::Ray;
use na::{Point3, Vector3};

/// Node groups with any bit in the top byte still have children to visit.
const NODE_BITS: u32 = 0x00ff_ffff;

impl CompressedBvh {
    /// Nearest-hit traversal over the compressed layout, following the
    /// stack-of-groups scheme of the GPU kernels. Returns the number of nodes
    /// visited.
    pub fn intersect(&self, ray: &mut Ray) -> u32 {
        let octinv = (7 - ray.octant()) * 0x0101_0101;
        let stride = self.payload.stride();
        let mut stack: Vec<(u32, u32)> = Vec::with_capacity(64);
        // (child base, hit bits | imask) and (triangle base, triangle bits)
        let mut ngroup = (0u32, 0x8000_0000u32);
        let mut tgroup;
        let mut tmax = ray.hit.t;
        let mut best: Option<(f32, f32, u32)> = None;
        let mut steps = 0;
        loop {
            if ngroup.1 > NODE_BITS {
                let hits = ngroup.1;
                let bit = find_msb(hits);
                let base = ngroup.0;
                ngroup.1 &= !(1 << bit);
                if ngroup.1 > NODE_BITS {
                    stack.push(ngroup);
                }
                let slot = (bit - 24) ^ (octinv & 0xff);
                let rel = popc(hits & !(u32::MAX << slot));
                let node = &self.nodes[(base + rel) as usize];
                steps += 1;
                let hitmask = child_hits(node, ray, octinv, tmax);
                ngroup = (node.child_base, (hitmask & 0xff00_0000) | node.imask as u32);
                tgroup = (node.tri_base, hitmask & NODE_BITS);
            } else {
                tgroup = ngroup;
                ngroup = (0, 0);
            }
            while tgroup.1 != 0 {
                let idx = find_msb(tgroup.1);
                let addr = (tgroup.0 + idx * stride) as usize;
                if let Some((t, u, v)) = self.test_triangle(ray, addr, tmax) {
                    tmax = t;
                    best = Some((u, v, self.prim_at(addr as u32)));
                }
                tgroup.1 &= !(1 << idx);
            }
            if ngroup.1 <= NODE_BITS {
                match stack.pop() {
                    Some(group) => ngroup = group,
                    None => break,
                }
            }
        }
        if let Some((u, v, prim)) = best {
            ray.hit.t = tmax;
            ray.hit.u = u;
            ray.hit.v = v;
            ray.hit.prim = prim;
        }
        steps
    }

    pub fn is_occluded(&self, ray: &Ray) -> bool {
        let mut shadow = *ray;
        self.intersect(&mut shadow);
        shadow.hit.t < ray.hit.t
    }

    fn test_triangle(&self, ray: &Ray, addr: usize, tmax: f32) -> Option<(f32, f32, f32)> {
        match self.payload {
            TriPayload::Raw => {
                let block = |i: usize| {
                    let b = self.tris[addr + i];
                    Point3::new(b[0], b[1], b[2])
                };
                moller_trumbore(ray, &block(0), &block(1), &block(2)).filter(|&(t, _, _)| t > 0.0 && t < tmax)
            }
            TriPayload::Precomputed => {
                let rows: &[f32] = bytemuck::cast_slice(&self.tris[addr..addr + 3]);
                intersect_precomputed(ray, rows, tmax)
            }
        }
    }
}

/// Slab-tests the eight quantized child boxes of `node` and returns the
/// combined hit mask: interior children in the top byte, at bit positions
/// permuted by the ray octant, and leaf triangles in the low 24 bits.
fn child_hits(node: &CompressedNode, ray: &Ray, octinv: u32, tmax: f32) -> u32 {
    let scale = node.scale();
    let adj = scale.component_mul(&ray.rd);
    let orig = (node.origin() - ray.origin).component_mul(&ray.rd);
    let mut hitmask = 0;
    for half in 0..2 {
        let m = &node.meta[half * 4..half * 4 + 4];
        let meta4 = u32::from_le_bytes([m[0], m[1], m[2], m[3]]);
        let is_inner4 = (meta4 & (meta4 << 1)) & 0x1010_1010;
        let inner_mask4 = sign_extend_s8x4(is_inner4 << 3);
        let bit_index4 = (meta4 ^ (octinv & inner_mask4)) & 0x1f1f_1f1f;
        let child_bits4 = (meta4 >> 5) & 0x0707_0707;
        for i in 0..4u32 {
            let slot = half * 4 + i as usize;
            let (mut lo, mut hi) = (node.qlo(slot), node.qhi(slot));
            for a in 0..3 {
                if ray.rd[a] < 0.0 {
                    std::mem::swap(&mut lo[a], &mut hi[a]);
                }
            }
            let tlo: Vector3<f32> = lo.component_mul(&adj) + orig;
            let thi: Vector3<f32> = hi.component_mul(&adj) + orig;
            let cmin = tlo.x.max(tlo.y).max(tlo.z).max(0.0);
            let cmax = thi.x.min(thi.y).min(thi.z).min(tmax);
            if cmin <= cmax {
                hitmask |= extract_byte(child_bits4, i) << extract_byte(bit_index4, i);
            }
        }
    }
    hitmask
}

#[cfg(test)]
mod tests {
    use crate::bvh::compressed::{CompressedBvh, TriPayload};
    use crate::bvh::wide::Bvh8;
    use crate::bvh::Bvh;
    use crate::types::ray::Ray;
    use na::{Point3, Vector3};

    fn cubes() -> Vec<Point3<f32>> {
        let mut verts = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                for k in 0..3 {
                    let o = Vector3::new(i as f32 * 2.0, j as f32 * 2.0, k as f32 * 2.0);
                    verts.push(Point3::new(0.0, 0.0, 0.0) + o);
                    verts.push(Point3::new(1.0, 0.1, 0.3) + o);
                    verts.push(Point3::new(0.2, 1.0, 0.6) + o);
                }
            }
        }
        verts
    }

    fn check(payload: TriPayload) {
        let mut bvh = Bvh::new();
        bvh.build(&cubes()).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        let cw = CompressedBvh::convert_from(&mut wide, payload).unwrap();
        let dirs = [
            Vector3::new(0.3, 0.4, 1.0),
            Vector3::new(-0.3, 0.4, 1.0),
            Vector3::new(0.3, -0.4, -1.0),
            Vector3::new(-0.2, -0.1, -1.0),
        ];
        let mut hits = 0;
        for (n, dir) in dirs.iter().enumerate() {
            for i in 0..40 {
                let z = if dir.z > 0.0 { -3.0 } else { 8.0 };
                let origin = Point3::new(i as f32 * 0.3, 5.0 + n as f32 * 0.7, z);
                let mut a = Ray::new(origin, *dir);
                let mut b = a;
                bvh.intersect(&mut a);
                cw.intersect(&mut b);
                assert_eq!(a.hit.is_hit(), b.hit.is_hit(), "ray {n}/{i}");
                if a.hit.is_hit() {
                    hits += 1;
                    assert!((a.hit.t - b.hit.t).abs() < 1e-4, "ray {n}/{i}");
                    assert_eq!(a.hit.prim, b.hit.prim);
                }
            }
        }
        assert!(hits > 0);
    }

    #[test]
    fn raw_payload_matches_binary() {
        check(TriPayload::Raw);
    }

    #[test]
    fn precomputed_payload_matches_binary() {
        check(TriPayload::Precomputed);
    }

    #[test]
    fn miss_leaves_ray_alone() {
        let mut bvh = Bvh::new();
        bvh.build(&cubes()).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        let cw = CompressedBvh::convert_from(&mut wide, TriPayload::Raw).unwrap();
        let mut ray = Ray::new(Point3::new(-5.0, -5.0, -5.0), Vector3::new(-1.0, 0.0, 0.0));
        let before = ray.hit;
        assert!(cw.intersect(&mut ray) >= 1);
        assert_eq!(ray.hit, before);
        assert!(!cw.is_occluded(&ray));
    }
}
