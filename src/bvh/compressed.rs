mod trace;

use crate::bvh::bbox::BBox;
use crate::bvh::bits::popc;
use crate::bvh::wide::Bvh8;
use crate::bvh::Bvh;
use crate::error::{BvhError, Result};
use crate::objects::tri_mesh::precompute_triangle;
use crate::types::vector::{exp2i, BVH_FAR};
use bytemuck::{Pod, Zeroable};
use na::{Point3, Vector3};
use serde::Deserialize;
use std::borrow::Borrow;
use std::time::Instant;

/// Leaves must hold at most this many triangles to fit the unary count.
pub const MAX_LEAF_TRIS: u32 = 3;

/// One compressed 8-wide node: five 16-byte blocks, laid out exactly as
/// the GPU traversal kernels read them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CompressedNode {
    pub origin: [f32; 3],
    pub exponents: [i8; 3],
    /// Bit `i` set iff slot `i` holds an interior child.
    pub imask: u8,
    pub child_base: u32,
    pub tri_base: u32,
    pub meta: [u8; 8],
    pub qlo_x: [u8; 8],
    pub qlo_y: [u8; 8],
    pub qlo_z: [u8; 8],
    pub qhi_x: [u8; 8],
    pub qhi_y: [u8; 8],
    pub qhi_z: [u8; 8],
}

impl CompressedNode {
    pub fn origin(&self) -> Point3<f32> {
        Point3::from(self.origin)
    }

    /// Size of one quantization step along each axis.
    pub fn scale(&self) -> Vector3<f32> {
        Vector3::new(
            exp2i(self.exponents[0] as i32),
            exp2i(self.exponents[1] as i32),
            exp2i(self.exponents[2] as i32),
        )
    }

    pub fn qlo(&self, slot: usize) -> Vector3<f32> {
        Vector3::new(self.qlo_x[slot] as f32, self.qlo_y[slot] as f32, self.qlo_z[slot] as f32)
    }

    pub fn qhi(&self, slot: usize) -> Vector3<f32> {
        Vector3::new(self.qhi_x[slot] as f32, self.qhi_y[slot] as f32, self.qhi_z[slot] as f32)
    }

    /// Dequantized bounds of a slot.
    pub fn child_bounds(&self, slot: usize) -> BBox {
        let o = self.origin();
        let s = self.scale();
        BBox {
            min: o + self.qlo(slot).component_mul(&s),
            max: o + self.qhi(slot).component_mul(&s),
        }
    }

    fn quantize(&mut self, slot: usize, bounds: &BBox) {
        let o = self.origin();
        let s = self.scale();
        let lo = (bounds.min - o).component_div(&s).map(|q| q.floor().clamp(0.0, 255.0) as u8);
        let hi = (bounds.max - o).component_div(&s).map(|q| q.ceil().clamp(0.0, 255.0) as u8);
        self.qlo_x[slot] = lo.x;
        self.qlo_y[slot] = lo.y;
        self.qlo_z[slot] = lo.z;
        self.qhi_x[slot] = hi.x;
        self.qhi_y[slot] = hi.y;
        self.qhi_z[slot] = hi.z;
    }
}

/// Smallest power-of-two exponent whose 255 steps cover `extent`.
fn quant_exponent(extent: f32) -> i8 {
    let mut e = if extent > 0.0 {
        (extent / 255.0).log2().ceil() as i32
    } else {
        -126
    };
    e = e.clamp(-126, 127);
    while e < 127 && extent / exp2i(e) > 255.0 {
        e += 1;
    }
    e as i8
}

/// Triangle storage of a compressed tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriPayload {
    /// `v0, v1, v2`, with the primitive index in the bits of `v0.w`.
    #[default]
    Raw,
    /// Baldwin-Weber rows plus a block whose `w` holds the primitive index.
    Precomputed,
}

impl TriPayload {
    /// Blocks of `[f32; 4]` per triangle.
    pub fn stride(self) -> u32 {
        match self {
            TriPayload::Raw => 3,
            TriPayload::Precomputed => 4,
        }
    }
}

/// Decoded slot of a compressed node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Interior { slot: u8, node: u32 },
    Leaf { slot: u8, first_block: u32, count: u32 },
}

/// Compressed wide BVH (CWBVH): quantized 8-wide nodes plus a triangle
/// payload. Self-contained; the source trees are not needed for tracing.
#[derive(Clone, Debug)]
pub struct CompressedBvh {
    pub(crate) nodes: Vec<CompressedNode>,
    pub(crate) tris: Vec<[f32; 4]>,
    payload: TriPayload,
}

impl CompressedBvh {
    /// Encodes a wide tree. Leaves with more than three primitives are split
    /// first and every node's children are reordered into octant slots, so
    /// `wide` is modified along the way.
    pub fn convert_from<B: Borrow<Bvh>>(wide: &mut Bvh8<B>, payload: TriPayload) -> Result<Self> {
        if wide.nodes.first().map_or(true, |n| n.is_leaf()) {
            return Err(BvhError::RootIsLeaf);
        }
        if wide.source().over_boxes() {
            return Err(BvhError::UnsupportedLayout);
        }
        let now = Instant::now();
        let mut nodes = vec![CompressedNode::zeroed()];
        let mut tris: Vec<[f32; 4]> = Vec::with_capacity(wide.source().tri_indices().len() * payload.stride() as usize);
        let mut stack: Vec<(u32, u32)> = vec![(0, 0)];
        while let Some((wide_idx, addr)) = stack.pop() {
            for i in 0..8 {
                let c = wide.nodes[wide_idx as usize].child[i];
                if c != 0 && wide.nodes[c as usize].tri_count > MAX_LEAF_TRIS {
                    wide.split_leaf(c, MAX_LEAF_TRIS);
                }
            }
            let ordered = order_children(wide, wide_idx);
            wide.nodes[wide_idx as usize].child = ordered;

            let node = wide.nodes[wide_idx as usize];
            let extent = node.bounds.extent();
            let mut out = CompressedNode {
                origin: [node.bounds.min.x, node.bounds.min.y, node.bounds.min.z],
                exponents: [quant_exponent(extent.x), quant_exponent(extent.y), quant_exponent(extent.z)],
                ..CompressedNode::zeroed()
            };
            let mut interior = 0;
            let mut leaf_tris = 0u32;
            for (slot, &c) in node.child.iter().enumerate() {
                if c == 0 {
                    continue;
                }
                let child = wide.nodes[c as usize];
                out.quantize(slot, &child.bounds);
                if !child.is_leaf() {
                    let child_addr = nodes.len() as u32;
                    nodes.push(CompressedNode::zeroed());
                    if interior == 0 {
                        out.child_base = child_addr;
                    }
                    interior += 1;
                    out.imask |= 1 << slot;
                    out.meta[slot] = (1 << 5) | (24 + slot as u8);
                    stack.push((c, child_addr));
                    continue;
                }
                let count = child.tri_count.min(MAX_LEAF_TRIS);
                if leaf_tris == 0 {
                    out.tri_base = tris.len() as u32;
                }
                out.meta[slot] = ((((1u32 << count) - 1) << 5) | leaf_tris) as u8;
                leaf_tris += count;
                let source = wide.source();
                for j in 0..count {
                    let prim = source.tri_idx[(child.first_tri + j) as usize];
                    push_triangle(&mut tris, source, prim, payload);
                }
            }
            nodes[addr as usize] = out;
        }
        log::trace!(
            "compressed into {} nodes and {} triangle blocks in {:?}",
            nodes.len(),
            tris.len(),
            now.elapsed()
        );
        Ok(Self { nodes, tris, payload })
    }

    pub fn payload(&self) -> TriPayload {
        self.payload
    }

    pub fn nodes(&self) -> &[CompressedNode] {
        &self.nodes
    }

    pub fn tris(&self) -> &[[f32; 4]] {
        &self.tris
    }

    /// World bounds of the whole tree, from the root's quantized child boxes.
    /// At least as large as the source tree's root box.
    pub fn bounds(&self) -> BBox {
        let Some(root) = self.nodes.first() else {
            return BBox::empty();
        };
        (0..8)
            .filter(|&slot| root.meta[slot] != 0)
            .fold(BBox::empty(), |acc, slot| acc.merge(&root.child_bounds(slot)))
    }

    pub fn nodes_as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn tris_as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.tris)
    }

    /// Primitive index stored with the triangle starting at `block`.
    pub fn prim_at(&self, block: u32) -> u32 {
        let b = block as usize;
        match self.payload {
            TriPayload::Raw => self.tris[b][3].to_bits(),
            TriPayload::Precomputed => self.tris[b + 3][3].to_bits(),
        }
    }

    /// Decodes the occupied slots of a node.
    pub fn children(&self, node_idx: u32) -> Vec<ChildRef> {
        let node = &self.nodes[node_idx as usize];
        let mut out = Vec::with_capacity(8);
        for slot in 0..8u8 {
            let meta = node.meta[slot as usize];
            if meta == 0 {
                continue;
            }
            if node.imask & (1 << slot) != 0 {
                let below = node.imask as u32 & ((1 << slot) - 1);
                out.push(ChildRef::Interior {
                    slot,
                    node: node.child_base + popc(below),
                });
            } else {
                let count = ((meta >> 5) as u32).count_ones();
                let offset = (meta & 0x1f) as u32;
                out.push(ChildRef::Leaf {
                    slot,
                    first_block: node.tri_base + offset * self.payload.stride(),
                    count,
                });
            }
        }
        out
    }
}

/// Greedy slot assignment: a child whose centroid lies towards octant `s`
/// of the node goes to slot `s`, so the traversal can visit slots in ray
/// octant order.
fn order_children<B: Borrow<Bvh>>(wide: &Bvh8<B>, node_idx: u32) -> [u32; 8] {
    let node = &wide.nodes[node_idx as usize];
    let centroid = node.bounds.centroid();
    let mut cost = [[BVH_FAR; 8]; 8];
    for (s, row) in cost.iter_mut().enumerate() {
        let ds = Vector3::new(
            if s & 4 != 0 { -1.0 } else { 1.0 },
            if s & 2 != 0 { -1.0 } else { 1.0 },
            if s & 1 != 0 { -1.0 } else { 1.0 },
        );
        for (i, &c) in node.child.iter().enumerate() {
            if c != 0 {
                let child = &wide.nodes[c as usize];
                row[i] = (child.bounds.centroid() - centroid).dot(&ds);
            }
        }
    }
    let mut assignment: [Option<usize>; 8] = [None; 8];
    let mut slot_free = [true; 8];
    loop {
        let mut best: Option<(usize, usize)> = None;
        let mut min_cost = BVH_FAR;
        for s in 0..8 {
            for i in 0..8 {
                if assignment[i].is_none() && slot_free[s] && cost[s][i] < min_cost {
                    min_cost = cost[s][i];
                    best = Some((s, i));
                }
            }
        }
        let Some((s, i)) = best else {
            break;
        };
        slot_free[s] = false;
        assignment[i] = Some(s);
    }
    for a in assignment.iter_mut().filter(|a| a.is_none()) {
        if let Some(s) = slot_free.iter().position(|&f| f) {
            slot_free[s] = false;
            *a = Some(s);
        }
    }
    let mut ordered = [0u32; 8];
    for (i, a) in assignment.iter().enumerate() {
        if let Some(s) = a {
            ordered[*s] = node.child[i];
        }
    }
    ordered
}

fn push_triangle(tris: &mut Vec<[f32; 4]>, source: &Bvh, prim: u32, payload: TriPayload) {
    let [v0, v1, v2] = source.triangle(prim);
    let prim_bits = f32::from_bits(prim);
    match payload {
        TriPayload::Raw => {
            tris.push([v0.x, v0.y, v0.z, prim_bits]);
            tris.push([v1.x, v1.y, v1.z, 0.0]);
            tris.push([v2.x, v2.y, v2.z, 0.0]);
        }
        TriPayload::Precomputed => {
            let t = precompute_triangle(&v0, &v1, &v2);
            tris.push([t[0], t[1], t[2], t[3]]);
            tris.push([t[4], t[5], t[6], t[7]]);
            tris.push([t[8], t[9], t[10], t[11]]);
            tris.push([0.0, 0.0, 0.0, prim_bits]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Vec<Point3<f32>> {
        (0..200)
            .flat_map(|i| {
                let (x, y, z) = ((i % 10) as f32, ((i / 10) % 5) as f32, (i / 50) as f32 * 1.5);
                [
                    Point3::new(x, y, z),
                    Point3::new(x + 0.8, y + 0.1, z),
                    Point3::new(x + 0.2, y + 0.7, z + 0.4),
                ]
            })
            .collect()
    }

    #[test]
    fn node_is_eighty_bytes() {
        assert_eq!(std::mem::size_of::<CompressedNode>(), 80);
        assert_eq!(std::mem::offset_of!(CompressedNode, child_base), 16);
        assert_eq!(std::mem::offset_of!(CompressedNode, meta), 24);
        assert_eq!(std::mem::offset_of!(CompressedNode, qlo_x), 32);
        assert_eq!(std::mem::offset_of!(CompressedNode, qhi_z), 72);
    }

    #[test]
    fn exponent_covers_extent() {
        for extent in [0.0, 1e-30, 0.5, 1.0, 255.0, 256.0, 1e6] {
            let e = quant_exponent(extent);
            assert!(extent / exp2i(e as i32) <= 255.0, "extent {extent} e {e}");
        }
        assert_eq!(quant_exponent(255.0), 0);
        assert_eq!(quant_exponent(256.0), 1);
    }

    #[test]
    fn rejects_leaf_root() {
        let mut bvh = Bvh::new();
        bvh.build(&scene()[..3]).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        assert!(matches!(
            CompressedBvh::convert_from(&mut wide, TriPayload::Raw),
            Err(BvhError::RootIsLeaf)
        ));
    }

    #[test]
    fn rejects_box_tree() {
        let boxes: Vec<BBox> = (0..16)
            .map(|i| {
                let p = Point3::new(i as f32, (i % 4) as f32, 0.0);
                BBox::new(p, p + Vector3::new(0.5, 0.5, 0.5))
            })
            .collect();
        let mut bvh = Bvh::new();
        bvh.build_over_boxes(&boxes).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        assert!(matches!(
            CompressedBvh::convert_from(&mut wide, TriPayload::Raw),
            Err(BvhError::UnsupportedLayout)
        ));
    }

    #[test]
    fn quantized_children_contain_originals() {
        let mut bvh = Bvh::new();
        bvh.build(&scene()).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        let cw = CompressedBvh::convert_from(&mut wide, TriPayload::Raw).unwrap();
        assert_eq!(cw.nodes_as_bytes().len(), cw.nodes().len() * 80);
        assert_eq!(cw.tris().len(), 200 * 3);
        let mut stack = vec![(0u32, 0u32)];
        while let Some((w, c)) = stack.pop() {
            let wnode = wide.nodes()[w as usize];
            let cnode = cw.nodes()[c as usize];
            let children = cw.children(c);
            assert_eq!(children.len() as u32, wnode.child.iter().filter(|&&x| x != 0).count() as u32);
            for child in children {
                let slot = match child {
                    ChildRef::Interior { slot, node } => {
                        stack.push((wnode.child[slot as usize], node));
                        slot
                    }
                    ChildRef::Leaf { slot, count, .. } => {
                        assert_eq!(count, wide.nodes()[wnode.child[slot as usize] as usize].tri_count);
                        slot
                    }
                };
                let orig = wide.nodes()[wnode.child[slot as usize] as usize].bounds;
                assert!(cnode.child_bounds(slot as usize).contains(&orig, 1e-4));
            }
        }
    }
}
