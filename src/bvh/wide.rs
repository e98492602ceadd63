use crate::bvh::bbox::BBox;
use crate::bvh::Bvh;
use crate::error::{BvhError, Result};
use crate::objects::tri_mesh::intersect_tri;
use crate::types::ray::Ray;
use crate::types::vector::BVH_FAR;
use na::Point3;
use std::borrow::Borrow;
use std::time::Instant;

/// Node of an 8-wide tree. A leaf iff `tri_count > 0`; a child index of 0
/// marks an empty slot, which is safe because the root is never a child.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WideNode {
    pub bounds: BBox,
    pub child: [u32; 8],
    pub child_count: u32,
    pub first_tri: u32,
    pub tri_count: u32,
}

impl WideNode {
    pub fn zeroed() -> Self {
        Self {
            bounds: BBox {
                min: Point3::origin(),
                max: Point3::origin(),
            },
            child: [0; 8],
            child_count: 0,
            first_tri: 0,
            tri_count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }
}

/// 8-wide tree collapsed from a binary [`Bvh`]. The source supplies the
/// vertices and primitive indices and is either owned (`Bvh8<Bvh>`) or
/// borrowed (`Bvh8<&Bvh>`).
#[derive(Debug)]
pub struct Bvh8<B: Borrow<Bvh> = Bvh> {
    source: B,
    pub(crate) nodes: Vec<WideNode>,
}

impl<B: Borrow<Bvh>> Bvh8<B> {
    /// Mirrors the binary tree, then lets every node adopt the children of its
    /// largest interior children until it holds up to eight.
    pub fn convert_from(source: B) -> Result<Self> {
        let bvh = source.borrow();
        if !bvh.is_built() {
            return Err(BvhError::EmptyInput);
        }
        let now = Instant::now();
        let mut nodes = Vec::with_capacity((bvh.used_nodes() as usize).max(bvh.tri_count() as usize * 2));
        nodes.resize(bvh.used_nodes() as usize, WideNode::zeroed());
        for (i, orig) in bvh.nodes().iter().enumerate() {
            if i == 1 {
                continue;
            }
            let node = &mut nodes[i];
            node.bounds = orig.bounds;
            if orig.is_leaf() {
                node.tri_count = orig.tri_count;
                node.first_tri = orig.left_first;
            } else {
                node.child[0] = orig.left_first;
                node.child[1] = orig.left_first + 1;
                node.child_count = 2;
            }
        }

        let mut stack = vec![0u32];
        while let Some(node_idx) = stack.pop() {
            let mut node = nodes[node_idx as usize];
            while node.child_count < 8 {
                let mut best: Option<usize> = None;
                let mut best_area = 0.0;
                for (i, &c) in node.child[..node.child_count as usize].iter().enumerate() {
                    let child = &nodes[c as usize];
                    if !child.is_leaf() && node.child_count - 1 + child.child_count <= 8 {
                        let area = child.bounds.get_surface_area();
                        if area > best_area {
                            best = Some(i);
                            best_area = area;
                        }
                    }
                }
                let Some(best) = best else {
                    break;
                };
                let child = nodes[node.child[best] as usize];
                node.child[best] = child.child[0];
                for &grandchild in &child.child[1..child.child_count as usize] {
                    node.child[node.child_count as usize] = grandchild;
                    node.child_count += 1;
                }
            }
            nodes[node_idx as usize] = node;
            for &c in &node.child[..node.child_count as usize] {
                if !nodes[c as usize].is_leaf() {
                    stack.push(c);
                }
            }
        }
        log::trace!("collapsed {} binary nodes in {:?}", nodes.len(), now.elapsed());
        Ok(Self { source, nodes })
    }

    pub fn source(&self) -> &Bvh {
        self.source.borrow()
    }

    pub fn into_source(self) -> B {
        self.source
    }

    /// Node pool. Nodes orphaned by the collapse remain as unreachable entries.
    pub fn nodes(&self) -> &[WideNode] {
        &self.nodes
    }

    pub fn used_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Turns a leaf with more than `max_prims` primitives into an interior
    /// node with up to eight leaf children. The first child keeps the
    /// remainder and is split again if it is still too full.
    pub fn split_leaf(&mut self, node_idx: u32, max_prims: u32) {
        let max_prims = max_prims.max(1);
        let node = self.nodes[node_idx as usize];
        if node.tri_count <= max_prims {
            return;
        }
        let mut children = [0u32; 8];
        let mut counts = [(node.first_tri, node.tri_count); 8];
        let mut child_count = 1;
        while counts[0].1 > max_prims && child_count < 8 {
            counts[0].1 -= max_prims;
            counts[child_count] = (counts[0].0 + counts[0].1, max_prims);
            child_count += 1;
        }
        let bvh = self.source.borrow();
        for i in 0..child_count {
            let (first_tri, tri_count) = counts[i];
            let bounds = if bvh.is_refittable() {
                bvh.tri_idx[first_tri as usize..(first_tri + tri_count) as usize]
                    .iter()
                    .fold(BBox::empty(), |b, &p| b.merge(&bvh.fragments[p as usize].bounds()))
            } else {
                node.bounds
            };
            children[i] = self.nodes.len() as u32;
            self.nodes.push(WideNode {
                bounds,
                first_tri,
                tri_count,
                ..WideNode::zeroed()
            });
        }
        let node = &mut self.nodes[node_idx as usize];
        node.child = children;
        node.child_count = child_count as u32;
        node.tri_count = 0;
        if counts[0].1 > max_prims {
            self.split_leaf(children[0], max_prims);
        }
    }

    /// Nearest-hit traversal; returns the number of nodes visited.
    pub fn intersect(&self, ray: &mut Ray) -> u32 {
        let bvh = self.source();
        if bvh.over_boxes() {
            return 0;
        }
        let mut stack: Vec<u32> = Vec::with_capacity(128);
        let mut node_idx = 0u32;
        let mut steps = 0;
        loop {
            steps += 1;
            let node = &self.nodes[node_idx as usize];
            if node.is_leaf() {
                let first = node.first_tri as usize;
                for &prim in &bvh.tri_idx[first..first + node.tri_count as usize] {
                    let [v0, v1, v2] = bvh.triangle(prim);
                    intersect_tri(ray, &v0, &v1, &v2, prim);
                }
            } else {
                for &c in node.child.iter().filter(|&&c| c != 0) {
                    if self.nodes[c as usize].bounds.intersect(ray) < BVH_FAR {
                        stack.push(c);
                    }
                }
            }
            match stack.pop() {
                Some(next) => node_idx = next,
                None => break,
            }
        }
        steps
    }

    pub fn is_occluded(&self, ray: &Ray) -> bool {
        let mut shadow = *ray;
        self.intersect(&mut shadow);
        shadow.hit.t < ray.hit.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::{BuildKind, BvhNode};
    use na::Vector3;

    fn leaf(min: Point3<f32>, first: u32, count: u32) -> BvhNode {
        BvhNode {
            bounds: BBox::new(min, min + Vector3::new(1.0, 1.0, 1.0)),
            left_first: first,
            tri_count: count,
        }
    }

    fn interior(min: Point3<f32>, max: Point3<f32>, left: u32) -> BvhNode {
        BvhNode {
            bounds: BBox::new(min, max),
            left_first: left,
            tri_count: 0,
        }
    }

    /// Root over two interior children of identical size, each with two leaves.
    fn twin_tree() -> Bvh {
        let mut bvh = Bvh::new();
        bvh.nodes = vec![
            interior(Point3::new(0.0, 0.0, 0.0), Point3::new(7.0, 1.0, 1.0), 2),
            BvhNode::zeroed(),
            interior(Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0), 4),
            interior(Point3::new(4.0, 0.0, 0.0), Point3::new(7.0, 1.0, 1.0), 6),
            leaf(Point3::new(0.0, 0.0, 0.0), 0, 1),
            leaf(Point3::new(2.0, 0.0, 0.0), 1, 1),
            leaf(Point3::new(4.0, 0.0, 0.0), 2, 1),
            leaf(Point3::new(6.0, 0.0, 0.0), 3, 1),
        ];
        bvh.tri_idx = vec![0, 1, 2, 3];
        bvh.used_nodes = 8;
        bvh.tri_count = 4;
        bvh.idx_count = 4;
        bvh.kind = BuildKind::Sah;
        bvh
    }

    #[test]
    fn equal_areas_adopt_first_child() {
        let wide = Bvh8::convert_from(twin_tree()).unwrap();
        let root = wide.nodes()[0];
        assert_eq!(root.child_count, 4);
        // left twin (2) is absorbed first, so its right leaf lands in slot 2
        assert_eq!(&root.child[..4], &[4, 6, 5, 7]);
    }

    #[test]
    fn split_leaf_caps_primitives() {
        let mut bvh = Bvh::new();
        let verts: Vec<Point3<f32>> = (0..11)
            .flat_map(|i| {
                let x = i as f32;
                [
                    Point3::new(x, 0.0, 0.0),
                    Point3::new(x + 0.5, 0.0, 0.0),
                    Point3::new(x, 0.5, 0.0),
                ]
            })
            .collect();
        bvh.build(&verts).unwrap();
        let mut wide = Bvh8::convert_from(&bvh).unwrap();
        // force a fat leaf by hand: the root's first child holds ten primitives
        let fat = wide.nodes[0].child[0];
        wide.nodes[fat as usize] = WideNode {
            bounds: bvh.bounds(),
            first_tri: 0,
            tri_count: 10,
            ..WideNode::zeroed()
        };
        wide.split_leaf(fat, 3);
        let node = wide.nodes()[fat as usize];
        assert!(!node.is_leaf());
        assert_eq!(node.child_count, 4);
        let counts: Vec<(u32, u32)> = node.child[..4]
            .iter()
            .map(|&c| (wide.nodes()[c as usize].first_tri, wide.nodes()[c as usize].tri_count))
            .collect();
        assert_eq!(counts, vec![(0, 1), (7, 3), (4, 3), (1, 3)]);
        // refittable source: child bounds come from the primitives themselves
        for &c in &node.child[..4] {
            let child = wide.nodes()[c as usize];
            assert!(bvh.bounds().contains(&child.bounds, 1e-6));
        }
    }

    #[test]
    fn wide_matches_binary() {
        let verts: Vec<Point3<f32>> = (0..64)
            .flat_map(|i| {
                let (x, y) = ((i % 8) as f32, (i / 8) as f32);
                let z = (i % 5) as f32 * 0.3;
                [
                    Point3::new(x, y, z),
                    Point3::new(x + 0.9, y, z),
                    Point3::new(x, y + 0.9, z + 0.2),
                ]
            })
            .collect();
        let mut bvh = Bvh::new();
        bvh.build(&verts).unwrap();
        let wide = Bvh8::convert_from(&bvh).unwrap();
        assert!(wide.nodes()[0].child_count > 2);
        for i in 0..32 {
            let origin = Point3::new(i as f32 * 0.25, 3.3, -5.0);
            let mut a = Ray::new(origin, Vector3::new(0.01, 0.02, 1.0));
            let mut b = a;
            bvh.intersect(&mut a);
            wide.intersect(&mut b);
            assert_eq!(a.hit.t, b.hit.t);
            assert_eq!(a.hit.prim, b.hit.prim);
        }
    }
}
