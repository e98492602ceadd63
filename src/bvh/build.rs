use crate::bvh::bbox::BBox;
use crate::bvh::{BuildKind, Bvh, BvhNode, Fragment, BINS, C_INT, C_TRAV};
use crate::error::{BvhError, Result};
use crate::types::vector::BVH_FAR;
use na::{Point3, Vector3};
use std::time::Instant;

/// Prefix and suffix totals of one axis worth of bins.
pub(crate) struct Sweep {
    pub cost: [f32; BINS - 1],
    pub left: [BBox; BINS - 1],
    pub right: [BBox; BINS - 1],
    pub left_count: [u32; BINS - 1],
    pub right_count: [u32; BINS - 1],
}

impl Sweep {
    /// Plane `i` separates bins `0..=i` from bins `i + 1..`. Left totals use
    /// `count_in` and right totals use `count_out`, which differ only when
    /// fragments straddle bins.
    pub fn new(bins: &[BBox; BINS], count_in: &[u32; BINS], count_out: &[u32; BINS], rsav: f32) -> Self {
        let mut sweep = Self {
            cost: [BVH_FAR; BINS - 1],
            left: [BBox::empty(); BINS - 1],
            right: [BBox::empty(); BINS - 1],
            left_count: [0; BINS - 1],
            right_count: [0; BINS - 1],
        };
        let mut anl = [0.0; BINS - 1];
        let mut anr = [0.0; BINS - 1];
        let (mut lb, mut rb) = (BBox::empty(), BBox::empty());
        let (mut ln, mut rn) = (0u32, 0u32);
        for i in 0..BINS - 1 {
            let j = BINS - 2 - i;
            lb = lb.merge(&bins[i]);
            rb = rb.merge(&bins[BINS - 1 - i]);
            ln += count_in[i];
            rn += count_out[BINS - 1 - i];
            sweep.left[i] = lb;
            sweep.right[j] = rb;
            sweep.left_count[i] = ln;
            sweep.right_count[j] = rn;
            anl[i] = if ln == 0 { BVH_FAR } else { lb.half_area() * ln as f32 };
            anr[j] = if rn == 0 { BVH_FAR } else { rb.half_area() * rn as f32 };
        }
        for i in 0..BINS - 1 {
            sweep.cost[i] = C_TRAV + C_INT * rsav * (anl[i] + anr[i]);
        }
        sweep
    }
}

/// Cheapest object split found for a node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ObjectSplit {
    pub axis: usize,
    pub pos: usize,
    pub cost: f32,
    pub left: BBox,
    pub right: BBox,
}

/// Bin of a fragment centroid along `axis`, clamped to the bin range.
pub(crate) fn centroid_bin(frag: &Fragment, axis: usize, nmin: f32, rpd: f32) -> usize {
    (((frag.centroid(axis) - nmin) * rpd) as i32).clamp(0, BINS as i32 - 1) as usize
}

/// Bins the centroids of `indices` into `BINS` bins per axis and sweeps every
/// axis wider than `min_dim`. Ties keep the earlier axis and plane.
pub(crate) fn find_object_split(
    fragments: &[Fragment],
    indices: &[u32],
    bounds: &BBox,
    min_dim: &Vector3<f32>,
) -> ObjectSplit {
    let mut bins = [[BBox::empty(); BINS]; 3];
    let mut count = [[0u32; BINS]; 3];
    let extent = bounds.extent();
    let rpd = Vector3::new(BINS as f32 / extent.x, BINS as f32 / extent.y, BINS as f32 / extent.z);
    for &fi in indices {
        let frag = &fragments[fi as usize];
        let fb = frag.bounds();
        for a in 0..3 {
            let b = centroid_bin(frag, a, bounds.min[a], rpd[a]);
            bins[a][b] = bins[a][b].merge(&fb);
            count[a][b] += 1;
        }
    }

    let rsav = 1.0 / bounds.half_area();
    let mut best = ObjectSplit {
        axis: 0,
        pos: 0,
        cost: BVH_FAR,
        left: BBox::empty(),
        right: BBox::empty(),
    };
    for a in 0..3 {
        if extent[a] <= min_dim[a] {
            continue;
        }
        let sweep = Sweep::new(&bins[a], &count[a], &count[a], rsav);
        for i in 0..BINS - 1 {
            if sweep.cost[i] < best.cost {
                best = ObjectSplit {
                    axis: a,
                    pos: i,
                    cost: sweep.cost[i],
                    left: sweep.left[i],
                    right: sweep.right[i],
                };
            }
        }
    }
    best
}

impl Bvh {
    /// Binned SAH build over a triangle soup: three consecutive vertices per triangle.
    pub fn build(&mut self, vertices: &[Point3<f32>]) -> Result<()> {
        let now = Instant::now();
        self.load_triangles(vertices, 2, 0)?;
        self.subdivide_sah();
        self.finish(BuildKind::Sah, true);
        log::debug!(
            "SAH build: {} triangles, {} nodes in {:?}",
            self.tri_count,
            self.used_nodes,
            now.elapsed()
        );
        Ok(())
    }

    /// Midpoint build: splits the longest axis in half until nothing separates.
    /// Fast to build, slower to traverse.
    pub fn build_quick(&mut self, vertices: &[Point3<f32>]) -> Result<()> {
        let now = Instant::now();
        self.load_triangles(vertices, 2, 0)?;
        self.subdivide_midpoint();
        self.finish(BuildKind::Quick, true);
        log::debug!(
            "quick build: {} triangles, {} nodes in {:?}",
            self.tri_count,
            self.used_nodes,
            now.elapsed()
        );
        Ok(())
    }

    /// SAH build over precomputed boxes. Leaves reference box indices and the
    /// tree holds no geometry, which makes it suitable as a top-level tree.
    pub fn build_over_boxes(&mut self, boxes: &[BBox]) -> Result<()> {
        if boxes.is_empty() {
            return Err(BvhError::EmptyInput);
        }
        let now = Instant::now();
        let count = boxes.len();
        self.verts.clear();
        self.context.ensure(&mut self.fragments, count, Fragment::default())?;
        self.context.ensure(&mut self.tri_idx, count, 0)?;
        self.context.ensure(&mut self.nodes, (count * 2).max(2), BvhNode::zeroed())?;
        let mut root = BBox::empty();
        for (i, b) in boxes.iter().enumerate() {
            self.fragments[i] = Fragment::new(*b, i as u32);
            self.tri_idx[i] = i as u32;
            root = root.merge(b);
        }
        self.set_root(root, count as u32);
        self.idx_count = count as u32;
        self.subdivide_sah();
        self.finish(BuildKind::OverBoxes, false);
        log::debug!(
            "box build: {} boxes, {} nodes in {:?}",
            count,
            self.used_nodes,
            now.elapsed()
        );
        Ok(())
    }

    /// Copies the vertices, sizes every pool and sets up fragments and the root.
    /// `node_factor` nodes are reserved per primitive and `slack` extra
    /// fragment and index slots follow the primitives.
    pub(crate) fn load_triangles(
        &mut self,
        vertices: &[Point3<f32>],
        node_factor: usize,
        slack: usize,
    ) -> Result<usize> {
        if vertices.is_empty() {
            return Err(BvhError::EmptyInput);
        }
        if vertices.len() % 3 != 0 {
            return Err(BvhError::MalformedVertices {
                len: vertices.len(),
            });
        }
        let prim_count = vertices.len() / 3;
        self.context.ensure(&mut self.verts, vertices.len(), Point3::origin())?;
        self.verts.copy_from_slice(vertices);
        self.context
            .ensure(&mut self.fragments, prim_count + slack, Fragment::default())?;
        self.context.ensure(&mut self.tri_idx, prim_count + slack, 0)?;
        self.context
            .ensure(&mut self.nodes, (prim_count * node_factor).max(2), BvhNode::zeroed())?;

        let mut root = BBox::empty();
        for i in 0..prim_count {
            let bounds = BBox::from_points(&self.verts[i * 3..i * 3 + 3]);
            self.fragments[i] = Fragment::new(bounds, i as u32);
            self.tri_idx[i] = i as u32;
            root = root.merge(&bounds);
        }
        self.set_root(root, prim_count as u32);
        self.idx_count = (prim_count + slack) as u32;
        Ok(prim_count)
    }

    fn set_root(&mut self, bounds: BBox, count: u32) {
        self.nodes[0] = BvhNode {
            bounds,
            left_first: 0,
            tri_count: count,
        };
        self.nodes[1] = BvhNode::zeroed();
        self.tri_count = count;
        self.used_nodes = 2;
    }

    pub(crate) fn finish(&mut self, kind: BuildKind, refittable: bool) {
        self.kind = kind;
        self.refittable = refittable;
        self.may_have_holes = false;
    }

    /// Turns `node_idx` into an interior node with two fresh children and
    /// returns the index of the left one.
    pub(crate) fn split_node(&mut self, node_idx: u32, left: BvhNode, right: BvhNode) -> u32 {
        let lci = self.used_nodes;
        self.used_nodes += 2;
        self.nodes[lci as usize] = left;
        self.nodes[lci as usize + 1] = right;
        let node = &mut self.nodes[node_idx as usize];
        node.left_first = lci;
        node.tri_count = 0;
        lci
    }

    fn subdivide_sah(&mut self) {
        let root = self.nodes[0].bounds;
        let min_dim = root.extent() * 1e-20;
        let mut task: Vec<u32> = Vec::with_capacity(64);
        let mut node_idx = 0u32;
        loop {
            loop {
                let node = self.nodes[node_idx as usize];
                let first = node.left_first as usize;
                let end = first + node.tri_count as usize;
                let split = find_object_split(&self.fragments, &self.tri_idx[first..end], &node.bounds, &min_dim);
                if split.cost >= node.tri_count as f32 * C_INT {
                    break;
                }

                // in-place partition against the chosen bin
                let axis = split.axis;
                let nmin = node.bounds.min[axis];
                let rpd = BINS as f32 / node.bounds.extent()[axis];
                let (mut src, mut j) = (first, end);
                while src < j {
                    let frag = &self.fragments[self.tri_idx[src] as usize];
                    if centroid_bin(frag, axis, nmin, rpd) <= split.pos {
                        src += 1;
                    } else {
                        j -= 1;
                        self.tri_idx.swap(src, j);
                    }
                }

                let left_count = (src - first) as u32;
                let right_count = node.tri_count - left_count;
                if left_count == 0 || right_count == 0 {
                    break;
                }
                let lci = self.split_node(
                    node_idx,
                    BvhNode {
                        bounds: split.left,
                        left_first: first as u32,
                        tri_count: left_count,
                    },
                    BvhNode {
                        bounds: split.right,
                        left_first: src as u32,
                        tri_count: right_count,
                    },
                );
                task.push(lci + 1);
                node_idx = lci;
            }
            match task.pop() {
                Some(next) => node_idx = next,
                None => break,
            }
        }
    }

    fn subdivide_midpoint(&mut self) {
        let mut task: Vec<u32> = Vec::with_capacity(64);
        let mut node_idx = 0u32;
        loop {
            loop {
                let node = self.nodes[node_idx as usize];
                let axis = node.bounds.get_longest_axis();
                let split_pos = node.bounds.min[axis] + node.bounds.extent()[axis] * 0.5;
                let first = node.left_first as usize;
                let (mut src, mut j) = (first, first + node.tri_count as usize);
                let (mut lb, mut rb) = (BBox::empty(), BBox::empty());
                while src < j {
                    let frag = &self.fragments[self.tri_idx[src] as usize];
                    if frag.centroid(axis) < split_pos {
                        lb = lb.merge(&frag.bounds());
                        src += 1;
                    } else {
                        rb = rb.merge(&frag.bounds());
                        j -= 1;
                        self.tri_idx.swap(src, j);
                    }
                }

                let left_count = (src - first) as u32;
                let right_count = node.tri_count - left_count;
                if left_count == 0 || right_count == 0 {
                    break;
                }
                let lci = self.split_node(
                    node_idx,
                    BvhNode {
                        bounds: lb,
                        left_first: first as u32,
                        tri_count: left_count,
                    },
                    BvhNode {
                        bounds: rb,
                        left_first: src as u32,
                        tri_count: right_count,
                    },
                );
                task.push(lci + 1);
                node_idx = lci;
            }
            match task.pop() {
                Some(next) => node_idx = next,
                None => break,
            }
        }
    }
}
