use crate::bvh::bbox::BBox;
use crate::bvh::build::{centroid_bin, find_object_split, Sweep};
use crate::bvh::{BuildKind, Bvh, BvhNode, Fragment, BINS, C_INT};
use crate::error::Result;
use crate::types::vector::{max_point, min_point, BVH_FAR};
use na::{Point3, Vector3};
use std::time::Instant;

// Enough room for a triangle clipped against six planes, with margin.
const CLIP_CAP: usize = 16;

struct Task {
    node: u32,
    slice_start: usize,
    slice_end: usize,
}

#[derive(Clone, Copy, Debug)]
struct Split {
    axis: usize,
    pos: usize,
    cost: f32,
    left: BBox,
    right: BBox,
    spatial: bool,
}

/// Bin range `[bin1, bin2]` covered by a fragment along `axis`.
fn spatial_bins(frag: &Fragment, axis: usize, node_min: f32, rpd: f32) -> (usize, usize) {
    let clamp = |v: f32| (((v - node_min) * rpd) as i32).clamp(0, BINS as i32 - 1) as usize;
    (clamp(frag.bmin[axis]), clamp(frag.bmax[axis]))
}

fn clip_push(buf: &mut [Point3<f32>; CLIP_CAP], n: &mut usize, p: Point3<f32>) {
    if *n < CLIP_CAP {
        buf[*n] = p;
        *n += 1;
    }
}

impl Bvh {
    /// SBVH build. Besides object splits, nodes may split space itself,
    /// clipping straddling triangles into pieces on both sides. Gives tighter
    /// trees for static geometry at a much higher build cost. The result
    /// cannot be refitted.
    pub fn build_spatial(&mut self, vertices: &[Point3<f32>]) -> Result<()> {
        let now = Instant::now();
        let slack = (vertices.len() / 3) >> 2;
        let prim_count = self.load_triangles(vertices, 3, slack)?;
        let total = prim_count + slack;
        let mut idx_b: Vec<u32> = Vec::new();
        self.context.ensure(&mut idx_b, total, 0)?;

        let root = self.nodes[0].bounds;
        let root_area = root.half_area();
        let min_dim = root.extent() * 1e-7;
        let mut next_frag = prim_count;
        let mut exhausted = false;
        let mut tasks: Vec<Task> = Vec::with_capacity(64);
        let (mut node_idx, mut slice_start, mut slice_end) = (0u32, 0usize, total);
        loop {
            loop {
                let node = self.nodes[node_idx as usize];
                let first = node.left_first as usize;
                let end = first + node.tri_count as usize;
                let object = find_object_split(&self.fragments, &self.tri_idx[first..end], &node.bounds, &min_dim);
                let mut best = Split {
                    axis: object.axis,
                    pos: object.pos,
                    cost: object.cost,
                    left: object.left,
                    right: object.right,
                    spatial: false,
                };

                let budget = slice_end - slice_start;
                let overlap = best.left.intersection(&best.right).half_area() / root_area;
                if budget > node.tri_count as usize && best.cost < BVH_FAR && overlap > 1e-5 {
                    let rsav = 1.0 / node.bounds.half_area();
                    let extent = node.bounds.extent();
                    for a in 0..3 {
                        if extent[a] <= min_dim[a] {
                            continue;
                        }
                        let mut bins = [BBox::empty(); BINS];
                        let mut count_in = [0u32; BINS];
                        let mut count_out = [0u32; BINS];
                        let plane_dist = extent[a] / (BINS as f32 * 0.9999);
                        let rpd = 1.0 / plane_dist;
                        let node_min = node.bounds.min[a];
                        for &fi in &self.tri_idx[first..end] {
                            let frag = self.fragments[fi as usize];
                            let (bin1, bin2) = spatial_bins(&frag, a, node_min, rpd);
                            count_in[bin1] += 1;
                            count_out[bin2] += 1;
                            if bin1 == bin2 {
                                bins[bin1] = bins[bin1].merge(&frag.bounds());
                                continue;
                            }
                            for j in bin1..=bin2 {
                                let mut slab = node.bounds;
                                slab.min[a] = node_min + plane_dist * j as f32;
                                slab.max[a] = if j == BINS - 1 {
                                    node.bounds.max[a]
                                } else {
                                    slab.min[a] + plane_dist
                                };
                                if let Some(piece) = self.clip_fragment(&frag, &slab, &min_dim) {
                                    bins[j] = bins[j].merge(&piece.bounds());
                                }
                            }
                        }
                        let sweep = Sweep::new(&bins, &count_in, &count_out, rsav);
                        for i in 0..BINS - 1 {
                            let fits = ((sweep.left_count[i] + sweep.right_count[i]) as usize) < budget;
                            if sweep.cost[i] < best.cost && fits {
                                best = Split {
                                    axis: a,
                                    pos: i,
                                    cost: sweep.cost[i],
                                    left: sweep.left[i],
                                    right: sweep.right[i],
                                    spatial: true,
                                };
                                best.left.max[a] = best.right.min[a];
                            }
                        }
                    }
                }

                if best.cost >= node.tri_count as f32 * C_INT {
                    break;
                }

                // double-buffered partition into [slice_start, a) and [b, slice_end)
                let (mut a, mut b) = (slice_start, slice_end);
                let axis = best.axis;
                if best.spatial {
                    let plane_dist = node.bounds.extent()[axis] / (BINS as f32 * 0.9999);
                    let rpd = 1.0 / plane_dist;
                    let node_min = node.bounds.min[axis];
                    let left_box = best.left.intersection(&node.bounds);
                    let right_box = best.right.intersection(&node.bounds);
                    for i in first..end {
                        let fi = self.tri_idx[i];
                        let frag = self.fragments[fi as usize];
                        let (bin1, bin2) = spatial_bins(&frag, axis, node_min, rpd);
                        if bin2 <= best.pos {
                            idx_b[a] = fi;
                            a += 1;
                        } else if bin1 > best.pos {
                            b -= 1;
                            idx_b[b] = fi;
                        } else if next_frag >= self.fragments.len() {
                            if !exhausted {
                                log::warn!("spatial split: fragment pool exhausted, keeping straddlers whole");
                                exhausted = true;
                            }
                            idx_b[a] = fi;
                            a += 1;
                        } else {
                            let right = self.clip_fragment(&frag, &right_box, &min_dim);
                            let left = self.clip_fragment(&frag, &left_box, &min_dim);
                            if let Some(piece) = right {
                                self.fragments[next_frag] = piece;
                                b -= 1;
                                idx_b[b] = next_frag as u32;
                                next_frag += 1;
                            }
                            match left {
                                Some(piece) => {
                                    self.fragments[fi as usize] = piece;
                                    idx_b[a] = fi;
                                    a += 1;
                                }
                                None if right.is_none() => {
                                    idx_b[a] = fi;
                                    a += 1;
                                }
                                None => {}
                            }
                        }
                    }
                } else {
                    let nmin = node.bounds.min[axis];
                    let rpd = BINS as f32 / node.bounds.extent()[axis];
                    for i in first..end {
                        let fi = self.tri_idx[i];
                        if centroid_bin(&self.fragments[fi as usize], axis, nmin, rpd) <= best.pos {
                            idx_b[a] = fi;
                            a += 1;
                        } else {
                            b -= 1;
                            idx_b[b] = fi;
                        }
                    }
                }

                let left_count = (a - slice_start) as u32;
                let right_count = (slice_end - b) as u32;
                if left_count == 0 || right_count == 0 {
                    break;
                }
                self.tri_idx[slice_start..slice_end].copy_from_slice(&idx_b[slice_start..slice_end]);
                let lci = self.split_node(
                    node_idx,
                    BvhNode {
                        bounds: best.left,
                        left_first: slice_start as u32,
                        tri_count: left_count,
                    },
                    BvhNode {
                        bounds: best.right,
                        left_first: b as u32,
                        tri_count: right_count,
                    },
                );
                let mid = (a + b) / 2;
                tasks.push(Task {
                    node: lci + 1,
                    slice_start: mid,
                    slice_end,
                });
                slice_end = mid;
                node_idx = lci;
            }
            match tasks.pop() {
                Some(task) => {
                    node_idx = task.node;
                    slice_start = task.slice_start;
                    slice_end = task.slice_end;
                }
                None => break,
            }
        }

        for i in 0..total {
            self.tri_idx[i] = self.fragments[self.tri_idx[i] as usize].prim_idx;
        }
        self.context.release(idx_b);
        self.finish(BuildKind::Spatial, false);
        log::debug!(
            "spatial build: {} triangles, {} fragments, {} nodes in {:?}",
            prim_count,
            next_frag,
            self.used_nodes,
            now.elapsed()
        );
        Ok(())
    }

    /// Clips the triangle behind `orig` against `bounds` (Sutherland-Hodgman
    /// over the six box planes) and returns the bounds of what remains.
    pub(crate) fn clip_fragment(
        &self,
        orig: &Fragment,
        bounds: &BBox,
        min_dim: &Vector3<f32>,
    ) -> Option<Fragment> {
        let bmin = max_point(&bounds.min, &orig.bmin);
        let bmax = min_point(&bounds.max, &orig.bmax);
        let extent = bmax - bmin;
        let tri = self.triangle(orig.prim_idx);
        let mut vin = [Point3::origin(); CLIP_CAP];
        let mut vout = [Point3::origin(); CLIP_CAP];
        vin[..3].copy_from_slice(&tri);
        let mut n_in = 3;
        for a in 0..3 {
            let eps = min_dim[a];
            if extent[a] <= eps {
                continue;
            }
            let (l, r) = (bmin[a], bmax[a]);
            let mut n_out = 0;
            for v in 0..n_in {
                let (p0, p1) = (vin[v], vin[(v + 1) % n_in]);
                let (in0, in1) = (p0[a] >= l - eps, p1[a] >= l - eps);
                if !(in0 || in1) {
                    continue;
                }
                if in0 != in1 {
                    let mut c = p0 + (p1 - p0) * ((l - p0[a]) / (p1[a] - p0[a]));
                    c[a] = l;
                    clip_push(&mut vout, &mut n_out, c);
                }
                if in1 {
                    clip_push(&mut vout, &mut n_out, p1);
                }
            }
            n_in = 0;
            for v in 0..n_out {
                let (p0, p1) = (vout[v], vout[(v + 1) % n_out]);
                let (in0, in1) = (p0[a] <= r + eps, p1[a] <= r + eps);
                if !(in0 || in1) {
                    continue;
                }
                if in0 != in1 {
                    let mut c = p0 + (p1 - p0) * ((r - p0[a]) / (p1[a] - p0[a]));
                    c[a] = r;
                    clip_push(&mut vin, &mut n_in, c);
                }
                if in1 {
                    clip_push(&mut vin, &mut n_in, p1);
                }
            }
        }
        if n_in == 0 {
            return None;
        }
        let hull = BBox::from_points(&vin[..n_in]);
        Some(Fragment {
            bmin: max_point(&hull.min, &bmin),
            prim_idx: orig.prim_idx,
            bmax: min_point(&hull.max, &bmax),
            clipped: true,
        })
    }
}
