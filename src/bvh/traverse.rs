use crate::bvh::Bvh;
use crate::objects::tri_mesh::{intersect_tri, tri_occludes};
use crate::types::ray::Ray;
use crate::types::vector::BVH_FAR;

impl Bvh {
    /// Nearest-hit traversal. Shrinks `ray.hit` on every closer triangle and
    /// returns the number of nodes visited.
    pub fn intersect(&self, ray: &mut Ray) -> u32 {
        if self.over_boxes() {
            return 0;
        }
        self.traverse_with(ray, |ray, prim| {
            let [v0, v1, v2] = self.triangle(prim);
            intersect_tri(ray, &v0, &v1, &v2, prim);
        })
    }

    /// True when any triangle lies closer than `ray.hit.t`.
    pub fn is_occluded(&self, ray: &Ray) -> bool {
        if !self.is_built() || self.over_boxes() {
            return false;
        }
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        let mut node_idx = 0u32;
        loop {
            let node = &self.nodes[node_idx as usize];
            if node.is_leaf() {
                for &prim in self.leaf_prims(node) {
                    let [v0, v1, v2] = self.triangle(prim);
                    if tri_occludes(ray, &v0, &v1, &v2) {
                        return true;
                    }
                }
                match stack.pop() {
                    Some(next) => node_idx = next,
                    None => break,
                }
                continue;
            }
            match self.nearest_children(node.left_first, ray) {
                Some((near, far)) => {
                    node_idx = near;
                    if let Some(far) = far {
                        stack.push(far);
                    }
                }
                None => match stack.pop() {
                    Some(next) => node_idx = next,
                    None => break,
                },
            }
        }
        false
    }

    /// Front-to-back traversal that hands every primitive of every visited
    /// leaf to `visit`. Returns the number of nodes visited.
    pub(crate) fn traverse_with<F>(&self, ray: &mut Ray, mut visit: F) -> u32
    where
        F: FnMut(&mut Ray, u32),
    {
        if !self.is_built() {
            return 0;
        }
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        let mut node_idx = 0u32;
        let mut steps = 0;
        loop {
            steps += 1;
            let node = &self.nodes[node_idx as usize];
            if node.is_leaf() {
                for &prim in self.leaf_prims(node) {
                    visit(ray, prim);
                }
                match stack.pop() {
                    Some(next) => node_idx = next,
                    None => break,
                }
                continue;
            }
            match self.nearest_children(node.left_first, ray) {
                Some((near, far)) => {
                    node_idx = near;
                    if let Some(far) = far {
                        stack.push(far);
                    }
                }
                None => match stack.pop() {
                    Some(next) => node_idx = next,
                    None => break,
                },
            }
        }
        steps
    }

    /// Slab-tests both children of an interior node and orders the hits by distance.
    fn nearest_children(&self, left_first: u32, ray: &Ray) -> Option<(u32, Option<u32>)> {
        let (mut c1, mut c2) = (left_first, left_first + 1);
        let mut d1 = self.nodes[c1 as usize].bounds.intersect(ray);
        let mut d2 = self.nodes[c2 as usize].bounds.intersect(ray);
        if d1 > d2 {
            std::mem::swap(&mut d1, &mut d2);
            std::mem::swap(&mut c1, &mut c2);
        }
        if d1 == BVH_FAR {
            None
        } else if d2 == BVH_FAR {
            Some((c1, None))
        } else {
            Some((c1, Some(c2)))
        }
    }
}
