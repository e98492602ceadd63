use crate::bvh::{Bvh, BvhNode, C_INT, C_TRAV};
use crate::error::Result;

impl Bvh {
    /// SAH cost of the whole tree, normalized by the root area. Lower is better.
    pub fn sah_cost(&self) -> f32 {
        let Some(root) = self.root() else {
            return 0.0;
        };
        let mut cost = 0.0;
        let mut stack = vec![0u32];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            let area = node.bounds.half_area();
            if node.is_leaf() {
                cost += C_INT * area * node.tri_count as f32;
            } else {
                cost += C_TRAV * area;
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
            }
        }
        let root_area = root.bounds.half_area();
        if root_area > 0.0 {
            cost / root_area
        } else {
            cost
        }
    }

    /// Number of nodes reachable from the root. Without holes this is
    /// `used_nodes - 1`, since node 1 is never used.
    pub fn node_count(&self) -> u32 {
        if !self.is_built() {
            return 0;
        }
        let mut count = 0;
        let mut stack = vec![0u32];
        while let Some(idx) = stack.pop() {
            count += 1;
            let node = &self.nodes[idx as usize];
            if !node.is_leaf() {
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
            }
        }
        count
    }

    /// Primitives (or fragments) stored in the leaves below `node_idx`.
    pub fn prim_count(&self, node_idx: u32) -> u32 {
        let mut count = 0;
        let mut stack = vec![node_idx];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if node.is_leaf() {
                count += node.tri_count;
            } else {
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
            }
        }
        count
    }

    /// Collapses pairs of sibling leaves into their parent when the index
    /// ranges are adjacent, the result holds at most `max_prims` primitives,
    /// and the SAH says a single leaf is no worse. Returns the number of merges.
    ///
    /// Merged children stay behind as holes until `compact` is called.
    pub fn merge_leaves(&mut self, max_prims: u32) -> u32 {
        let mut merged = 0;
        for i in (0..self.used_nodes as usize).rev() {
            let node = self.nodes[i];
            if i == 1 || node.is_leaf() {
                continue;
            }
            let left = self.nodes[node.left_first as usize];
            let right = self.nodes[node.left_first as usize + 1];
            if !left.is_leaf() || !right.is_leaf() {
                continue;
            }
            let count = left.tri_count + right.tri_count;
            if count > max_prims {
                continue;
            }
            let first = if left.left_first + left.tri_count == right.left_first {
                left.left_first
            } else if right.left_first + right.tri_count == left.left_first {
                right.left_first
            } else {
                continue;
            };
            let area = node.bounds.half_area();
            let leaf_cost = C_INT * count as f32 * area;
            let split_cost = C_TRAV * area
                + C_INT
                    * (left.tri_count as f32 * left.bounds.half_area()
                        + right.tri_count as f32 * right.bounds.half_area());
            if leaf_cost > split_cost {
                continue;
            }
            self.nodes[i].left_first = first;
            self.nodes[i].tri_count = count;
            merged += 1;
        }
        if merged > 0 {
            self.may_have_holes = true;
            log::debug!("merged {} leaf pairs", merged);
        }
        merged
    }

    /// Rewrites the node pool in depth-first order without holes.
    pub fn compact(&mut self) -> Result<()> {
        if !self.is_built() {
            return Ok(());
        }
        let mut tmp: Vec<BvhNode> = Vec::new();
        self.context
            .ensure(&mut tmp, self.used_nodes as usize, BvhNode::zeroed())?;
        tmp[0] = self.nodes[0];
        let mut next = 2u32;
        if !tmp[0].is_leaf() {
            let mut stack = vec![0u32];
            while let Some(idx) = stack.pop() {
                let node = &mut tmp[idx as usize];
                let left = self.nodes[node.left_first as usize];
                let right = self.nodes[node.left_first as usize + 1];
                node.left_first = next;
                tmp[next as usize] = left;
                tmp[next as usize + 1] = right;
                if !left.is_leaf() {
                    stack.push(next);
                }
                if !right.is_leaf() {
                    stack.push(next + 1);
                }
                next += 2;
            }
        }
        self.nodes[..next as usize].copy_from_slice(&tmp[..next as usize]);
        let before = self.used_nodes;
        self.used_nodes = next;
        self.may_have_holes = false;
        self.context.release(tmp);
        log::debug!("compacted {} nodes into {}", before, next);
        Ok(())
    }
}
