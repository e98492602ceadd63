use crate::bvh::bbox::BBox;
use crate::bvh::{Bvh, BvhNode, C_INT, C_TRAV};
use crate::error::{BvhError, Result};
use crate::types::vector::BVH_FAR;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

const NO_PARENT: u32 = u32::MAX;
/// Reinsertions between quality checks. A batch that made the tree worse
/// is rolled back.
const BATCH: u32 = 64;
/// Random picks per reinsertion before giving up on finding a movable node.
const PICK_ATTEMPTS: u32 = 64;

/// Node with explicit child and parent links, so subtrees can be cut out and
/// grafted elsewhere without moving any other node.
#[derive(Clone, Copy, Debug)]
struct LinkedNode {
    bounds: BBox,
    left: u32,
    right: u32,
    parent: u32,
    first_tri: u32,
    tri_count: u32,
}

impl LinkedNode {
    fn detached() -> Self {
        Self {
            bounds: BBox::empty(),
            left: 0,
            right: 0,
            parent: NO_PARENT,
            first_tri: 0,
            tri_count: 0,
        }
    }

    fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }
}

struct LinkedTree<'a> {
    nodes: &'a mut [LinkedNode],
}

impl<'a> LinkedTree<'a> {
    fn link(nodes: &'a mut [LinkedNode], source: &[BvhNode]) -> Self {
        for (i, orig) in source.iter().enumerate() {
            if i == 1 {
                continue;
            }
            let node = &mut nodes[i];
            node.bounds = orig.bounds;
            if orig.is_leaf() {
                node.first_tri = orig.left_first;
                node.tri_count = orig.tri_count;
            } else {
                node.left = orig.left_first;
                node.right = orig.left_first + 1;
                nodes[orig.left_first as usize].parent = i as u32;
                nodes[orig.left_first as usize + 1].parent = i as u32;
            }
        }
        Self { nodes }
    }

    /// Unnormalized SAH cost of everything below the root.
    fn cost(&self) -> f32 {
        let mut cost = 0.0;
        let mut stack = vec![0u32];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            let area = node.bounds.half_area();
            if node.is_leaf() {
                cost += C_INT * area * node.tri_count as f32;
            } else {
                cost += C_TRAV * area;
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        cost
    }

    fn refit_up(&mut self, mut idx: u32) {
        while idx != NO_PARENT {
            let node = self.nodes[idx as usize];
            let bounds = self.nodes[node.left as usize]
                .bounds
                .merge(&self.nodes[node.right as usize].bounds);
            self.nodes[idx as usize].bounds = bounds;
            idx = node.parent;
        }
    }

    /// Branch-and-bound search for the sibling that makes inserting `l`
    /// cheapest. The induced cost of a candidate is the area its ancestors
    /// gain from enclosing `l`; subtrees that cannot beat the best so far
    /// are never opened.
    fn best_sibling(&self, l: u32) -> u32 {
        let l_bounds = self.nodes[l as usize].bounds;
        let l_area = l_bounds.half_area();
        let mut tasks: Vec<(u32, f32)> = vec![(0, 0.0)];
        let (mut best, mut best_cost) = (0u32, BVH_FAR);
        while !tasks.is_empty() {
            let mut pick = 0;
            for (i, task) in tasks.iter().enumerate() {
                if task.1 < tasks[pick].1 {
                    pick = i;
                }
            }
            let (x, induced) = tasks.swap_remove(pick);
            if induced + l_area >= best_cost {
                break;
            }
            let node = &self.nodes[x as usize];
            let total = induced + node.bounds.merge(&l_bounds).half_area();
            if total < best_cost {
                best_cost = total;
                best = x;
            }
            let below = total - node.bounds.half_area();
            if below + l_area < best_cost && !node.is_leaf() {
                tasks.push((node.left, below));
                tasks.push((node.right, below));
            }
        }
        best
    }

    /// Hangs subtree `l` next to its best sibling, using the detached node
    /// `n` as their new parent. The root cannot get a sibling; `fallback`
    /// is used instead.
    fn reinsert(&mut self, l: u32, n: u32, fallback: u32) {
        let mut x = self.best_sibling(l);
        if self.nodes[x as usize].parent == NO_PARENT {
            x = fallback;
        }
        let x_parent = self.nodes[x as usize].parent;
        self.nodes[n as usize] = LinkedNode {
            bounds: self.nodes[x as usize].bounds.merge(&self.nodes[l as usize].bounds),
            left: x,
            right: l,
            parent: x_parent,
            ..LinkedNode::detached()
        };
        let grand = &mut self.nodes[x_parent as usize];
        if grand.left == x {
            grand.left = n;
        } else {
            grand.right = n;
        }
        self.nodes[x as usize].parent = n;
        self.nodes[l as usize].parent = n;
        self.refit_up(n);
    }

    /// Cuts a random interior node `n` and its parent out of the tree, then
    /// reinserts the two orphaned subtrees one by one, reusing `n` and the
    /// parent as their new parents. Nodes directly below the root or its
    /// children are left alone, so the grandparent always survives.
    fn reinsert_random(&mut self, rng: &mut StdRng) -> bool {
        let count = self.nodes.len() as u32;
        if count <= 2 {
            return false;
        }
        for _ in 0..PICK_ATTEMPTS {
            let n = rng.gen_range(2..count);
            let node = self.nodes[n as usize];
            if node.is_leaf() || node.parent == 0 || node.parent == NO_PARENT {
                continue;
            }
            let p = node.parent;
            let parent = self.nodes[p as usize];
            if parent.parent == 0 || parent.parent == NO_PARENT {
                continue;
            }
            let grand = parent.parent;
            let sibling = if parent.left == n { parent.right } else { parent.left };
            let g = &mut self.nodes[grand as usize];
            if g.left == p {
                g.left = sibling;
            } else {
                g.right = sibling;
            }
            self.nodes[sibling as usize].parent = grand;
            self.refit_up(grand);
            self.reinsert(node.left, p, grand);
            self.reinsert(node.right, n, grand);
            return true;
        }
        false
    }

    /// Writes the tree back in the paired layout, depth first. Returns the
    /// number of slots used, which equals the input's since no node is
    /// created or dropped.
    fn unlink(&self, out: &mut [BvhNode]) -> u32 {
        out[1] = BvhNode::zeroed();
        let mut next = 2u32;
        let mut stack = vec![(0u32, 0u32)];
        while let Some((src, dst)) = stack.pop() {
            let node = &self.nodes[src as usize];
            if node.is_leaf() {
                out[dst as usize] = BvhNode {
                    bounds: node.bounds,
                    left_first: node.first_tri,
                    tri_count: node.tri_count,
                };
                continue;
            }
            out[dst as usize] = BvhNode {
                bounds: node.bounds,
                left_first: next,
                tri_count: 0,
            };
            stack.push((node.right, next + 1));
            stack.push((node.left, next));
            next += 2;
        }
        next
    }
}

impl Bvh {
    /// Improves the tree in place by repeatedly cutting out a random subtree
    /// and reinserting its two halves where they add the least surface area.
    /// Leaves and primitive order are untouched, only the interior structure
    /// changes. Progress is checked every few dozen reinsertions and a batch
    /// that raised the SAH cost is undone, so the cost never goes up.
    ///
    /// The node list must be free of holes; call `compact` after
    /// `merge_leaves`.
    pub fn optimize(&mut self, iterations: u32) -> Result<()> {
        if !self.is_built() {
            return Ok(());
        }
        if self.may_have_holes {
            return Err(BvhError::HasHoles);
        }
        let now = Instant::now();
        let used = self.used_nodes as usize;
        let mut linked: Vec<LinkedNode> = Vec::new();
        let mut saved: Vec<LinkedNode> = Vec::new();
        let mut out: Vec<BvhNode> = Vec::new();
        let allocated = self
            .context
            .ensure(&mut linked, used, LinkedNode::detached())
            .and_then(|_| self.context.ensure(&mut saved, used, LinkedNode::detached()))
            .and_then(|_| self.context.ensure(&mut out, used, BvhNode::zeroed()));
        if let Err(err) = allocated {
            self.context.release(out);
            self.context.release(saved);
            self.context.release(linked);
            return Err(err);
        }

        let mut rng = StdRng::seed_from_u64(0x1234_5678);
        let mut tree = LinkedTree::link(&mut linked, &self.nodes[..used]);
        saved.copy_from_slice(tree.nodes);
        let before = tree.cost();
        let mut best = before;
        let mut done = 0;
        while done < iterations {
            let batch = BATCH.min(iterations - done);
            let mut moved = false;
            for _ in 0..batch {
                moved |= tree.reinsert_random(&mut rng);
            }
            done += batch;
            if !moved {
                break;
            }
            let cost = tree.cost();
            if cost <= best {
                best = cost;
                saved.copy_from_slice(tree.nodes);
            } else {
                tree.nodes.copy_from_slice(&saved);
            }
        }
        tree.nodes.copy_from_slice(&saved);
        let written = tree.unlink(&mut out);
        debug_assert_eq!(written as usize, used);
        self.nodes[..used].copy_from_slice(&out);
        self.context.release(out);
        self.context.release(saved);
        self.context.release(linked);

        let root_area = self.nodes[0].bounds.half_area().max(f32::MIN_POSITIVE);
        log::debug!(
            "optimized {} iterations: SAH {:.3} -> {:.3} in {:?}",
            done,
            before / root_area,
            best / root_area,
            now.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bvh::Bvh;
    use crate::error::BvhError;
    use crate::types::ray::Ray;
    use na::Point3;

    /// Small triangles on a jittered 3D lattice.
    fn lattice(n: usize) -> Vec<Point3<f32>> {
        (0..n * n * n)
            .flat_map(|i| {
                let (x, y, z) = ((i % n) as f32, ((i / n) % n) as f32, (i / (n * n)) as f32);
                let j = ((i * 7919) % 13) as f32 * 0.03;
                [
                    Point3::new(x + j, y, z),
                    Point3::new(x + 0.6, y + j, z + 0.1),
                    Point3::new(x + 0.1, y + 0.5, z + 0.4 + j),
                ]
            })
            .collect()
    }

    #[test]
    fn quick_tree_gets_cheaper() {
        let mut bvh = Bvh::new();
        bvh.build_quick(&lattice(6)).unwrap();
        let before = bvh.sah_cost();
        let nodes = bvh.used_nodes();
        bvh.optimize(1000).unwrap();
        assert!(bvh.sah_cost() < before);
        assert_eq!(bvh.used_nodes(), nodes);
        assert_eq!(bvh.node_count(), nodes - 1);
        assert_eq!(bvh.prim_count(0), 216);
    }

    #[test]
    fn children_still_follow_parents() {
        let mut bvh = Bvh::new();
        bvh.build(&lattice(5)).unwrap();
        bvh.optimize(500).unwrap();
        for (i, node) in bvh.nodes().iter().enumerate() {
            if i != 1 && !node.is_leaf() {
                assert!(node.left_first as usize > i);
                let l = bvh.nodes()[node.left_first as usize].bounds;
                let r = bvh.nodes()[node.left_first as usize + 1].bounds;
                assert!(node.bounds.contains(&l, 0.0) && node.bounds.contains(&r, 0.0));
            }
        }
        // the backward refit pass depends on that order
        bvh.refit().unwrap();
    }

    #[test]
    fn hits_are_unchanged() {
        let verts = lattice(5);
        let mut reference = Bvh::new();
        reference.build_quick(&verts).unwrap();
        let mut bvh = Bvh::new();
        bvh.build_quick(&verts).unwrap();
        bvh.optimize(800).unwrap();
        for i in 0..200 {
            let a = i as f32 * 0.37;
            let origin = Point3::new(2.0 + 8.0 * a.cos(), 2.0 + 3.0 * (a * 0.7).sin(), 2.0 + 8.0 * a.sin());
            let target = Point3::new((i % 5) as f32 + 0.3, ((i / 5) % 5) as f32 + 0.2, ((i / 25) % 5) as f32 + 0.2);
            let mut r1 = Ray::new(origin, target - origin);
            let mut r2 = r1;
            reference.intersect(&mut r1);
            bvh.intersect(&mut r2);
            assert_eq!(r1.hit.t, r2.hit.t);
            assert_eq!(r1.hit.prim, r2.hit.prim);
        }
    }

    #[test]
    fn tiny_trees_are_left_alone() {
        let tri = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let mut bvh = Bvh::new();
        bvh.build(&tri).unwrap();
        bvh.optimize(10).unwrap();
        assert_eq!(bvh.node_count(), 1);
        let mut empty = Bvh::new();
        empty.optimize(10).unwrap();
    }

    #[test]
    fn holes_must_be_compacted_first() {
        let mut bvh = Bvh::new();
        bvh.build(&lattice(3)).unwrap();
        bvh.may_have_holes = true;
        assert!(matches!(bvh.optimize(10), Err(BvhError::HasHoles)));
        bvh.compact().unwrap();
        bvh.optimize(10).unwrap();
    }
}
