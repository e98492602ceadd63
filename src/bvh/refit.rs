use crate::bvh::bbox::BBox;
use crate::bvh::Bvh;
use crate::error::{BvhError, Result};
use na::Point3;
use std::time::Instant;

impl Bvh {
    /// Recomputes every node bound from the current vertex positions, keeping
    /// the topology. Intended for animated meshes; quality degrades as the
    /// motion grows, at which point a rebuild pays off.
    pub fn refit(&mut self) -> Result<()> {
        if !self.refittable || self.verts.is_empty() {
            return Err(BvhError::NotRefittable);
        }
        if self.may_have_holes {
            return Err(BvhError::HasHoles);
        }
        let now = Instant::now();
        for (prim, frag) in self.fragments.iter_mut().enumerate().take(self.tri_count as usize) {
            let bounds = BBox::from_points(&self.verts[prim * 3..prim * 3 + 3]);
            frag.bmin = bounds.min;
            frag.bmax = bounds.max;
        }
        // children always sit at higher indices than their parent
        for i in (0..self.used_nodes as usize).rev() {
            if i == 1 {
                continue;
            }
            let node = self.nodes[i];
            let bounds = if node.is_leaf() {
                self.leaf_prims(&node)
                    .iter()
                    .fold(BBox::empty(), |b, &p| b.merge(&self.fragments[p as usize].bounds()))
            } else {
                let left = &self.nodes[node.left_first as usize];
                let right = &self.nodes[node.left_first as usize + 1];
                left.bounds.merge(&right.bounds)
            };
            self.nodes[i].bounds = bounds;
        }
        log::trace!("refit {} nodes in {:?}", self.used_nodes, now.elapsed());
        Ok(())
    }

    /// Vertex positions the tree was built over, for in-place animation
    /// followed by `refit`.
    pub fn vertices_mut(&mut self) -> &mut [Point3<f32>] {
        &mut self.verts
    }

    /// Replaces the vertex positions and refits. The vertex count must not change.
    pub fn refit_with(&mut self, vertices: &[Point3<f32>]) -> Result<()> {
        if vertices.len() != self.verts.len() {
            return Err(BvhError::VertexCountChanged {
                expected: self.verts.len(),
                found: vertices.len(),
            });
        }
        self.verts.copy_from_slice(vertices);
        self.refit()
    }
}
