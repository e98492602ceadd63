pub mod bbox;
pub mod bits;
mod build;
pub mod compressed;
pub mod context;
mod maintain;
mod optimize;
pub mod packet;
mod refit;
mod spatial;
mod traverse;
pub mod wide;

use crate::bvh::bbox::BBox;
use crate::bvh::context::BuildContext;
use bytemuck::{Pod, Zeroable};
use na::Point3;

/// Number of bins per axis used by the binned builders.
pub const BINS: usize = 8;
/// Cost of visiting a node, relative to `C_INT`.
pub const C_TRAV: f32 = 1.0;
/// Cost of testing one primitive.
pub const C_INT: f32 = 1.0;

/// Binary node. A leaf iff `tri_count > 0`; for interior nodes `left_first`
/// is the index of the left child and the right child follows it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: BBox,
    pub left_first: u32,
    pub tri_count: u32,
}

impl BvhNode {
    /// Zeroed node, used to fill fresh pool slots.
    pub fn zeroed() -> Self {
        Self {
            bounds: BBox {
                min: Point3::origin(),
                max: Point3::origin(),
            },
            left_first: 0,
            tri_count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }
}

/// 32-byte form of a [`BvhNode`] for upload: min, `left_first`, max,
/// `tri_count`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PackedNode {
    pub min: [f32; 3],
    pub left_first: u32,
    pub max: [f32; 3],
    pub tri_count: u32,
}

impl From<&BvhNode> for PackedNode {
    fn from(node: &BvhNode) -> Self {
        Self {
            min: node.bounds.min.coords.into(),
            left_first: node.left_first,
            max: node.bounds.max.coords.into(),
            tri_count: node.tri_count,
        }
    }
}

/// Bounds of one primitive, or of a clipped piece of one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    pub bmin: Point3<f32>,
    pub prim_idx: u32,
    pub bmax: Point3<f32>,
    pub clipped: bool,
}

impl Fragment {
    pub fn new(bounds: BBox, prim_idx: u32) -> Self {
        Self {
            bmin: bounds.min,
            prim_idx,
            bmax: bounds.max,
            clipped: false,
        }
    }

    pub fn bounds(&self) -> BBox {
        BBox {
            min: self.bmin,
            max: self.bmax,
        }
    }

    pub fn centroid(&self, axis: usize) -> f32 {
        (self.bmin[axis] + self.bmax[axis]) * 0.5
    }
}

impl Default for Fragment {
    fn default() -> Self {
        Self::new(BBox::empty(), 0)
    }
}

/// How the current tree was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildKind {
    Empty,
    Quick,
    Sah,
    Spatial,
    OverBoxes,
}

/// Binary BVH over a triangle soup or over a set of boxes.
///
/// Node 0 is the root and node 1 is never used, so the two children of any
/// interior node share a cache line. Only the first `used_nodes` entries of
/// the node pool are meaningful.
#[derive(Debug)]
pub struct Bvh {
    pub(crate) verts: Vec<Point3<f32>>,
    pub(crate) tri_idx: Vec<u32>,
    pub(crate) nodes: Vec<BvhNode>,
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) context: BuildContext,
    pub(crate) kind: BuildKind,
    pub(crate) refittable: bool,
    pub(crate) may_have_holes: bool,
    pub(crate) used_nodes: u32,
    pub(crate) tri_count: u32,
    pub(crate) idx_count: u32,
}

impl Bvh {
    pub fn new() -> Self {
        Self::with_context(BuildContext::new())
    }

    pub fn with_context(context: BuildContext) -> Self {
        Self {
            verts: Vec::new(),
            tri_idx: Vec::new(),
            nodes: Vec::new(),
            fragments: Vec::new(),
            context,
            kind: BuildKind::Empty,
            refittable: false,
            may_have_holes: false,
            used_nodes: 0,
            tri_count: 0,
            idx_count: 0,
        }
    }

    pub fn kind(&self) -> BuildKind {
        self.kind
    }

    pub fn is_built(&self) -> bool {
        self.used_nodes > 0
    }

    pub fn is_refittable(&self) -> bool {
        self.refittable
    }

    pub fn may_have_holes(&self) -> bool {
        self.may_have_holes
    }

    pub fn over_boxes(&self) -> bool {
        self.kind == BuildKind::OverBoxes
    }

    /// Node pool up to the last allocated node, including node 1 and any holes.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes[..self.used_nodes as usize]
    }

    /// The node pool in the 32-byte upload layout, node 1 and holes included.
    pub fn packed_nodes(&self) -> Vec<PackedNode> {
        self.nodes().iter().map(PackedNode::from).collect()
    }

    pub fn root(&self) -> Option<&BvhNode> {
        self.nodes().first()
    }

    pub fn bounds(&self) -> BBox {
        self.root().map(|n| n.bounds).unwrap_or_default()
    }

    /// Primitive indices referenced by leaves. Spatial builds may repeat entries.
    pub fn tri_indices(&self) -> &[u32] {
        &self.tri_idx[..self.idx_count as usize]
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.verts
    }

    pub fn tri_count(&self) -> u32 {
        self.tri_count
    }

    pub fn used_nodes(&self) -> u32 {
        self.used_nodes
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub(crate) fn triangle(&self, prim: u32) -> [Point3<f32>; 3] {
        let i = prim as usize * 3;
        [self.verts[i], self.verts[i + 1], self.verts[i + 2]]
    }

    pub(crate) fn leaf_prims(&self, node: &BvhNode) -> &[u32] {
        let first = node.left_first as usize;
        &self.tri_idx[first..first + node.tri_count as usize]
    }
}

impl Default for Bvh {
    fn default() -> Self {
        Self::new()
    }
}
