use crate::bvh::compressed::{CompressedBvh, TriPayload};
use crate::bvh::wide::Bvh8;
use crate::bvh::{Bvh, PackedNode};
use crate::error::{BvhError, Result};
use crate::types::ray::{Intersection, Ray};
use na::{Matrix4, Point3, Vector3};

/// Copyable reference to a tree in a [`Registry`]. The generation makes a
/// handle go stale once its slot is freed, even if the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u64,
}

impl Handle {
    /// Rebuilds a handle from the two integers a host layer passed around.
    pub fn from_raw(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn invalid(&self) -> BvhError {
        BvhError::InvalidHandle {
            index: self.index,
            generation: self.generation,
        }
    }
}

/// Handle to a top-level tree in a [`Registry`]. Kept apart from [`Handle`]
/// so a top-level handle cannot be passed where a bottom-level one is
/// expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TlasHandle(Handle);

impl TlasHandle {
    pub fn from_raw(index: usize, generation: u64) -> Self {
        Self(Handle::from_raw(index, generation))
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u64 {
        self.0.generation
    }
}

/// Slots tagged with a generation that is bumped on every insert, plus a
/// free list of empty slots.
#[derive(Debug)]
struct Arena<T> {
    slots: Vec<(Option<T>, u64)>,
    empties: Vec<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            empties: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    fn insert(&mut self, value: T) -> Handle {
        let index = match self.empties.pop() {
            Some(index) => index,
            None => {
                self.slots.push((None, 0));
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.0 = Some(value);
        slot.1 += 1;
        Handle {
            index,
            generation: slot.1,
        }
    }

    fn remove(&mut self, handle: Handle) -> Result<T> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.1 == handle.generation)
            .ok_or_else(|| handle.invalid())?;
        let value = slot.0.take().ok_or_else(|| handle.invalid())?;
        self.empties.push(handle.index);
        Ok(value)
    }

    fn get(&self, handle: Handle) -> Result<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.1 == handle.generation)
            .and_then(|slot| slot.0.as_ref())
            .ok_or_else(|| handle.invalid())
    }

    fn len(&self) -> usize {
        self.slots.len() - self.empties.len()
    }
}

/// A bottom-level tree placed in the world.
#[derive(Clone, Debug)]
struct PlacedBlas {
    blas: Handle,
    inv_transform: Matrix4<f32>,
}

/// Top-level tree over registered bottom-level trees. Leaf `i` of `bvh`
/// is `instances[i]`.
#[derive(Debug)]
struct RegisteredTlas {
    bvh: Bvh,
    instances: Vec<PlacedBlas>,
    packed: Vec<PackedNode>,
}

/// Owner of compressed trees that are published to a host as handles.
/// Each `build` runs the full pipeline: binned SAH, 8-wide collapse and
/// compression. Top-level trees over those handles live in a second table
/// with its own handles.
#[derive(Debug, Default)]
pub struct Registry {
    blas: Arena<CompressedBvh>,
    tlas: Arena<RegisteredTlas>,
    payload: TriPayload,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: TriPayload) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    pub fn build(&mut self, vertices: &[Point3<f32>]) -> Result<Handle> {
        let mut bvh = Bvh::new();
        bvh.build(vertices)?;
        let mut wide = Bvh8::convert_from(bvh)?;
        let tree = CompressedBvh::convert_from(&mut wide, self.payload)?;
        Ok(self.insert(tree))
    }

    pub fn insert(&mut self, tree: CompressedBvh) -> Handle {
        let handle = self.blas.insert(tree);
        log::debug!("registered tree {} (generation {})", handle.index, handle.generation);
        handle
    }

    /// Frees a tree. Fails on stale handles, so a double free is reported
    /// instead of releasing whatever reused the slot. Top-level trees that
    /// reference it stay alive but can no longer be traced.
    pub fn destroy(&mut self, handle: Handle) -> Result<CompressedBvh> {
        self.blas.remove(handle)
    }

    pub fn is_ready(&self, handle: Handle) -> bool {
        self.data(handle).is_ok()
    }

    pub fn data(&self, handle: Handle) -> Result<&CompressedBvh> {
        self.blas.get(handle)
    }

    /// Traces a single ray; the direction is normalized first.
    pub fn intersect(&self, handle: Handle, origin: Point3<f32>, direction: Vector3<f32>) -> Result<Intersection> {
        let tree = self.data(handle)?;
        let mut ray = Ray::new(origin, direction);
        tree.intersect(&mut ray);
        Ok(ray.hit)
    }

    pub fn node_bytes(&self, handle: Handle) -> Result<&[u8]> {
        Ok(self.data(handle)?.nodes_as_bytes())
    }

    pub fn tri_bytes(&self, handle: Handle) -> Result<&[u8]> {
        Ok(self.data(handle)?.tris_as_bytes())
    }

    /// Number of live bottom-level trees.
    pub fn len(&self) -> usize {
        self.blas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a top-level tree over registered trees, one instance per
    /// `(handle, transform)` pair. Leaf indices follow the order of
    /// `instances`, and hits report that index in `inst`.
    pub fn build_tlas(&mut self, instances: &[(Handle, Matrix4<f32>)]) -> Result<TlasHandle> {
        let mut boxes = Vec::with_capacity(instances.len());
        let mut placed = Vec::with_capacity(instances.len());
        for (blas, transform) in instances {
            let tree = self.data(*blas)?;
            let inv_transform = transform.try_inverse().ok_or(BvhError::SingularTransform)?;
            boxes.push(tree.bounds().transform(transform));
            placed.push(PlacedBlas {
                blas: *blas,
                inv_transform,
            });
        }
        let mut bvh = Bvh::new();
        bvh.build_over_boxes(&boxes)?;
        let packed = bvh.packed_nodes();
        let handle = self.tlas.insert(RegisteredTlas {
            bvh,
            instances: placed,
            packed,
        });
        log::debug!(
            "registered top-level tree {} (generation {}) over {} instances",
            handle.index,
            handle.generation,
            instances.len()
        );
        Ok(TlasHandle(handle))
    }

    /// Frees a top-level tree. The trees it was built over are not touched.
    pub fn destroy_tlas(&mut self, handle: TlasHandle) -> Result<()> {
        self.tlas.remove(handle.0).map(|_| ())
    }

    pub fn is_tlas_ready(&self, handle: TlasHandle) -> bool {
        self.tlas.get(handle.0).is_ok()
    }

    /// Top-level nodes in the 32-byte upload layout. Leaves hold instance
    /// indices.
    pub fn tlas_node_bytes(&self, handle: TlasHandle) -> Result<&[u8]> {
        Ok(bytemuck::cast_slice(&self.tlas.get(handle.0)?.packed))
    }

    /// Traces a world-space ray through a top-level tree and the trees below
    /// it. Fails if the top-level handle or any instance's handle is stale.
    pub fn intersect_tlas(
        &self,
        handle: TlasHandle,
        origin: Point3<f32>,
        direction: Vector3<f32>,
    ) -> Result<Intersection> {
        let tlas = self.tlas.get(handle.0)?;
        let blas = tlas
            .instances
            .iter()
            .map(|placed| self.data(placed.blas))
            .collect::<Result<Vec<_>>>()?;
        let mut ray = Ray::new(origin, direction);
        tlas.bvh.traverse_with(&mut ray, |ray, idx| {
            let inv = &tlas.instances[idx as usize].inv_transform;
            let mut local = Ray::raw(
                inv.transform_point(&ray.origin),
                inv.transform_vector(&ray.direction),
                ray.hit,
            );
            blas[idx as usize].intersect(&mut local);
            if local.hit.t < ray.hit.t {
                ray.hit = local.hit;
                ray.hit.inst = idx;
            }
        });
        Ok(ray.hit)
    }

    /// Number of live top-level trees.
    pub fn tlas_len(&self) -> usize {
        self.tlas.len()
    }
}
