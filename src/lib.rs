//! Bounding volume hierarchies for ray tracing triangle meshes: binned SAH
//! and spatial-split builders, refitting, 8-wide collapse, a compressed
//! GPU-ready node format, and the traversals that consume each layout.

extern crate nalgebra as na;

pub mod bvh;
pub mod camera;
pub mod config;
pub mod error;
pub mod objects;
pub mod registry;
pub mod scenes;
pub mod types;

pub use bvh::bbox::BBox;
pub use bvh::compressed::{ChildRef, CompressedBvh, CompressedNode, TriPayload};
pub use bvh::context::{BuildContext, ByteBudget, MemoryHooks};
pub use bvh::packet::PACKET_SIZE;
pub use bvh::wide::{Bvh8, WideNode};
pub use bvh::{BuildKind, Bvh, BvhNode, Fragment, PackedNode};
pub use error::{BvhError, Result};
pub use objects::instance::{BlasInstance, Tlas};
pub use objects::{Hittable, TriangleSoup};
pub use registry::{Handle, Registry, TlasHandle};
pub use types::ray::{Intersection, Ray};
