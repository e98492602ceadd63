use thiserror::Error;

/// Everything that can go wrong while building, converting or querying a hierarchy.
#[derive(Error, Debug)]
pub enum BvhError {
    /// A build was requested over zero primitives.
    #[error("cannot build a hierarchy over zero primitives")]
    EmptyInput,

    /// The vertex buffer does not hold whole triangles.
    #[error("vertex buffer holds {len} vertices, which is not a multiple of 3")]
    MalformedVertices { len: usize },

    #[error("hierarchy uses spatial splits or was built over boxes and cannot be refitted")]
    NotRefittable,

    #[error("node list has unused slots; compact the hierarchy before refitting")]
    HasHoles,

    /// The compressed layout needs at least one interior node.
    #[error("root node is a leaf; cannot encode a compressed wide hierarchy")]
    RootIsLeaf,

    /// The operation needs triangles, but the hierarchy was built over boxes.
    #[error("hierarchy was built over boxes and holds no triangles")]
    UnsupportedLayout,

    #[error("vertex count changed from {expected} to {found}")]
    VertexCountChanged { expected: usize, found: usize },

    #[error("instance transform is not invertible")]
    SingularTransform,

    /// A memory hook refused the request, or the allocator itself failed.
    #[error("allocation of {bytes} bytes was refused")]
    AllocationFailed { bytes: usize },

    #[error("handle {index} (generation {generation}) does not refer to a live hierarchy")]
    InvalidHandle { index: usize, generation: u64 },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, BvhError>;
