//! Error types for BVH construction and linearization.

use thiserror::Error;

/// Main error type for flatbvh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Builder was given no primitives
    #[error("Cannot build a BVH from zero primitives")]
    EmptyInput,

    /// A primitive box is inverted or contains a non-finite coordinate
    #[error("Malformed bounding box at primitive {index}")]
    MalformedBounds { index: usize },

    /// Build parameters out of range
    #[error("Invalid build config: {0}")]
    InvalidConfig(String),

    /// Handle was already destroyed
    #[error("BVH handle has been destroyed")]
    InvalidHandle,

    /// Output slice shorter than the tree's node count
    #[error("Output buffer too small: need {needed} nodes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// Flat node carries a discriminant outside {0, 1, negative}
    #[error("Corrupt discriminant {value} at node {node}")]
    CorruptDiscriminant { node: usize, value: i32 },

    /// TLAS permutation points past the instance table
    #[error("Instance index {instance} out of range (count: {count})")]
    InstanceOutOfRange { instance: usize, count: usize },

    /// TLAS leaf holds more than one instance
    #[error("TLAS leaf at node {node} holds {count} instances, expected 1")]
    MultiInstanceLeaf { node: usize, count: usize },

    /// Child reference points outside the node range it belongs to
    #[error("Node {node} references {target}, outside [{start}, {end})")]
    ReferenceOutOfRange {
        node: usize,
        target: i32,
        start: usize,
        end: usize,
    },

    /// Index does not fit the 32-bit GPU encoding
    #[error("Index {0} does not fit in a 32-bit node field")]
    IndexOverflow(usize),

    /// Instance refers to a mesh that was never added
    #[error("Mesh {mesh} out of range (count: {count})")]
    UnknownMesh { mesh: usize, count: usize },

    /// Cached BVH file is truncated or inconsistent
    #[error("Invalid BVH cache: {0}")]
    InvalidCache(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for flatbvh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Narrow a host index to the 32-bit field width used on the GPU.
pub(crate) fn to_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::IndexOverflow(value))
}
