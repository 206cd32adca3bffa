// src/lib.rs
//! Bounding volume hierarchy construction and linearization for GPU traversal.
//!
//! Trees are built over axis-aligned boxes by [`bvh::create_bvh`] and written
//! out in pre-order, either as tagged [`FlatNode`]s for two-level
//! (BLAS/TLAS) buffers or as explicit-index [`LinearBvhNode`]s.

pub mod bvh;
pub mod diagnostics;
pub mod error;
pub mod flat_bvh;
pub mod flatten;
pub mod linear;
pub mod primitives;
pub mod render_buffers;
pub mod scene;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use bvh::{create_bvh, BuildConfig, Bvh, BvhHandle, TreeNode};
pub use diagnostics::{register_log_callback, unregister_log_callback, Severity};
pub use error::{Error, Result};
pub use flat_bvh::FlatBvh;
pub use flatten::{flatten_blas, flatten_tlas, validate_nodes, FlatNode, MeshInstance, NodeKind};
pub use linear::{flatten_linear, LinearBvhNode};
pub use primitives::AABB;
pub use render_buffers::AccelerationBuffers;
pub use scene::SceneBuilder;
