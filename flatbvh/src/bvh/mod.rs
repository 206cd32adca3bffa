// src/bvh/mod.rs
pub mod binned;
pub mod handle;
pub mod split;

pub use handle::BvhHandle;

use crate::diagnostics::{self, Severity};
use crate::error::{to_i32, Error, Result};
use crate::primitives::AABB;

// --- Build Parameters ---

/// Parameters handed to the tree builder.
///
/// `use_split` picks the spatial-split builder, otherwise the binned object
/// builder runs, with SAH binning when `use_sah` is set and a median split
/// when it is not.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildConfig {
    pub use_sah: bool,
    pub use_split: bool,
    /// Cost of one traversal step relative to one primitive test.
    pub traversal_cost: f32,
    pub num_bins: usize,
    /// Maximum tree depth at which spatial splits are still considered.
    pub split_depth: usize,
    /// Child overlap, as a fraction of the root area, above which a spatial
    /// split is attempted.
    pub min_overlap: f32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            use_sah: true,
            use_split: false,
            traversal_cost: 10.0,
            num_bins: 64,
            split_depth: 16,
            min_overlap: 0.05,
        }
    }
}

impl BuildConfig {
    /// Geometry trees: SAH with spatial splits.
    pub fn blas() -> Self {
        Self {
            use_sah: true,
            use_split: true,
            ..Default::default()
        }
    }

    /// Instance trees: plain median splits, one instance per leaf.
    pub fn tlas() -> Self {
        Self {
            use_sah: false,
            use_split: false,
            ..Default::default()
        }
    }

    pub fn with_sah(mut self, use_sah: bool) -> Self {
        self.use_sah = use_sah;
        self
    }

    pub fn with_split(mut self, use_split: bool) -> Self {
        self.use_split = use_split;
        self
    }

    pub fn with_traversal_cost(mut self, cost: f32) -> Self {
        self.traversal_cost = cost;
        self
    }

    pub fn with_num_bins(mut self, num_bins: usize) -> Self {
        self.num_bins = num_bins;
        self
    }

    pub fn with_split_depth(mut self, depth: usize) -> Self {
        self.split_depth = depth;
        self
    }

    pub fn with_min_overlap(mut self, overlap: f32) -> Self {
        self.min_overlap = overlap;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_bins < 2 {
            return Err(Error::InvalidConfig(format!(
                "num_bins must be at least 2, got {}",
                self.num_bins
            )));
        }
        if !self.traversal_cost.is_finite() || self.traversal_cost < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "traversal_cost must be finite and non-negative, got {}",
                self.traversal_cost
            )));
        }
        if !self.min_overlap.is_finite() || self.min_overlap < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_overlap must be finite and non-negative, got {}",
                self.min_overlap
            )));
        }
        Ok(())
    }
}

// --- Tree ---

/// Node of a built tree. Children are owned and dropped with their parent.
#[derive(Clone, Debug)]
pub enum TreeNode {
    Interior {
        bounds: AABB,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        bounds: AABB,
        /// Offset into the tree's primitive permutation.
        start: usize,
        count: usize,
    },
}

impl TreeNode {
    pub fn bounds(&self) -> &AABB {
        match self {
            TreeNode::Interior { bounds, .. } | TreeNode::Leaf { bounds, .. } => bounds,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    /// Number of nodes in this subtree, itself included.
    pub fn subtree_size(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Interior { left, right, .. } => 1 + left.subtree_size() + right.subtree_size(),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Interior { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// A built tree together with the metadata the linearizers need.
#[derive(Clone, Debug)]
pub struct Bvh {
    root: TreeNode,
    permutation: Vec<u32>,
    node_count: usize,
    bounds: AABB,
    primitive_count: usize,
}

impl Bvh {
    pub(crate) fn from_parts(
        root: TreeNode,
        permutation: Vec<u32>,
        node_count: usize,
        primitive_count: usize,
    ) -> Self {
        let bounds = *root.bounds();
        Self {
            root,
            permutation,
            node_count,
            bounds,
            primitive_count,
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Input primitive indices in leaf order. Spatial splits may list a
    /// primitive more than once.
    pub fn permutation(&self) -> &[u32] {
        &self.permutation
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    /// Number of boxes the tree was built from.
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    pub fn leaf_count(&self) -> usize {
        (self.node_count + 1) / 2
    }
}

// --- Builder Binding ---

/// Build a tree over `bounds`.
///
/// Nothing is returned unless construction succeeded for every primitive.
pub fn create_bvh(bounds: &[AABB], config: &BuildConfig) -> Result<BvhHandle> {
    config.validate()?;
    if bounds.is_empty() {
        return Err(Error::EmptyInput);
    }
    to_i32(bounds.len())?;
    if let Some(index) = bounds.iter().position(|b| !b.is_valid()) {
        return Err(Error::MalformedBounds { index });
    }

    let bvh = if config.use_split {
        split::SplitBuilder::new(bounds, config).build()
    } else {
        binned::BinnedBuilder::new(bounds, config).build()
    };

    diagnostics::emit(
        Severity::Info,
        &format!(
            "built {} BVH: {} primitives, {} nodes, depth {}",
            strategy_name(config),
            bounds.len(),
            bvh.node_count(),
            bvh.root().depth()
        ),
    );

    Ok(BvhHandle::new(bvh))
}

fn strategy_name(config: &BuildConfig) -> &'static str {
    match (config.use_split, config.use_sah) {
        (true, _) => "split",
        (false, true) => "sah",
        (false, false) => "median",
    }
}
