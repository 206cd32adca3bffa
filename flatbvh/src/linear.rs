// src/linear.rs
use bytemuck::{Pod, Zeroable};

use crate::bvh::{Bvh, BvhHandle, TreeNode};
use crate::error::{to_i32, Error, Result};
use crate::primitives::AABB;

/// Node with explicit child links.
///
/// Leaf: `primitive_count > 0`, both children `-1`.
/// Interior: `primitive_count == 0`, both children index the same array.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LinearBvhNode {
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub left_child: i32,
    pub right_child: i32,
    pub first_primitive: i32,
    pub primitive_count: i32,
}

const _: () = assert!(std::mem::size_of::<LinearBvhNode>() == 40);

impl Default for LinearBvhNode {
    fn default() -> Self {
        Self {
            bounds_min: [0.0; 3],
            bounds_max: [0.0; 3],
            left_child: -1,
            right_child: -1,
            first_primitive: 0,
            primitive_count: 0,
        }
    }
}

impl LinearBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.primitive_count > 0
    }

    pub fn bounds(&self) -> AABB {
        AABB::new(self.bounds_min.into(), self.bounds_max.into())
    }

    /// `(left, right)` for interior nodes.
    pub fn children(&self) -> Option<(usize, usize)> {
        if self.is_leaf() {
            return None;
        }
        Some((self.left_child as usize, self.right_child as usize))
    }
}

/// Write the tree behind `handle` into `out` in pre-order. Returns the number
/// of nodes written.
pub fn flatten_linear(handle: &BvhHandle, out: &mut [LinearBvhNode]) -> Result<usize> {
    let bvh = handle.get()?;
    let needed = bvh.node_count();
    if out.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            actual: out.len(),
        });
    }
    to_i32(needed)?;

    let mut offset = 0;
    flatten_node(bvh.root(), &mut offset, out)?;
    Ok(offset)
}

impl Bvh {
    pub fn to_linear(&self) -> Result<Vec<LinearBvhNode>> {
        to_i32(self.node_count())?;
        let mut nodes = vec![LinearBvhNode::default(); self.node_count()];
        let mut offset = 0;
        flatten_node(self.root(), &mut offset, &mut nodes)?;
        nodes.truncate(offset);
        Ok(nodes)
    }
}

// Returns the slot given to `node`; `offset` is the next free slot.
fn flatten_node(node: &TreeNode, offset: &mut usize, out: &mut [LinearBvhNode]) -> Result<i32> {
    let my_offset = *offset;
    *offset += 1;

    let bounds = node.bounds();
    let mut linear = LinearBvhNode {
        bounds_min: bounds.min.to_array(),
        bounds_max: bounds.max.to_array(),
        ..Default::default()
    };
    match node {
        TreeNode::Leaf { start, count, .. } => {
            linear.first_primitive = to_i32(*start)?;
            linear.primitive_count = to_i32(*count)?;
        }
        TreeNode::Interior { left, right, .. } => {
            linear.left_child = flatten_node(left, offset, out)?;
            linear.right_child = flatten_node(right, offset, out)?;
        }
    }

    let actual = out.len();
    *out.get_mut(my_offset).ok_or(Error::BufferTooSmall {
        needed: my_offset + 1,
        actual,
    })? = linear;
    to_i32(my_offset)
}
