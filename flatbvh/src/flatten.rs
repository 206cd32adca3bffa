// src/flatten.rs
//! Tagged node encoding.
//!
//! Trees are written in pre-order: a node takes the next free slot, then its
//! whole left subtree is numbered, then its right subtree. The left child of
//! an interior node at `i` is therefore always `i + 1`, and the right child
//! follows the last node of the left subtree.
//!
//! Each [`FlatNode`] carries three integers whose meaning is selected by the
//! third one:
//!
//! | `lr_leaf[2]` | kind           | `lr_leaf[0]`               | `lr_leaf[1]`      |
//! |--------------|----------------|----------------------------|-------------------|
//! | `0`          | interior       | left child (global)        | right child       |
//! | `1`          | geometry leaf  | first primitive (global)   | primitive count   |
//! | `< 0`        | instance leaf  | root of the instanced BLAS | material id       |
//!
//! An instance leaf stores instance `i` as `-(i + 1)`. Any other value is a
//! corrupt buffer.
//!
//! Child references are offset by `global_index_offset` so independently
//! flattened trees can share one buffer; the nodes themselves are always
//! written from the start of the output slice.

use bytemuck::{Pod, Zeroable};

use crate::bvh::{BvhHandle, TreeNode};
use crate::error::{to_i32, Error, Result};
use crate::primitives::AABB;

pub const INTERIOR: i32 = 0;
pub const GEOMETRY_LEAF: i32 = 1;

/// GPU node record, 36 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlatNode {
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub lr_leaf: [i32; 3],
}

const _: () = assert!(std::mem::size_of::<FlatNode>() == 36);

/// Per-instance record referenced by TLAS leaves.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshInstance {
    pub mesh_id: i32,
    pub material_id: i32,
    /// Global index of the instanced BLAS root in the shared node buffer.
    pub bvh_start_index: i32,
}

/// Decoded form of [`FlatNode::lr_leaf`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Interior {
        left: i32,
        right: i32,
    },
    GeometryLeaf {
        first_primitive: i32,
        primitive_count: i32,
    },
    InstanceLeaf {
        bvh_start_index: i32,
        material_id: i32,
        instance: usize,
    },
}

impl NodeKind {
    pub fn encode(self) -> Result<[i32; 3]> {
        Ok(match self {
            NodeKind::Interior { left, right } => [left, right, INTERIOR],
            NodeKind::GeometryLeaf {
                first_primitive,
                primitive_count,
            } => [first_primitive, primitive_count, GEOMETRY_LEAF],
            NodeKind::InstanceLeaf {
                bvh_start_index,
                material_id,
                instance,
            } => [bvh_start_index, material_id, -to_i32(instance + 1)?],
        })
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Interior { .. })
    }
}

impl FlatNode {
    pub fn new(bounds: &AABB, kind: NodeKind) -> Result<Self> {
        Ok(Self {
            bounds_min: bounds.min.to_array(),
            bounds_max: bounds.max.to_array(),
            lr_leaf: kind.encode()?,
        })
    }

    pub fn bounds(&self) -> AABB {
        AABB::new(self.bounds_min.into(), self.bounds_max.into())
    }

    pub fn discriminant(&self) -> i32 {
        self.lr_leaf[2]
    }

    /// Decode the payload. `node` is only used to report where a corrupt
    /// discriminant was found.
    pub fn decode(&self, node: usize) -> Result<NodeKind> {
        let [x, y, d] = self.lr_leaf;
        match d {
            INTERIOR => Ok(NodeKind::Interior { left: x, right: y }),
            GEOMETRY_LEAF => Ok(NodeKind::GeometryLeaf {
                first_primitive: x,
                primitive_count: y,
            }),
            d if d < 0 => Ok(NodeKind::InstanceLeaf {
                bvh_start_index: x,
                material_id: y,
                instance: (-(d as i64) - 1) as usize,
            }),
            value => Err(Error::CorruptDiscriminant { node, value }),
        }
    }
}

// --- Leaf Policies ---

/// Encodes the payload of a leaf. `node` is the leaf's local index, `start`
/// and `count` the leaf's range in `permutation`.
pub trait LeafEncoder {
    fn encode_leaf(
        &self,
        node: usize,
        start: usize,
        count: usize,
        permutation: &[u32],
    ) -> Result<NodeKind>;
}

/// BLAS leaves: a contiguous primitive range, rebased by `primitive_base` so
/// several meshes can share one primitive buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometryLeaves {
    pub primitive_base: i32,
}

impl LeafEncoder for GeometryLeaves {
    fn encode_leaf(&self, _node: usize, start: usize, count: usize, _: &[u32]) -> Result<NodeKind> {
        let first_primitive = self
            .primitive_base
            .checked_add(to_i32(start)?)
            .ok_or(Error::IndexOverflow(start))?;
        Ok(NodeKind::GeometryLeaf {
            first_primitive,
            primitive_count: to_i32(count)?,
        })
    }
}

/// TLAS leaves: the permutation holds instance indices, one per leaf.
#[derive(Clone, Copy, Debug)]
pub struct InstanceLeaves<'a> {
    pub instances: &'a [MeshInstance],
}

impl LeafEncoder for InstanceLeaves<'_> {
    fn encode_leaf(
        &self,
        node: usize,
        start: usize,
        count: usize,
        permutation: &[u32],
    ) -> Result<NodeKind> {
        if count != 1 {
            return Err(Error::MultiInstanceLeaf { node, count });
        }
        let instance = permutation[start] as usize;
        let record = self
            .instances
            .get(instance)
            .ok_or(Error::InstanceOutOfRange {
                instance,
                count: self.instances.len(),
            })?;
        Ok(NodeKind::InstanceLeaf {
            bvh_start_index: record.bvh_start_index,
            material_id: record.material_id,
            instance,
        })
    }
}

// --- Linearization ---

/// Flatten a geometry tree. Returns the number of nodes written.
pub fn flatten_blas(
    handle: &BvhHandle,
    out: &mut [FlatNode],
    global_index_offset: i32,
    primitive_base: i32,
) -> Result<usize> {
    if primitive_base < 0 {
        return Err(Error::InvalidConfig(format!(
            "primitive base must be non-negative, got {primitive_base}"
        )));
    }
    flatten(handle, out, global_index_offset, &GeometryLeaves { primitive_base })
}

/// Flatten an instance tree. Returns the number of nodes written.
pub fn flatten_tlas(
    handle: &BvhHandle,
    out: &mut [FlatNode],
    global_index_offset: i32,
    instances: &[MeshInstance],
) -> Result<usize> {
    flatten(handle, out, global_index_offset, &InstanceLeaves { instances })
}

/// Flatten with an arbitrary leaf policy.
pub fn flatten<E: LeafEncoder>(
    handle: &BvhHandle,
    out: &mut [FlatNode],
    global_index_offset: i32,
    leaves: &E,
) -> Result<usize> {
    let bvh = handle.get()?;
    let needed = bvh.node_count();
    if out.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            actual: out.len(),
        });
    }
    if global_index_offset < 0 {
        return Err(Error::InvalidConfig(format!(
            "global index offset must be non-negative, got {global_index_offset}"
        )));
    }
    global_index_offset
        .checked_add(to_i32(needed)?)
        .ok_or(Error::IndexOverflow(needed))?;

    let mut cursor = 0;
    encode_node(
        bvh.root(),
        bvh.permutation(),
        out,
        &mut cursor,
        global_index_offset,
        leaves,
    )?;
    Ok(cursor)
}

fn encode_node<E: LeafEncoder>(
    node: &TreeNode,
    permutation: &[u32],
    out: &mut [FlatNode],
    cursor: &mut usize,
    offset: i32,
    leaves: &E,
) -> Result<usize> {
    let index = *cursor;
    *cursor += 1;

    let kind = match node {
        TreeNode::Leaf { start, count, .. } => {
            leaves.encode_leaf(index, *start, *count, permutation)?
        }
        TreeNode::Interior { left, right, .. } => {
            let l = encode_node(left, permutation, out, cursor, offset, leaves)?;
            let r = encode_node(right, permutation, out, cursor, offset, leaves)?;
            NodeKind::Interior {
                left: to_i32(l)? + offset,
                right: to_i32(r)? + offset,
            }
        }
    };

    let actual = out.len();
    let slot = out.get_mut(index).ok_or(Error::BufferTooSmall {
        needed: index + 1,
        actual,
    })?;
    *slot = FlatNode::new(node.bounds(), kind)?;
    Ok(index)
}

// --- Validation ---

/// Check a segment of a shared buffer that starts at global index
/// `range_start`: every discriminant decodes, every child reference points
/// forward and stays inside the segment, and every instance leaf names an
/// entry of `instances`.
pub fn validate_nodes(
    nodes: &[FlatNode],
    range_start: usize,
    instances: &[MeshInstance],
) -> Result<()> {
    let end = range_start + nodes.len();
    for (i, node) in nodes.iter().enumerate() {
        let global = range_start + i;
        match node.decode(global)? {
            NodeKind::Interior { left, right } => {
                for target in [left, right] {
                    let ok = usize::try_from(target).is_ok_and(|t| t > global && t < end);
                    if !ok {
                        return Err(Error::ReferenceOutOfRange {
                            node: global,
                            target,
                            start: range_start,
                            end,
                        });
                    }
                }
            }
            NodeKind::InstanceLeaf { instance, .. } if instance >= instances.len() => {
                return Err(Error::InstanceOutOfRange {
                    instance,
                    count: instances.len(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}
