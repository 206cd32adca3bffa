// src/flat_bvh.rs
//! Build-and-flatten in one step, plus a binary cache for the result.
//!
//! Cache layout, all little-endian:
//!
//! ```text
//! f32 x 3   bounds min
//! f32 x 3   bounds max
//! u32       node count
//! node count x (f32 x 6, i32 x 3)   FlatNode records
//! u32       index count
//! index count x u32                 sorted primitive indices
//! ```
//!
//! The explicit-index nodes are not cached; they are cheap to rebuild from a
//! tree but not from the flat records.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;

use crate::bvh::{create_bvh, BuildConfig, BvhHandle};
use crate::error::{Error, Result};
use crate::flatten::{flatten_blas, flatten_tlas, FlatNode, MeshInstance};
use crate::linear::LinearBvhNode;
use crate::primitives::AABB;

// Caps up-front allocation when a cache header lies about its counts.
const MAX_PREALLOC: usize = 1 << 20;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatBvh {
    pub bounds: AABB,
    pub nodes: Vec<FlatNode>,
    pub sorted_indices: Vec<u32>,
    pub linear_nodes: Vec<LinearBvhNode>,
}

impl FlatBvh {
    /// Build a geometry tree over `bounds` and flatten it for a shared buffer
    /// where it will start at `node_offset` and its primitives at
    /// `primitive_base`.
    pub fn blas(
        bounds: &[AABB],
        config: &BuildConfig,
        primitive_base: i32,
        node_offset: i32,
    ) -> Result<Self> {
        let handle = create_bvh(bounds, config)?;
        Self::from_handle(handle, |h, out| {
            flatten_blas(h, out, node_offset, primitive_base)
        })
    }

    /// Build an instance tree over per-instance world bounds.
    pub fn tlas(
        bounds: &[AABB],
        config: &BuildConfig,
        instances: &[MeshInstance],
        node_offset: i32,
    ) -> Result<Self> {
        let handle = create_bvh(bounds, config)?;
        Self::from_handle(handle, |h, out| flatten_tlas(h, out, node_offset, instances))
    }

    fn from_handle<F>(mut handle: BvhHandle, flatten: F) -> Result<Self>
    where
        F: FnOnce(&BvhHandle, &mut [FlatNode]) -> Result<usize>,
    {
        let bvh = handle.get()?;
        let mut nodes = vec![FlatNode::default(); bvh.node_count()];
        let flat = Self {
            bounds: bvh.bounds(),
            sorted_indices: bvh.permutation().to_vec(),
            linear_nodes: bvh.to_linear()?,
            nodes: Vec::new(),
        };
        let written = flatten(&handle, &mut nodes)?;
        nodes.truncate(written);
        handle.destroy();
        Ok(Self { nodes, ..flat })
    }

    pub fn is_valid(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        write_vec3(&mut w, self.bounds.min)?;
        write_vec3(&mut w, self.bounds.max)?;

        w.write_u32::<LittleEndian>(count_u32(self.nodes.len())?)?;
        for node in &self.nodes {
            for v in node.bounds_min.iter().chain(&node.bounds_max) {
                w.write_f32::<LittleEndian>(*v)?;
            }
            for v in node.lr_leaf {
                w.write_i32::<LittleEndian>(v)?;
            }
        }

        w.write_u32::<LittleEndian>(count_u32(self.sorted_indices.len())?)?;
        for &i in &self.sorted_indices {
            w.write_u32::<LittleEndian>(i)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let min = read_vec3(&mut r)?;
        let max = read_vec3(&mut r)?;

        let node_count = r.read_u32::<LittleEndian>()? as usize;
        let mut nodes = Vec::with_capacity(node_count.min(MAX_PREALLOC));
        for i in 0..node_count {
            let mut node = FlatNode::default();
            for v in node.bounds_min.iter_mut().chain(node.bounds_max.iter_mut()) {
                *v = r.read_f32::<LittleEndian>()?;
            }
            for v in node.lr_leaf.iter_mut() {
                *v = r.read_i32::<LittleEndian>()?;
            }
            node.decode(i)
                .map_err(|e| Error::InvalidCache(e.to_string()))?;
            nodes.push(node);
        }

        let index_count = r.read_u32::<LittleEndian>()? as usize;
        let mut sorted_indices = Vec::with_capacity(index_count.min(MAX_PREALLOC));
        for _ in 0..index_count {
            sorted_indices.push(r.read_u32::<LittleEndian>()?);
        }

        Ok(Self {
            bounds: AABB::new(min, max),
            nodes,
            sorted_indices,
            linear_nodes: Vec::new(),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidCache("refusing to save an empty BVH".into()));
        }
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut w)?;
        w.flush()?;
        log::debug!(
            "saved {} BVH nodes to {}",
            self.nodes.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let r = BufReader::new(File::open(path.as_ref())?);
        Self::read_from(r)
    }
}

fn count_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::IndexOverflow(n))
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> Result<()> {
    for c in v.to_array() {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

fn read_vec3<R: Read>(r: &mut R) -> Result<Vec3> {
    let x = r.read_f32::<LittleEndian>()?;
    let y = r.read_f32::<LittleEndian>()?;
    let z = r.read_f32::<LittleEndian>()?;
    Ok(Vec3::new(x, y, z))
}
