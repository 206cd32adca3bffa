// src/render_buffers.rs
use crate::error::{Error, Result};
use crate::flatten::{validate_nodes, FlatNode, MeshInstance};

/// Everything a traversal kernel needs, ready for upload.
///
/// `blas_nodes` holds every mesh tree back to back; mesh `i` starts at
/// `blas_root_offsets[i]`. Geometry leaves index `primitive_indices`, which
/// maps back to the caller's primitive order.
#[derive(Clone, Debug, Default)]
pub struct AccelerationBuffers {
    pub blas_nodes: Vec<FlatNode>,
    pub tlas_nodes: Vec<FlatNode>,
    pub instances: Vec<MeshInstance>,
    pub primitive_indices: Vec<u32>,
    pub blas_root_offsets: Vec<u32>,
}

impl AccelerationBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.blas_nodes.clear();
        self.tlas_nodes.clear();
        self.instances.clear();
        self.primitive_indices.clear();
        self.blas_root_offsets.clear();
    }

    pub fn blas_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blas_nodes)
    }

    pub fn tlas_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.tlas_nodes)
    }

    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.primitive_indices)
    }

    /// Node range `[start, end)` of mesh `mesh` inside `blas_nodes`.
    pub fn blas_range(&self, mesh: usize) -> Option<(usize, usize)> {
        let start = *self.blas_root_offsets.get(mesh)? as usize;
        let end = self
            .blas_root_offsets
            .get(mesh + 1)
            .map_or(self.blas_nodes.len(), |&e| e as usize);
        Some((start, end))
    }

    /// Check every mesh segment, the TLAS, and that each instance points at
    /// a mesh root.
    pub fn validate(&self) -> Result<()> {
        for mesh in 0..self.blas_root_offsets.len() {
            if let Some((start, end)) = self.blas_range(mesh) {
                validate_nodes(&self.blas_nodes[start..end], start, &[])?;
            }
        }
        validate_nodes(&self.tlas_nodes, 0, &self.instances)?;

        for inst in &self.instances {
            let mesh = inst.mesh_id as usize;
            let root = self.blas_root_offsets.get(mesh).ok_or(Error::UnknownMesh {
                mesh,
                count: self.blas_root_offsets.len(),
            })?;
            if *root as i32 != inst.bvh_start_index {
                return Err(Error::ReferenceOutOfRange {
                    node: mesh,
                    target: inst.bvh_start_index,
                    start: *root as usize,
                    end: *root as usize + 1,
                });
            }
        }
        Ok(())
    }
}
