// src/scene.rs
//! Two-level assembly: one geometry tree per mesh, concatenated into a shared
//! node buffer, plus an instance tree over transformed mesh bounds.

use glam::{Mat4, Vec3};

use crate::bvh::{create_bvh, BuildConfig};
use crate::diagnostics::{self, Severity};
use crate::error::{to_i32, Error, Result};
use crate::flatten::{flatten_blas, flatten_tlas, FlatNode, MeshInstance};
use crate::primitives::AABB;
use crate::render_buffers::AccelerationBuffers;

#[derive(Clone, Debug)]
struct SceneInstance {
    mesh: usize,
    material_id: i32,
    transform: Mat4,
}

#[derive(Clone, Debug, Default)]
pub struct SceneBuilder {
    meshes: Vec<Vec<AABB>>,
    instances: Vec<SceneInstance>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh by its primitive bounds. Returns the mesh id.
    pub fn add_mesh(&mut self, primitives: Vec<AABB>) -> usize {
        self.meshes.push(primitives);
        self.meshes.len() - 1
    }

    /// Register an indexed triangle mesh. Triangles with an out-of-range
    /// vertex index are skipped.
    pub fn add_triangle_mesh(&mut self, vertices: &[Vec3], indices: &[u32]) -> usize {
        let mut boxes = Vec::with_capacity(indices.len() / 3);
        let mut skipped = 0;
        for tri in indices.chunks_exact(3) {
            let corner = |i: u32| vertices.get(i as usize).copied();
            match (corner(tri[0]), corner(tri[1]), corner(tri[2])) {
                (Some(v0), Some(v1), Some(v2)) => boxes.push(AABB::from_triangle(v0, v1, v2)),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            diagnostics::emit(
                Severity::Warning,
                &format!("skipped {skipped} triangles with out-of-range vertex indices"),
            );
        }
        self.add_mesh(boxes)
    }

    /// Place mesh `mesh` in the world. Returns the instance id, which is also
    /// its index in [`AccelerationBuffers::instances`].
    pub fn add_instance(&mut self, mesh: usize, material_id: i32, transform: Mat4) -> usize {
        self.instances.push(SceneInstance {
            mesh,
            material_id,
            transform,
        });
        self.instances.len() - 1
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn build(
        &self,
        blas_config: &BuildConfig,
        tlas_config: &BuildConfig,
    ) -> Result<AccelerationBuffers> {
        let mut out = AccelerationBuffers::new();
        let mut mesh_bounds = Vec::with_capacity(self.meshes.len());
        let mut input_offset = 0u32;

        // --- 1. Build every BLAS into the shared buffer ---
        for prims in &self.meshes {
            let mut handle = create_bvh(prims, blas_config)?;

            let node_offset = out.blas_nodes.len();
            let primitive_base = out.primitive_indices.len();
            let bvh = handle.get()?;
            out.blas_nodes
                .resize(node_offset + bvh.node_count(), FlatNode::default());
            flatten_blas(
                &handle,
                &mut out.blas_nodes[node_offset..],
                to_i32(node_offset)?,
                to_i32(primitive_base)?,
            )?;

            let bvh = handle.get()?;
            out.primitive_indices
                .extend(bvh.permutation().iter().map(|&p| p + input_offset));
            out.blas_root_offsets.push(to_i32(node_offset)? as u32);
            mesh_bounds.push(bvh.bounds());

            input_offset += to_i32(prims.len())? as u32;
            handle.destroy();
        }

        // --- 2. Instances ---
        let mut world_bounds = Vec::with_capacity(self.instances.len());
        for inst in &self.instances {
            let bounds = mesh_bounds.get(inst.mesh).ok_or(Error::UnknownMesh {
                mesh: inst.mesh,
                count: self.meshes.len(),
            })?;
            out.instances.push(MeshInstance {
                mesh_id: to_i32(inst.mesh)?,
                material_id: inst.material_id,
                bvh_start_index: out.blas_root_offsets[inst.mesh] as i32,
            });
            world_bounds.push(bounds.transform(inst.transform));
        }

        // --- 3. TLAS ---
        if world_bounds.is_empty() {
            diagnostics::emit(Severity::Warning, "scene has no instances, TLAS left empty");
        } else {
            let mut handle = create_bvh(&world_bounds, tlas_config)?;
            out.tlas_nodes
                .resize(handle.node_count()?, FlatNode::default());
            let written = flatten_tlas(&handle, &mut out.tlas_nodes, 0, &out.instances)?;
            out.tlas_nodes.truncate(written);
            handle.destroy();
        }

        diagnostics::emit(
            Severity::Info,
            &format!(
                "scene built: {} meshes, {} BLAS nodes, {} instances, {} TLAS nodes",
                self.meshes.len(),
                out.blas_nodes.len(),
                out.instances.len(),
                out.tlas_nodes.len()
            ),
        );
        Ok(out)
    }
}
