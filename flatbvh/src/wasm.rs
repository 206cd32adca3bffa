// src/wasm.rs
use glam::{Mat4, Vec3};
use wasm_bindgen::prelude::*;

use crate::bvh::BuildConfig;
use crate::render_buffers::AccelerationBuffers;
use crate::scene::SceneBuilder;

#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Scene handed in from JS as flat arrays, flattened once on construction.
#[wasm_bindgen]
pub struct AccelerationWorld {
    builder: SceneBuilder,
    buffers: AccelerationBuffers,
}

#[wasm_bindgen]
impl AccelerationWorld {
    #[wasm_bindgen(constructor)]
    pub fn new() -> AccelerationWorld {
        AccelerationWorld {
            builder: SceneBuilder::new(),
            buffers: AccelerationBuffers::new(),
        }
    }

    /// `positions` is xyz triples, `indices` triangle corners.
    pub fn add_mesh(&mut self, positions: &[f32], indices: &[u32]) -> usize {
        let vertices: Vec<Vec3> = positions.chunks_exact(3).map(Vec3::from_slice).collect();
        self.builder.add_triangle_mesh(&vertices, indices)
    }

    /// `transform` is a column-major 4x4 matrix; anything shorter is identity.
    pub fn add_instance(&mut self, mesh: usize, material_id: i32, transform: &[f32]) -> usize {
        let m = if transform.len() >= 16 {
            Mat4::from_cols_slice(transform)
        } else {
            Mat4::IDENTITY
        };
        self.builder.add_instance(mesh, material_id, m)
    }

    pub fn build(&mut self) -> Result<(), JsError> {
        self.buffers = self.builder.build(&BuildConfig::blas(), &BuildConfig::tlas())?;
        Ok(())
    }

    // Pointers
    pub fn tlas_ptr(&self) -> *const u8 {
        self.buffers.tlas_bytes().as_ptr()
    }
    pub fn tlas_len(&self) -> usize {
        self.buffers.tlas_bytes().len()
    }
    pub fn blas_ptr(&self) -> *const u8 {
        self.buffers.blas_bytes().as_ptr()
    }
    pub fn blas_len(&self) -> usize {
        self.buffers.blas_bytes().len()
    }
    pub fn instances_ptr(&self) -> *const u8 {
        self.buffers.instance_bytes().as_ptr()
    }
    pub fn instances_len(&self) -> usize {
        self.buffers.instance_bytes().len()
    }
    pub fn indices_ptr(&self) -> *const u8 {
        self.buffers.index_bytes().as_ptr()
    }
    pub fn indices_len(&self) -> usize {
        self.buffers.index_bytes().len()
    }
}

impl Default for AccelerationWorld {
    fn default() -> Self {
        Self::new()
    }
}
