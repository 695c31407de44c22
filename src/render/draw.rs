use wgpu::util::DeviceExt;

use crate::mesh::{MeshData, Vertex};
use crate::object::ObjectId;

/// Vertex layout shared by both passes: position at location 0, normal at 1.
pub const VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as u64,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: (3 * std::mem::size_of::<f32>()) as u64,
            shader_location: 1,
        },
    ],
};

pub struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    pub fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// One object to draw: its geometry and where its uniforms live.
pub struct Draw<'a> {
    pub id: ObjectId,
    pub mesh: &'a MeshBuffers,
    pub uniform_offset: u32,
}

impl Draw<'_> {
    pub(crate) fn record(&self, pass: &mut wgpu::RenderPass<'_>, objects: &wgpu::BindGroup) {
        pass.set_vertex_buffer(0, self.mesh.vertex.slice(..));
        pass.set_index_buffer(self.mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.set_bind_group(1, objects, &[self.uniform_offset]);
        pass.draw_indexed(0..self.mesh.index_count, 0, 0..1);
    }
}
