use std::mem::size_of_val;
use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::recorder::DrawCall;
use crate::renderer::contexts::pipeline_ctx::GraphicsPipeline;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::shader_data::Vertex;

pub const VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]), // Top left
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),  // Top right
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),   // Bottom right
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),  // Bottom left
];

pub const INDICES: [u16; 6] = [
    0, 1, 2,
    2, 3, 0,
];

/// Vertex and index buffers in host-visible memory
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn new_quad(dev: &RenderDevice) -> Result<Self> {
        Self::new(dev, &VERTICES, &INDICES)
    }

    pub fn new(
        dev: &RenderDevice,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<Self> {
        let mut vertex_buffer = Buffer::new(
            size_of_val(vertices) as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Vertex buffer",
            MemoryLocation::CpuToGpu,
            dev.memory_allocator()?,
            dev.logical.clone(),
        )?;
        vertex_buffer.write(vertices, 0)?;

        let mut index_buffer = Buffer::new(
            size_of_val(indices) as u64,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "Index buffer",
            MemoryLocation::CpuToGpu,
            dev.memory_allocator()?,
            dev.logical.clone(),
        )?;
        index_buffer.write(indices, 0)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn draw_call(&self, pipeline: &GraphicsPipeline) -> DrawCall {
        DrawCall {
            pipeline: pipeline.pipeline,
            layout: pipeline.layout,
            descriptor_set: None,
            vertex_buffer: self.vertex_buffer.buffer,
            index_buffer: Some((self.index_buffer.buffer, vk::IndexType::UINT16)),
            count: self.index_count,
        }
    }
}
