use super::{buffer::Buffer, immediate::ImmediateManager};
use crate::{Result, ren::frame::deletion::DeletionQueue, scene::mesh::GpuMeshBuffers};

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};
use lumen_gpu::{VERTEX_SIZE, Vertex};

pub const INDEX_SIZE: u64 = size_of::<u32>() as u64;

/// Room for the padding inserted between the vertex and index ranges of the staging buffer.
const STAGING_SLACK: u64 = 256;

/// Uploads geometry into device-local buffers through one staging copy. The new buffers are
/// registered in `deletion`; the staging buffer is released before returning.
pub fn upload_mesh(
    device_handle: &DeviceHandle,
    allocator: &mut vka::Allocator,
    immediate: &ImmediateManager,
    deletion: &mut DeletionQueue,
    indices: &[u32],
    vertices: &[Vertex],
) -> Result<GpuMeshBuffers> {
    let index_buffer_size = indices.len() as u64 * INDEX_SIZE;
    let vertex_buffer_size = vertices.len() as u64 * VERTEX_SIZE;

    let vertex_buffer = Buffer::new(
        device_handle,
        allocator,
        vertex_buffer_size,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        "mesh_vertices",
        MemoryLocation::GpuOnly,
    )?;
    let vertex_buffer_address = vertex_buffer.device_address(device_handle);
    let vertex_handle = vertex_buffer.handle;
    deletion.push(vertex_buffer.into_resource());

    let index_buffer = Buffer::new(
        device_handle,
        allocator,
        index_buffer_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        "mesh_indices",
        MemoryLocation::GpuOnly,
    )?;
    let index_handle = index_buffer.handle;
    deletion.push(index_buffer.into_resource());

    let mut staging = Buffer::new(
        device_handle,
        allocator,
        vertex_buffer_size + index_buffer_size + STAGING_SLACK,
        vk::BufferUsageFlags::TRANSFER_SRC,
        "mesh_staging",
        MemoryLocation::CpuToGpu,
    )?;

    let copied = staging.upload(vertices, 0).and_then(|vertices_record| {
        let indices_offset = vertices_record.copy_end_offset_padded;
        staging.upload(indices, indices_offset)?;

        immediate.submit(device_handle, |command_buffer| unsafe {
            if vertex_buffer_size > 0 {
                device_handle.cmd_copy_buffer(
                    command_buffer,
                    staging.handle,
                    vertex_handle,
                    &[vk::BufferCopy::default().src_offset(0).dst_offset(0).size(vertex_buffer_size)],
                );
            }
            if index_buffer_size > 0 {
                device_handle.cmd_copy_buffer(
                    command_buffer,
                    staging.handle,
                    index_handle,
                    &[vk::BufferCopy::default()
                        .src_offset(indices_offset as u64)
                        .dst_offset(0)
                        .size(index_buffer_size)],
                );
            }
        })
    });

    unsafe { device_handle.destroy_buffer(staging.handle, None) };
    allocator.free(staging.allocation)?;
    copied?;

    Ok(GpuMeshBuffers {
        index_buffer: index_handle,
        vertex_buffer: vertex_handle,
        vertex_buffer_address,
    })
}
