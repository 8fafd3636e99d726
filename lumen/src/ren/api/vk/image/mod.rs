use super::{buffer::Buffer, immediate::ImmediateManager};
use crate::{Result, ren::frame::deletion::Resource, vk_check};

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};

#[derive(Debug)]
pub struct Image {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub allocation: vka::Allocation,
}

pub fn mip_levels(extent: vk::Extent3D) -> u32 {
    u32::BITS - extent.width.max(extent.height).max(1).leading_zeros()
}

impl Image {
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        name: &str,
        format: vk::Format,
        extent: vk::Extent3D,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
    ) -> Result<Self> {
        let mip_levels = if mipmapped { mip_levels(extent) } else { 1 };
        let image_create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage);

        let handle = vk_check!(unsafe { device_handle.create_image(&image_create_info, None) })?;
        let requirements = unsafe { device_handle.get_image_memory_requirements(handle) };

        let allocation = match allocator.allocate(&vka::AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: vka::AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { device_handle.destroy_image(handle, None) };
                return Err(error.into());
            }
        };

        vk_check!(unsafe { device_handle.bind_image_memory(handle, allocation.memory(), allocation.offset()) })?;

        let aspect_mask = if format == vk::Format::D32_SFLOAT {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_create_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(handle)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1)
                    .aspect_mask(aspect_mask),
            );

        let view = vk_check!(unsafe { device_handle.create_image_view(&view_create_info, None) })?;

        Ok(Self { handle, view, extent, format, mip_levels, allocation })
    }

    /// Creates a sampled image and fills it with tightly packed RGBA8 `data` through a staging buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn with_data(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        immediate: &ImmediateManager,
        name: &str,
        data: &[u8],
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
    ) -> Result<Self> {
        let mut staging = Buffer::new(
            device_handle,
            allocator,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "image_staging",
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(error) = staging.upload(data, 0) {
            unsafe { device_handle.destroy_buffer(staging.handle, None) };
            allocator.free(staging.allocation)?;
            return Err(error);
        }

        let image = Self::new(
            device_handle,
            allocator,
            name,
            format,
            extent,
            usage | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            mipmapped,
        )?;

        let submitted = immediate.submit(device_handle, |command_buffer| {
            transition(device_handle, command_buffer, image.handle, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

            let regions = [vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent)];
            unsafe {
                device_handle.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle,
                    image.handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                )
            };

            if image.mip_levels > 1 {
                generate_mipmaps(device_handle, command_buffer, image.handle, extent, image.mip_levels);
            } else {
                transition(
                    device_handle,
                    command_buffer,
                    image.handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
        });

        unsafe { device_handle.destroy_buffer(staging.handle, None) };
        allocator.free(staging.allocation)?;
        submitted?;

        Ok(image)
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.extent.width, height: self.extent.height }
    }

    pub fn into_resource(self) -> Resource {
        Resource::Image { handle: self.handle, view: self.view, allocation: self.allocation }
    }
}

pub fn get_subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .base_array_layer(0)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

pub fn aspect_for(layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn transition(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let image_barriers = [vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(get_subresource_range(aspect_for(new_layout)))
        .image(image)];

    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&image_barriers);

    unsafe { device_handle.cmd_pipeline_barrier2(command_buffer, &dependency_info) };
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_array_layer(0)
        .layer_count(1)
        .mip_level(mip_level)
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D { x: extent.width as i32, y: extent.height as i32, z: 1 }
}

/// Scaled blit between two colour images already in transfer layouts.
pub fn copy(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    src_image: vk::Image,
    dst_image: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let regions = [vk::ImageBlit2::default()
        .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)])
        .src_subresource(color_layers(0))
        .dst_subresource(color_layers(0))];

    let blit_image_info = vk::BlitImageInfo2::default()
        .src_image(src_image)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst_image)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    unsafe { device_handle.cmd_blit_image2(command_buffer, &blit_image_info) };
}

/// Expects every level in `TRANSFER_DST_OPTIMAL`; leaves every level in `SHADER_READ_ONLY_OPTIMAL`.
fn generate_mipmaps(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent3D,
    mip_levels: u32,
) {
    let mut size = vk::Extent2D { width: extent.width, height: extent.height };

    for level in 0..mip_levels {
        let half = vk::Extent2D { width: (size.width / 2).max(1), height: (size.height / 2).max(1) };

        let barriers = [vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .subresource_range(
                get_subresource_range(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(level)
                    .level_count(1),
            )
            .image(image)];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { device_handle.cmd_pipeline_barrier2(command_buffer, &dependency_info) };

        if level + 1 < mip_levels {
            let regions = [vk::ImageBlit2::default()
                .src_offsets([vk::Offset3D::default(), far_corner(size)])
                .dst_offsets([vk::Offset3D::default(), far_corner(half)])
                .src_subresource(color_layers(level))
                .dst_subresource(color_layers(level + 1))];
            let blit_image_info = vk::BlitImageInfo2::default()
                .src_image(image)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_image(image)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .filter(vk::Filter::LINEAR)
                .regions(&regions);
            unsafe { device_handle.cmd_blit_image2(command_buffer, &blit_image_info) };
        }

        size = half;
    }

    transition(
        device_handle,
        command_buffer,
        image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_covers_the_largest_side() {
        let extent = |width, height| vk::Extent3D { width, height, depth: 1 };
        assert_eq!(mip_levels(extent(1, 1)), 1);
        assert_eq!(mip_levels(extent(16, 16)), 5);
        assert_eq!(mip_levels(extent(1024, 17)), 11);
        assert_eq!(mip_levels(extent(300, 700)), 10);
    }

    #[test]
    fn depth_layouts_select_the_depth_aspect() {
        assert_eq!(aspect_for(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for(vk::ImageLayout::GENERAL), vk::ImageAspectFlags::COLOR);
    }
}
