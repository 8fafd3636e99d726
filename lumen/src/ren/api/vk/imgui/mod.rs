//! Dear ImGui draw data rendered with the same vertex-pulling scheme as meshes.

use super::{
    OverlayContext,
    buffer::Buffer,
    descriptor::{DescriptorAllocator, DescriptorSetLayoutBuilder, DescriptorWriter, PoolSizeRatio},
    image::Image,
    immediate::ImmediateManager,
    pipeline::{self, PipelineBuilder, shader::ShaderCompiler},
};
use crate::{
    Result,
    ren::frame::deletion::{DeletionQueue, Resource},
    vk_check,
};

use ash::{
    Device as DeviceHandle,
    vk::{self, Handle},
};
use glam::Vec2;
use gpu_allocator::{MemoryLocation, vulkan as vka};
use imgui::{DrawCmd, DrawCmdParams, DrawData, DrawIdx, DrawVert, TextureId};
use lumen_gpu::OverlayPushConstants;
use std::path::Path;

const OVERLAY_DESCRIPTOR_SETS: u32 = 16;
const OVERLAY_POOL_RATIOS: [PoolSizeRatio; 1] = [PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1.0)];

/// Maps logical UI coordinates to clip space.
pub fn push_constants(display_pos: [f32; 2], display_size: [f32; 2], vertex_buffer_address: u64) -> OverlayPushConstants {
    let scale = Vec2::new(2.0 / display_size[0], 2.0 / display_size[1]);
    OverlayPushConstants {
        scale,
        translate: Vec2::NEG_ONE - Vec2::from_array(display_pos) * scale,
        vertex_buffer_address,
    }
}

/// Framebuffer-space scissor for a clip rectangle, or `None` when nothing is left to draw.
pub fn scissor(clip_rect: [f32; 4], display_pos: [f32; 2], scale: [f32; 2], extent: vk::Extent2D) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - display_pos[0]) * scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - display_pos[1]) * scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - display_pos[0]) * scale[0]).min(extent.width as f32);
    let max_y = ((clip_rect[3] - display_pos[1]) * scale[1]).min(extent.height as f32);

    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D { x: min_x as i32, y: min_y as i32 },
        extent: vk::Extent2D { width: (max_x - min_x) as u32, height: (max_y - min_y) as u32 },
    })
}

pub struct OverlayRenderer {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    font_set: vk::DescriptorSet,
}

impl OverlayRenderer {
    /// Uploads the font atlas and builds the overlay pipeline. Every object created here is
    /// handed to `deletion`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &mut imgui::Context,
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        immediate: &ImmediateManager,
        deletion: &mut DeletionQueue,
        compiler: &impl ShaderCompiler,
        shader_dir: &Path,
        color_format: vk::Format,
    ) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .min_lod(-1000.0)
            .max_lod(1000.0);
        let sampler = vk_check!(unsafe { device_handle.create_sampler(&create_info, None) })?;
        deletion.push(Resource::Sampler(sampler));

        let set_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(device_handle, vk::ShaderStageFlags::FRAGMENT, None)?;
        deletion.push(Resource::DescriptorSetLayout(set_layout));

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<OverlayPushConstants>() as u32)];
        let layout = pipeline::create_pipeline_layout(device_handle, &[set_layout], &push_constant_ranges)?;
        deletion.push(Resource::PipelineLayout(layout));

        let vertex_code = compiler.compile(Path::new("overlay.vert"), shader_dir)?;
        let fragment_code = compiler.compile(Path::new("overlay.frag"), shader_dir)?;
        let vertex = pipeline::load_shader_module(device_handle, &vertex_code)?;
        deletion.push(Resource::ShaderModule(vertex));
        let fragment = pipeline::load_shader_module(device_handle, &fragment_code)?;
        deletion.push(Resource::ShaderModule(fragment));

        let pipeline = PipelineBuilder::new()
            .set_shaders(vertex, fragment)
            .set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .set_polygon_mode(vk::PolygonMode::FILL)
            .set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE)
            .set_multisampling_none()
            .enable_blending_alpha()
            .disable_depth_test()
            .set_color_attachment_format(color_format)
            .set_layout(layout)
            .build(device_handle)?;
        deletion.push(Resource::Pipeline(pipeline));

        // Font atlas
        let fonts = context.fonts();
        let atlas = fonts.build_rgba32_texture();
        let font_image = Image::with_data(
            device_handle,
            allocator,
            immediate,
            "overlay_font_atlas",
            atlas.data,
            vk::Extent3D { width: atlas.width, height: atlas.height, depth: 1 },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
            false,
        )?;
        let font_view = font_image.view;
        deletion.push(font_image.into_resource());

        let mut descriptors = DescriptorAllocator::new(device_handle, OVERLAY_DESCRIPTOR_SETS, &OVERLAY_POOL_RATIOS)?;
        let font_set = descriptors.allocate(device_handle, set_layout);
        deletion.push(descriptors.into_resource());
        let font_set = font_set?;

        let mut writer = DescriptorWriter::new();
        writer.write_image(
            0,
            font_view,
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        writer.update_set(device_handle, font_set);

        fonts.tex_id = TextureId::new(font_set.as_raw() as usize);

        Ok(Self { pipeline, layout, font_set })
    }

    /// Records `draw_data` into the active rendering scope. Geometry buffers are released
    /// through the frame's deletion queue.
    pub fn draw(&mut self, draw_data: &DrawData, ctx: &mut OverlayContext<'_>) -> Result<()> {
        if draw_data.total_idx_count <= 0 || draw_data.display_size[0] <= 0.0 || draw_data.display_size[1] <= 0.0 {
            return Ok(());
        }

        let vertices: Vec<DrawVert> = draw_data
            .draw_lists()
            .flat_map(|list| list.vtx_buffer().iter().copied())
            .collect();
        let indices: Vec<DrawIdx> = draw_data
            .draw_lists()
            .flat_map(|list| list.idx_buffer().iter().copied())
            .collect();

        let mut vertex_buffer = Buffer::new(
            ctx.device,
            ctx.allocator,
            size_of_val(vertices.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            "overlay_vertices",
            MemoryLocation::CpuToGpu,
        )?;
        let vertices_uploaded = vertex_buffer.upload(&vertices, 0);
        let vertex_buffer_address = vertex_buffer.device_address(ctx.device);
        ctx.deletion.push(vertex_buffer.into_resource());
        vertices_uploaded?;

        let mut index_buffer = Buffer::new(
            ctx.device,
            ctx.allocator,
            size_of_val(indices.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "overlay_indices",
            MemoryLocation::CpuToGpu,
        )?;
        let indices_uploaded = index_buffer.upload(&indices, 0);
        let index_handle = index_buffer.handle;
        ctx.deletion.push(index_buffer.into_resource());
        indices_uploaded?;

        let device = ctx.device;
        let cmd = ctx.command_buffer;
        let constants = push_constants(draw_data.display_pos, draw_data.display_size, vertex_buffer_address);
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: ctx.extent.width as f32,
            height: ctx.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];

        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_bind_index_buffer(cmd, index_handle, 0, vk::IndexType::UINT16);
            device.cmd_set_viewport(cmd, 0, &viewports);
            device.cmd_push_constants(
                cmd,
                self.layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&constants),
            );
        }

        let mut bound_set = None;
        let mut vertex_base = 0;
        let mut index_base = 0;

        for list in draw_data.draw_lists() {
            for command in list.commands() {
                let DrawCmd::Elements { count, cmd_params } = command else {
                    continue;
                };
                let DrawCmdParams { clip_rect, texture_id, vtx_offset, idx_offset, .. } = cmd_params;

                let Some(scissor) = scissor(clip_rect, draw_data.display_pos, draw_data.framebuffer_scale, ctx.extent)
                else {
                    continue;
                };

                let set = match texture_id.id() {
                    0 => self.font_set,
                    raw => vk::DescriptorSet::from_raw(raw as u64),
                };
                unsafe {
                    if bound_set != Some(set) {
                        bound_set = Some(set);
                        device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, self.layout, 0, &[set], &[]);
                    }
                    device.cmd_set_scissor(cmd, 0, &[scissor]);
                    device.cmd_draw_indexed(
                        cmd,
                        count as u32,
                        1,
                        (index_base + idx_offset) as u32,
                        (vertex_base + vtx_offset) as i32,
                        0,
                    );
                }
            }

            vertex_base += list.vtx_buffer().len();
            index_base += list.idx_buffer().len();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_map_display_corners_to_clip_space() {
        let constants = push_constants([10.0, 20.0], [200.0, 100.0], 0x40);

        let top_left = Vec2::new(10.0, 20.0) * constants.scale + constants.translate;
        let bottom_right = Vec2::new(210.0, 120.0) * constants.scale + constants.translate;

        assert!(top_left.abs_diff_eq(Vec2::NEG_ONE, 1e-6));
        assert!(bottom_right.abs_diff_eq(Vec2::ONE, 1e-6));
        assert_eq!(constants.vertex_buffer_address, 0x40);
    }

    #[test]
    fn scissor_is_scaled_and_clamped() {
        let extent = vk::Extent2D { width: 800, height: 600 };

        let rect = scissor([-10.0, 5.0, 100.0, 1000.0], [0.0, 0.0], [2.0, 2.0], extent).unwrap();
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 10 });
        assert_eq!(rect.extent, vk::Extent2D { width: 200, height: 590 });
    }

    #[test]
    fn empty_clip_rect_is_skipped() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        assert!(scissor([50.0, 50.0, 50.0, 80.0], [0.0, 0.0], [1.0, 1.0], extent).is_none());
        assert!(scissor([900.0, 0.0, 1000.0, 10.0], [0.0, 0.0], [1.0, 1.0], extent).is_none());
    }
}
