use crate::ren::draw::{DrawRecorder, MaterialInstance, MaterialPipeline};

use ash::{Device as DeviceHandle, vk};
use lumen_gpu::PushConstants;

/// Writes batched draws into a frame command buffer inside dynamic rendering.
pub struct VkRecorder<'a> {
    pub device: &'a DeviceHandle,
    pub command_buffer: vk::CommandBuffer,
    pub scene_set: vk::DescriptorSet,
    pub extent: vk::Extent2D,
}

impl DrawRecorder for VkRecorder<'_> {
    fn bind_pipeline(&mut self, pipeline: &MaterialPipeline) {
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D { offset: vk::Offset2D::default(), extent: self.extent }];

        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[self.scene_set],
                &[],
            );
            self.device.cmd_set_viewport(self.command_buffer, 0, &viewports);
            self.device.cmd_set_scissor(self.command_buffer, 0, &scissors);
        }
    }

    fn bind_material(&mut self, material: &MaterialInstance) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                material.pipeline.layout,
                1,
                &[material.material_set],
                &[],
            )
        };
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32)
        };
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, constants: &PushConstants) {
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                &constants.as_buffer(),
            )
        };
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, first_index, 0, 0)
        };
    }
}
