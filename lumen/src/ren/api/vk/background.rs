use super::pipeline::{self, shader::ShaderCompiler};
use crate::{
    Result,
    ren::frame::deletion::{DeletionQueue, Destroy, Resource},
};

use ash::{Device as DeviceHandle, vk};
use glam::Vec4;
use lumen_gpu::BackgroundPushConstants;
use std::path::Path;

/// Workgroup edge of the background compute shaders.
pub const WORKGROUP_SIZE: u32 = 16;

pub fn dispatch_size(extent: vk::Extent2D) -> (u32, u32) {
    (extent.width.div_ceil(WORKGROUP_SIZE), extent.height.div_ceil(WORKGROUP_SIZE))
}

/// Compute pass that fills the draw image before geometry is rendered.
pub struct ComputeEffect {
    pub name: &'static str,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub data: BackgroundPushConstants,
}

impl ComputeEffect {
    /// Vertical blend from `data1` at the top edge to `data2` at the bottom.
    pub fn gradient(
        device_handle: &DeviceHandle,
        destroyer: &mut impl Destroy,
        compiler: &impl ShaderCompiler,
        shader_dir: &Path,
        draw_image_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let code = compiler.compile(Path::new("gradient.comp"), shader_dir)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<BackgroundPushConstants>() as u32)];
        let layout = pipeline::create_pipeline_layout(device_handle, &[draw_image_layout], &push_constant_ranges)?;
        let mut pending = DeletionQueue::new();
        pending.push(Resource::PipelineLayout(layout));

        let module = pending.release_on_error(destroyer, pipeline::load_shader_module(device_handle, &code))?;
        pending.push(Resource::ShaderModule(module));
        let pipeline = pending.release_on_error(destroyer, pipeline::create_compute_pipeline(device_handle, module, layout))?;
        unsafe { device_handle.destroy_shader_module(module, None) };

        Ok(Self {
            name: "gradient",
            pipeline,
            layout,
            data: BackgroundPushConstants {
                data1: Vec4::new(0.0, 0.0, 0.0, 1.0),
                data2: Vec4::new(0.05, 0.05, 0.12, 1.0),
                ..Default::default()
            },
        })
    }

    pub fn record(
        &self,
        device_handle: &DeviceHandle,
        command_buffer: vk::CommandBuffer,
        draw_image_set: vk::DescriptorSet,
        extent: vk::Extent2D,
    ) {
        let (groups_x, groups_y) = dispatch_size(extent);
        unsafe {
            device_handle.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::COMPUTE, self.pipeline);
            device_handle.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.layout,
                0,
                &[draw_image_set],
                &[],
            );
            device_handle.cmd_push_constants(
                command_buffer,
                self.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&self.data),
            );
            device_handle.cmd_dispatch(command_buffer, groups_x, groups_y, 1);
        }
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            device_handle.destroy_pipeline(self.pipeline, None);
            device_handle.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(dispatch_size(vk::Extent2D { width: 1700, height: 900 }), (107, 57));
        assert_eq!(dispatch_size(vk::Extent2D { width: 16, height: 1 }), (1, 1));
        assert_eq!(dispatch_size(vk::Extent2D { width: 0, height: 0 }), (0, 0));
    }
}
