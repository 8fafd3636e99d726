pub mod builder;
pub mod shader;

pub use builder::PipelineBuilder;

use crate::{Error, Result, vk_check};

use ash::{Device as DeviceHandle, vk};

pub fn load_shader_module(device_handle: &DeviceHandle, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    vk_check!(unsafe { device_handle.create_shader_module(&create_info, None) })
}

pub fn create_pipeline_layout(
    device_handle: &DeviceHandle,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    vk_check!(unsafe { device_handle.create_pipeline_layout(&create_info, None) })
}

pub fn create_compute_pipeline(
    device_handle: &DeviceHandle,
    shader_module: vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(c"main");

    let create_infos = [vk::ComputePipelineCreateInfo::default()
        .layout(layout)
        .stage(stage_info)];

    unsafe { device_handle.create_compute_pipelines(vk::PipelineCache::null(), &create_infos, None) }
        .map_err(|(_, result)| Error::Pipeline(result))
        .and_then(|pipelines| pipelines.first().copied().ok_or(Error::Pipeline(vk::Result::ERROR_UNKNOWN)))
}
