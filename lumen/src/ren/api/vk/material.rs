use super::{
    descriptor::{DescriptorAllocatorGrowable, DescriptorSetLayoutBuilder, DescriptorWriter},
    pipeline::{self, PipelineBuilder, shader::ShaderCompiler},
};
use crate::{
    Result,
    ren::{
        draw::{MaterialInstance, MaterialPass, MaterialPipeline},
        frame::deletion::{DeletionQueue, Destroy, Resource},
    },
};

use ash::{Device as DeviceHandle, vk};
use lumen_gpu::{MATERIAL_CONSTANTS_SIZE, PUSH_CONSTANTS_SIZE};
use std::{path::Path, sync::Arc};

/// Where a metallic-roughness material reads its textures and constants from.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialResources {
    pub color_image: vk::ImageView,
    pub color_sampler: vk::Sampler,
    pub metal_rough_image: vk::ImageView,
    pub metal_rough_sampler: vk::Sampler,
    pub data_buffer: vk::Buffer,
    pub data_buffer_offset: u32,
}

pub struct MetallicRoughness {
    pub opaque_pipeline: Arc<MaterialPipeline>,
    pub transparent_pipeline: Arc<MaterialPipeline>,
    pub material_layout: vk::DescriptorSetLayout,
    writer: DescriptorWriter,
}

impl MetallicRoughness {
    /// Builds the material layout and both pass pipelines. On failure everything created so
    /// far is released through `destroyer`.
    pub fn new(
        device_handle: &DeviceHandle,
        destroyer: &mut impl Destroy,
        compiler: &impl ShaderCompiler,
        shader_dir: &Path,
        scene_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let vertex_code = compiler.compile(Path::new("mesh.vert"), shader_dir)?;
        let fragment_code = compiler.compile(Path::new("mesh.frag"), shader_dir)?;

        let mut pending = DeletionQueue::new();
        let material_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(device_handle, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT, None)?;
        pending.push(Resource::DescriptorSetLayout(material_layout));

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PUSH_CONSTANTS_SIZE as u32)];
        let layout = pending.release_on_error(
            destroyer,
            pipeline::create_pipeline_layout(device_handle, &[scene_layout, material_layout], &push_constant_ranges),
        )?;
        pending.push(Resource::PipelineLayout(layout));

        let vertex = pending.release_on_error(destroyer, pipeline::load_shader_module(device_handle, &vertex_code))?;
        pending.push(Resource::ShaderModule(vertex));
        let fragment = pending.release_on_error(destroyer, pipeline::load_shader_module(device_handle, &fragment_code))?;
        pending.push(Resource::ShaderModule(fragment));

        let mut builder = PipelineBuilder::new();
        builder
            .set_shaders(vertex, fragment)
            .set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .set_polygon_mode(vk::PolygonMode::FILL)
            .set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .set_multisampling_none()
            .disable_blending()
            .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
            .set_color_attachment_format(color_format)
            .set_depth_format(depth_format)
            .set_layout(layout);

        let opaque = pending.release_on_error(destroyer, builder.build(device_handle))?;
        pending.push(Resource::Pipeline(opaque));

        builder
            .enable_blending_additive()
            .enable_depth_test(false, vk::CompareOp::GREATER_OR_EQUAL);
        let transparent = pending.release_on_error(destroyer, builder.build(device_handle))?;

        // The remaining records now belong to `Self`; only the modules are released here.
        unsafe {
            device_handle.destroy_shader_module(vertex, None);
            device_handle.destroy_shader_module(fragment, None);
        }

        Ok(Self {
            opaque_pipeline: Arc::new(MaterialPipeline { pipeline: opaque, layout }),
            transparent_pipeline: Arc::new(MaterialPipeline { pipeline: transparent, layout }),
            material_layout,
            writer: DescriptorWriter::new(),
        })
    }

    pub fn pipeline_for(&self, pass: MaterialPass) -> &Arc<MaterialPipeline> {
        match pass {
            MaterialPass::Transparent => &self.transparent_pipeline,
            MaterialPass::MainColor | MaterialPass::Other => &self.opaque_pipeline,
        }
    }

    pub fn write_material(
        &mut self,
        device_handle: &DeviceHandle,
        pass: MaterialPass,
        resources: &MaterialResources,
        allocator: &mut DescriptorAllocatorGrowable,
    ) -> Result<MaterialInstance> {
        let material_set = allocator.allocate(device_handle, self.material_layout)?;

        self.writer.clear();
        self.writer
            .write_buffer(
                0,
                resources.data_buffer,
                MATERIAL_CONSTANTS_SIZE,
                resources.data_buffer_offset as vk::DeviceSize,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                resources.color_image,
                resources.color_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            )
            .write_image(
                2,
                resources.metal_rough_image,
                resources.metal_rough_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        self.writer.update_set(device_handle, material_set);

        Ok(MaterialInstance {
            pipeline: Arc::clone(self.pipeline_for(pass)),
            material_set,
            pass,
        })
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            device_handle.destroy_pipeline(self.opaque_pipeline.pipeline, None);
            device_handle.destroy_pipeline(self.transparent_pipeline.pipeline, None);
            device_handle.destroy_pipeline_layout(self.opaque_pipeline.layout, None);
            device_handle.destroy_descriptor_set_layout(self.material_layout, None);
        }
    }
}
