use crate::{Error, Result};

use ash::{Device as DeviceHandle, vk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
}

/// Colour blend equation of the single colour attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Blend {
    #[default]
    Disabled,
    /// `src * src_alpha + dst`
    Additive,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

/// Accumulates graphics pipeline state as plain data. Nothing touches the device until [`build`].
///
/// [`build`]: PipelineBuilder::build
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineBuilder {
    pub shader_stages: Vec<ShaderStage>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend: Blend,
    pub depth: Option<DepthState>,
    pub color_attachment_format: vk::Format,
    pub depth_attachment_format: vk::Format,
    pub layout: vk::PipelineLayout,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            shader_stages: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend: Blend::Disabled,
            depth: None,
            color_attachment_format: vk::Format::UNDEFINED,
            depth_attachment_format: vk::Format::UNDEFINED,
            layout: vk::PipelineLayout::null(),
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    pub fn set_shaders(&mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> &mut Self {
        self.shader_stages = vec![
            ShaderStage { stage: vk::ShaderStageFlags::VERTEX, module: vertex },
            ShaderStage { stage: vk::ShaderStageFlags::FRAGMENT, module: fragment },
        ];
        self
    }

    pub fn set_input_topology(&mut self, topology: vk::PrimitiveTopology) -> &mut Self {
        self.topology = topology;
        self
    }

    pub fn set_polygon_mode(&mut self, mode: vk::PolygonMode) -> &mut Self {
        self.polygon_mode = mode;
        self
    }

    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// One sample per pixel, no sample shading.
    pub fn set_multisampling_none(&mut self) -> &mut Self {
        self.samples = vk::SampleCountFlags::TYPE_1;
        self
    }

    pub fn disable_blending(&mut self) -> &mut Self {
        self.blend = Blend::Disabled;
        self
    }

    pub fn enable_blending_additive(&mut self) -> &mut Self {
        self.blend = Blend::Additive;
        self
    }

    pub fn enable_blending_alpha(&mut self) -> &mut Self {
        self.blend = Blend::Alpha;
        self
    }

    pub fn set_color_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.color_attachment_format = format;
        self
    }

    pub fn set_depth_format(&mut self, format: vk::Format) -> &mut Self {
        self.depth_attachment_format = format;
        self
    }

    pub fn disable_depth_test(&mut self) -> &mut Self {
        self.depth = None;
        self
    }

    pub fn enable_depth_test(&mut self, write: bool, compare_op: vk::CompareOp) -> &mut Self {
        self.depth = Some(DepthState { write, compare_op });
        self
    }

    pub fn set_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.layout = layout;
        self
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let attachment = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
        let dst_color = match self.blend {
            Blend::Disabled => return attachment.blend_enable(false),
            Blend::Additive => vk::BlendFactor::ONE,
            Blend::Alpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        };
        attachment
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(dst_color)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }

    fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        match self.depth {
            Some(DepthState { write, compare_op }) => state
                .depth_test_enable(true)
                .depth_write_enable(write)
                .depth_compare_op(compare_op),
            None => state
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER),
        }
    }

    /// Viewport and scissor are dynamic; everything else is baked into the pipeline.
    pub fn build(&self, device_handle: &DeviceHandle) -> Result<vk::Pipeline> {
        let stages: Vec<_> = self
            .shader_stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(c"main")
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.samples)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);

        let attachments = [self.color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&attachments);
        let depth_stencil_state = self.depth_stencil_state();

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_attachment_format);

        let create_infos = [vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .depth_stencil_state(&depth_stencil_state)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)];

        let pipelines = unsafe { device_handle.create_graphics_pipelines(vk::PipelineCache::null(), &create_infos, None) }
            .map_err(|(_, result)| {
                log::error!("graphics pipeline creation failed: {result:?}");
                Error::Pipeline(result)
            })?;

        pipelines.first().copied().ok_or(Error::Pipeline(vk::Result::ERROR_UNKNOWN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn defaults_describe_filled_triangles_without_blending() {
        let builder = PipelineBuilder::new();
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(builder.blend, Blend::Disabled);
        assert!(builder.depth.is_none());
        assert!(builder.shader_stages.is_empty());
    }

    #[test]
    fn setters_accumulate_and_clear_resets() {
        let mut builder = PipelineBuilder::new();
        builder
            .set_shaders(vk::ShaderModule::from_raw(1), vk::ShaderModule::from_raw(2))
            .set_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .enable_blending_additive()
            .enable_depth_test(false, vk::CompareOp::GREATER_OR_EQUAL)
            .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .set_depth_format(vk::Format::D32_SFLOAT);

        assert_eq!(builder.shader_stages.len(), 2);
        assert_eq!(builder.shader_stages[0].stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(builder.shader_stages[1].module.as_raw(), 2);
        assert_eq!(builder.depth, Some(DepthState { write: false, compare_op: vk::CompareOp::GREATER_OR_EQUAL }));

        builder.clear();
        assert_eq!(builder, PipelineBuilder::default());
    }

    #[test]
    fn multisampling_none_restores_single_sample() {
        let mut builder = PipelineBuilder { samples: vk::SampleCountFlags::TYPE_4, ..Default::default() };
        builder.set_multisampling_none();
        assert_eq!(builder.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn blend_modes_pick_destination_factor() {
        let mut builder = PipelineBuilder::new();
        assert_eq!(builder.color_blend_attachment().blend_enable, vk::FALSE);

        builder.enable_blending_additive();
        let additive = builder.color_blend_attachment();
        assert_eq!(additive.blend_enable, vk::TRUE);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);

        builder.enable_blending_alpha();
        assert_eq!(builder.color_blend_attachment().dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn disabled_depth_neither_tests_nor_writes() {
        let mut builder = PipelineBuilder::new();
        builder.enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL);
        assert_eq!(builder.depth_stencil_state().depth_write_enable, vk::TRUE);

        builder.disable_depth_test();
        let state = builder.depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::FALSE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }
}
