//! Compute and graphics pipeline creation
//!
//! Background effects are compute pipelines sharing one layout: a single
//! storage-image set plus a 64-byte push constant block. Mesh drawing uses a
//! graphics pipeline built for dynamic rendering, so no render pass or
//! framebuffer objects exist anywhere in the renderer.

use std::path::Path;

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::render::vulkan::shader::{load_shader_module, stage_info};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Workgroup edge length the background compute shaders are written for
pub const COMPUTE_WORKGROUP_SIZE: u32 = 16;

/// Four free-form vectors handed to a background effect
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    /// First vector
    pub data1: [f32; 4],
    /// Second vector
    pub data2: [f32; 4],
    /// Third vector
    pub data3: [f32; 4],
    /// Fourth vector
    pub data4: [f32; 4],
}

/// A named compute pipeline that fills the draw image
#[derive(Debug, Clone)]
pub struct ComputeEffect {
    /// Shown when cycling effects
    pub name: String,
    /// Compute pipeline
    pub pipeline: vk::Pipeline,
    /// Shared compute layout
    pub layout: vk::PipelineLayout,
    /// Values pushed before each dispatch
    pub push_constants: ComputePushConstants,
}

/// Where to find one background effect and what to push to it
#[derive(Debug, Clone, Copy)]
pub struct EffectSource<'a> {
    /// Effect name
    pub name: &'a str,
    /// Compiled SPIR-V
    pub path: &'a Path,
    /// Initial push constants
    pub push_constants: ComputePushConstants,
}

/// Workgroup counts covering `extent`
pub fn dispatch_groups(extent: vk::Extent2D) -> (u32, u32) {
    (
        extent.width.div_ceil(COMPUTE_WORKGROUP_SIZE),
        extent.height.div_ceil(COMPUTE_WORKGROUP_SIZE),
    )
}

impl ComputeEffect {
    /// Record the effect writing into the image bound by `descriptor_set`
    pub fn dispatch(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        extent: vk::Extent2D,
    ) {
        let (groups_x, groups_y) = dispatch_groups(extent);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.layout,
                0,
                &[descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                self.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&self.push_constants),
            );
            device.cmd_dispatch(cmd, groups_x, groups_y, 1);
        }
    }
}

/// Create a pipeline layout from set layouts and push constant ranges
pub fn create_pipeline_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> VulkanResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);
    unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)
}

/// Layout shared by every background effect
pub fn create_compute_layout(
    device: &Device,
    image_set_layout: vk::DescriptorSetLayout,
) -> VulkanResult<vk::PipelineLayout> {
    let push_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::COMPUTE,
        offset: 0,
        size: std::mem::size_of::<ComputePushConstants>() as u32,
    };
    create_pipeline_layout(device, &[image_set_layout], &[push_range])
}

/// Build one compute pipeline; the module is destroyed before returning
pub fn create_compute_pipeline(
    device: &Device,
    layout: vk::PipelineLayout,
    shader_path: &Path,
) -> VulkanResult<vk::Pipeline> {
    let module = load_shader_module(device, shader_path)?;
    let create_info = vk::ComputePipelineCreateInfo::builder()
        .layout(layout)
        .stage(stage_info(vk::ShaderStageFlags::COMPUTE, module))
        .build();

    let result = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
    };
    unsafe { device.destroy_shader_module(module, None) };

    let pipelines = result.map_err(|(_, err)| VulkanError::Api(err))?;
    pipelines
        .first()
        .copied()
        .ok_or(VulkanError::Api(vk::Result::ERROR_UNKNOWN))
}

/// Create every effect that loads, skipping the ones that do not
///
/// Failures are logged; the renderer still runs with fewer effects, or with
/// none and a plain clear.
pub fn load_compute_effects(
    device: &Device,
    layout: vk::PipelineLayout,
    sources: &[EffectSource<'_>],
) -> Vec<ComputeEffect> {
    sources
        .iter()
        .filter_map(|source| match create_compute_pipeline(device, layout, source.path) {
            Ok(pipeline) => {
                log::debug!("Created background effect '{}'", source.name);
                Some(ComputeEffect {
                    name: source.name.to_string(),
                    pipeline,
                    layout,
                    push_constants: source.push_constants,
                })
            }
            Err(err) => {
                log::warn!("Skipping background effect '{}': {err}", source.name);
                None
            }
        })
        .collect()
}

/// Colour blending applied to the single colour attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blending {
    /// Overwrite the target
    #[default]
    Disabled,
    /// `src * src_alpha + dst`
    Additive,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    AlphaBlend,
}

impl Blending {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let base = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let dst_color = match self {
            Self::Disabled => return base.blend_enable(false).build(),
            Self::Additive => vk::BlendFactor::ONE,
            Self::AlphaBlend => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        };
        base.blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(dst_color)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build()
    }
}

/// Graphics pipeline state for dynamic rendering
///
/// Viewport and scissor are dynamic. Vertex input is empty because vertices
/// are fetched through a buffer device address in the vertex shader.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuilder {
    vertex_shader: vk::ShaderModule,
    fragment_shader: vk::ShaderModule,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    blending: Blending,
    color_format: vk::Format,
    depth_format: vk::Format,
    depth_compare: Option<vk::CompareOp>,
    depth_write: bool,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self {
            vertex_shader: vk::ShaderModule::null(),
            fragment_shader: vk::ShaderModule::null(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            blending: Blending::Disabled,
            color_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
            depth_compare: None,
            depth_write: false,
        }
    }
}

impl GraphicsPipelineBuilder {
    /// Builder with triangle lists, no culling, no blending and no depth
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertex and fragment stages, both entered at `main`
    pub fn shaders(mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> Self {
        self.vertex_shader = vertex;
        self.fragment_shader = fragment;
        self
    }

    /// Primitive topology; primitive restart stays off
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Fill, line or point rasterization
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    /// Face culling and winding
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// Colour blend mode
    pub fn blending(mut self, blending: Blending) -> Self {
        self.blending = blending;
        self
    }

    /// Format of the single colour attachment
    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_format = format;
        self
    }

    /// Format of the depth attachment
    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = format;
        self
    }

    /// Enable depth testing with `compare`; `write` controls depth writes
    pub fn depth_test(mut self, compare: vk::CompareOp, write: bool) -> Self {
        self.depth_compare = Some(compare);
        self.depth_write = write;
        self
    }

    /// No depth test and no depth writes
    pub fn disable_depth_test(mut self) -> Self {
        self.depth_compare = None;
        self.depth_write = false;
        self
    }

    fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        let builder = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        match self.depth_compare {
            Some(op) => builder
                .depth_test_enable(true)
                .depth_write_enable(self.depth_write)
                .depth_compare_op(op)
                .build(),
            None => builder
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER)
                .build(),
        }
    }

    /// Create the pipeline against `layout`
    pub fn build(&self, device: &Device, layout: vk::PipelineLayout) -> VulkanResult<vk::Pipeline> {
        if self.vertex_shader == vk::ShaderModule::null()
            || self.fragment_shader == vk::ShaderModule::null()
        {
            return Err(VulkanError::InvalidOperation {
                reason: "graphics pipeline needs vertex and fragment shaders".to_string(),
            });
        }

        let stages = [
            stage_info(vk::ShaderStageFlags::VERTEX, self.vertex_shader),
            stage_info(vk::ShaderStageFlags::FRAGMENT, self.fragment_shader),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);
        let depth_stencil = self.depth_stencil_state();

        let color_blend_attachments = [self.blending.attachment_state()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let color_formats = [self.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .push_next(&mut rendering_info)
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        }
        .map_err(|(_, err)| VulkanError::Api(err))?;

        pipelines
            .first()
            .copied()
            .ok_or(VulkanError::Api(vk::Result::ERROR_UNKNOWN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_compute_push_constants_are_64_bytes() {
        assert_eq!(std::mem::size_of::<ComputePushConstants>(), 64);
    }

    #[test]
    fn test_dispatch_groups_round_up() {
        let extent = vk::Extent2D { width: 1700, height: 900 };
        assert_eq!(dispatch_groups(extent), (107, 57));

        let exact = vk::Extent2D { width: 32, height: 16 };
        assert_eq!(dispatch_groups(exact), (2, 1));
    }

    #[test]
    fn test_blending_modes() {
        let disabled = Blending::Disabled.attachment_state();
        assert_eq!(disabled.blend_enable, vk::FALSE);
        assert_eq!(disabled.color_write_mask, vk::ColorComponentFlags::RGBA);

        let additive = Blending::Additive.attachment_state();
        assert_eq!(additive.blend_enable, vk::TRUE);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);

        let alpha = Blending::AlphaBlend.attachment_state();
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }

    #[test]
    fn test_depth_state_follows_builder() {
        let builder = GraphicsPipelineBuilder::new()
            .depth_test(vk::CompareOp::GREATER_OR_EQUAL, true)
            .depth_format(vk::Format::D32_SFLOAT);
        let state = builder.depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::GREATER_OR_EQUAL);

        let state = builder.disable_depth_test().depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::FALSE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn test_builder_keeps_shader_and_format_choices() {
        let vertex = vk::ShaderModule::from_raw(1);
        let fragment = vk::ShaderModule::from_raw(2);
        let builder = GraphicsPipelineBuilder::new()
            .shaders(vertex, fragment)
            .color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE);

        assert_eq!(builder.vertex_shader, vertex);
        assert_eq!(builder.fragment_shader, fragment);
        assert_eq!(builder.color_format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }
}
