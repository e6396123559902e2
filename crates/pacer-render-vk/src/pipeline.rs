// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use pacer_render::{Extent2D, RenderError, Result};
use tracing::debug;

use crate::buffer::DeviceBuffer;
use crate::check::{result_name, VkCheck};
use crate::convert::vk_extent;
use crate::device::VkDevice;
use crate::shader::ShaderModule;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

/// Fixed-function state for one graphics pipeline.
///
/// Viewport and scissor are always dynamic; [`GraphicsPipeline::bind`] sets
/// them to the full extent each frame.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineConfig {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub depth_bias: Option<DepthBias>,
    pub samples: vk::SampleCountFlags,
    /// `Some(min)` enables sample shading.
    pub min_sample_shading: Option<f32>,
    /// One entry per color attachment of the subpass.
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

const WRITE_RGBA: vk::ColorComponentFlags = vk::ColorComponentFlags::from_raw(
    vk::ColorComponentFlags::R.as_raw()
        | vk::ColorComponentFlags::G.as_raw()
        | vk::ColorComponentFlags::B.as_raw()
        | vk::ColorComponentFlags::A.as_raw(),
);

/// No blending; write all RGBA.
pub fn opaque_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: WRITE_RGBA,
        ..Default::default()
    }
}

/// Standard `src * a + dst * (1 - a)` blending.
pub fn alpha_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: WRITE_RGBA,
    }
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            depth_bias: None,
            samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: None,
            blend_attachments: vec![opaque_blend()],
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            push_constant_ranges: Vec::new(),
        }
    }
}

impl GraphicsPipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for needed in [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR] {
            if !self.dynamic_states.contains(&needed) {
                return Err(RenderError::InvalidConfig(format!(
                    "pipeline dynamic states must include {needed:?}"
                )));
            }
        }
        if self.blend_attachments.is_empty() {
            return Err(RenderError::InvalidConfig(
                "pipeline needs a blend state per color attachment".into(),
            ));
        }
        if self.line_width <= 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "line width {} must be positive",
                self.line_width
            )));
        }
        if let Some(min) = self.min_sample_shading {
            if !(0.0..=1.0).contains(&min) {
                return Err(RenderError::InvalidConfig(format!(
                    "min sample shading {min} outside 0..=1"
                )));
            }
        }
        Ok(())
    }
}

/// Pipeline + layout, destroyed on drop. Built against subpass 0 of a render
/// pass, so it stays valid across swapchain recreation as long as the render
/// pass does.
pub struct GraphicsPipeline {
    device: VkDevice,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    pub fn new(
        device: &VkDevice,
        render_pass: vk::RenderPass,
        vert_spv: &[u8],
        frag_spv: &[u8],
        cfg: &GraphicsPipelineConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let d = device.raw();

        // destroyed when this function returns
        let vs = ShaderModule::new(d, vert_spv)?;
        let fs = ShaderModule::new(d, frag_spv)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vs.handle())
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fs.handle())
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&cfg.vertex_bindings)
            .vertex_attribute_descriptions(&cfg.vertex_attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(cfg.topology);
        // counts only; the rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut raster = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(cfg.polygon_mode)
            .cull_mode(cfg.cull_mode)
            .front_face(cfg.front_face)
            .line_width(cfg.line_width);
        if let Some(bias) = cfg.depth_bias {
            raster = raster
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant_factor)
                .depth_bias_clamp(bias.clamp)
                .depth_bias_slope_factor(bias.slope_factor);
        }

        let mut multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(cfg.samples);
        if let Some(min) = cfg.min_sample_shading {
            multisample = multisample
                .sample_shading_enable(true)
                .min_sample_shading(min);
        }

        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&cfg.blend_attachments);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&cfg.dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(&cfg.push_constant_ranges);
        let layout = unsafe { d.create_pipeline_layout(&layout_info, None) }
            .check("create_pipeline_layout")?;

        // drop releases the layout if pipeline creation fails below
        let mut out = Self {
            device: device.clone(),
            layout,
            pipeline: vk::Pipeline::null(),
        };

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = match unsafe {
            d.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        } {
            Ok(p) => p,
            Err((_, err)) => {
                return Err(RenderError::device("create_graphics_pipelines", result_name(err)))
            }
        };
        out.pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RenderError::device("create_graphics_pipelines", "no pipeline returned")
        })?;

        debug!(
            "created graphics pipeline ({:?}, {} bindings, {} attributes)",
            cfg.topology,
            cfg.vertex_bindings.len(),
            cfg.vertex_attributes.len()
        );
        Ok(out)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Binds the pipeline and sets viewport + scissor to cover `extent`.
    pub fn bind(&self, cmd: vk::CommandBuffer, extent: Extent2D) {
        let d = self.device.raw();
        let vp = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let sc = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk_extent(extent),
        };
        unsafe {
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&vp));
            d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&sc));
        }
    }

    /// [`bind`](Self::bind), then one indexed draw of `index_count` `u32`
    /// indices from binding 0.
    pub fn draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        extent: Extent2D,
        vertices: &DeviceBuffer,
        indices: &DeviceBuffer,
        index_count: u32,
    ) {
        self.bind(cmd, extent);
        let d = self.device.raw();
        let offsets = [0_u64];
        unsafe {
            d.cmd_bind_vertex_buffers(cmd, 0, &[vertices.handle()], &offsets);
            d.cmd_bind_index_buffer(cmd, indices.handle(), 0, vk::IndexType::UINT32);
            d.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            let d = self.device.raw();
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_pipeline_layout(self.layout, None);
        }
    }
}
