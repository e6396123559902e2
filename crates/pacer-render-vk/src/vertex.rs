// SPDX-License-Identifier: CEPL-1.0
use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::pipeline::GraphicsPipelineConfig;

/// Vertex layout of the built-in triangle shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }

    /// Default pipeline state with this vertex layout on binding 0.
    pub fn pipeline_config() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig {
            vertex_bindings: vec![Self::binding()],
            vertex_attributes: Self::attributes().to_vec(),
            ..Default::default()
        }
    }
}

// clockwise in framebuffer space (y down)
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex {
        pos: [0.0, -0.6],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.4],
        color: [0.0, 0.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.4],
        color: [0.0, 1.0, 0.0],
    },
];
pub const TRIANGLE_INDICES: [u32; 3] = [0, 1, 2];
