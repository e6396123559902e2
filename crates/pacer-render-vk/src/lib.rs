// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! `ash` implementation of [`pacer_render::GpuBackend`], plus the setup
//! helpers a frame loop needs around it: staged buffer uploads, a graphics
//! pipeline builder and SPIR-V loading.

mod backend;
mod buffer;
mod check;
mod convert;
mod device;
mod pipeline;
mod shader;
mod vertex;

pub use ash::vk;
pub use buffer::{find_memory_type, DeviceBuffer};
pub use device::{QueueFamilies, VkDevice};
pub use pipeline::{alpha_blend, opaque_blend, DepthBias, GraphicsPipeline, GraphicsPipelineConfig};
pub use shader::{read_spirv_file, spirv_words, TRIANGLE_FRAG_SPV, TRIANGLE_VERT_SPV};
pub use vertex::{Vertex, TRIANGLE_INDICES, TRIANGLE_VERTICES};
