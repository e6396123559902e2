// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::Cursor;
use std::path::Path;

use ash::util::read_spv;
use ash::vk;
use pacer_render::{RenderError, Result};

use crate::check::VkCheck;

/// Built-in triangle shaders, compiled by the build script.
pub const TRIANGLE_VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
pub const TRIANGLE_FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// Reads SPIR-V bytecode from disk. Any I/O failure is reported as a missing
/// resource naming the path.
pub fn read_spirv_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| RenderError::ResourceNotFound {
        path: path.to_path_buf(),
        source,
    })
}

/// Bytes → aligned words. Rejects lengths that are not a multiple of four.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RenderError::InvalidConfig(format!("malformed SPIR-V: {e}")))
}

/// Shader module that lives only as long as pipeline creation needs it.
pub(crate) struct ShaderModule<'a> {
    device: &'a ash::Device,
    module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    pub(crate) fn new(device: &'a ash::Device, spirv: &[u8]) -> Result<Self> {
        let code = spirv_words(spirv)?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module =
            unsafe { device.create_shader_module(&info, None) }.check("create_shader_module")?;
        Ok(Self { device, module })
    }

    pub(crate) fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}
