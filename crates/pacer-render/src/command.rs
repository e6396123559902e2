// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, warn};

use crate::backend::GpuBackend;
use crate::error::{RenderError, Result};
use crate::types::{CommandBufferLevel, Extent2D};

pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Resettable command buffers, one per frame slot, from the device's pool.
pub struct CommandBufferSet<B: GpuBackend> {
    device: B,
    level: CommandBufferLevel,
    buffers: Vec<B::CommandBuffer>,
    clear_color: [f32; 4],
}

impl<B: GpuBackend> CommandBufferSet<B> {
    pub fn create(device: &B, level: CommandBufferLevel, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(RenderError::InvalidConfig(
                "command buffer set needs at least one buffer".into(),
            ));
        }
        let count_u32 = u32::try_from(count)
            .map_err(|_| RenderError::InvalidConfig(format!("{count} command buffers")))?;
        let buffers = device.allocate_command_buffers(level, count_u32)?;
        debug!("allocated {} {:?} command buffers", buffers.len(), level);
        Ok(Self {
            device: device.clone(),
            level,
            buffers,
            clear_color: DEFAULT_CLEAR_COLOR,
        })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn get(&self, slot: usize) -> Option<B::CommandBuffer> {
        self.buffers.get(slot).copied()
    }

    fn buffer(&self, slot: usize) -> Result<B::CommandBuffer> {
        self.get(slot).ok_or_else(|| {
            RenderError::InvalidConfig(format!(
                "command buffer slot {slot} out of range (have {})",
                self.buffers.len()
            ))
        })
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn reset(&self, slot: usize) -> Result<()> {
        self.device.reset_command_buffer(self.buffer(slot)?)
    }

    pub fn begin(&self, slot: usize) -> Result<()> {
        self.device.begin_command_buffer(self.buffer(slot)?)
    }

    /// Clears to the set's clear color; contents are recorded inline.
    pub fn begin_render_pass(
        &self,
        slot: usize,
        render_pass: B::RenderPass,
        framebuffer: B::Framebuffer,
        extent: Extent2D,
    ) -> Result<()> {
        let cmd = self.buffer(slot)?;
        self.device
            .cmd_begin_render_pass(cmd, render_pass, framebuffer, extent, self.clear_color);
        Ok(())
    }

    pub fn end_render_pass(&self, slot: usize) -> Result<()> {
        self.device.cmd_end_render_pass(self.buffer(slot)?);
        Ok(())
    }

    pub fn end(&self, slot: usize) -> Result<()> {
        self.device.end_command_buffer(self.buffer(slot)?)
    }

    /// begin → begin_render_pass → `draw` → end_render_pass → end.
    pub fn record<F>(
        &self,
        slot: usize,
        render_pass: B::RenderPass,
        framebuffer: B::Framebuffer,
        extent: Extent2D,
        draw: F,
    ) -> Result<()>
    where
        F: FnOnce(B::CommandBuffer) -> Result<()>,
    {
        let cmd = self.buffer(slot)?;
        self.begin(slot)?;
        self.begin_render_pass(slot, render_pass, framebuffer, extent)?;
        draw(cmd)?;
        self.end_render_pass(slot)?;
        self.end(slot)
    }

    /// Frees every buffer back to the pool. Second call is a no-op.
    pub fn destroy(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        // a pending buffer must not be freed
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle before freeing command buffers failed: {e}");
        }
        let buffers: Vec<_> = self.buffers.drain(..).collect();
        self.device.free_command_buffers(&buffers);
        debug!("freed {} command buffers", buffers.len());
    }
}

impl<B: GpuBackend> Drop for CommandBufferSet<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
