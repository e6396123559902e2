// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Debug;

use crate::error::Result;
use crate::types::{CommandBufferLevel, Extent2D, PresentMode, SurfaceFormat, SurfaceSupport};

/// Result of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `suboptimal` images are still usable this frame.
    Acquired { index: u32, suboptimal: bool },
    /// Surface no longer matches the swapchain; nothing was acquired.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Displayed, but the swapchain should be rebuilt.
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Negotiated parameters handed to the backend for swapchain creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
}

/// One graphics-queue submission of a frame slot's command buffer.
///
/// Waits on `wait` at the color-attachment-output stage, signals `signal`
/// when the commands finish and `fence` once the whole batch completes.
pub struct Submission<B: GpuBackend> {
    pub command_buffer: B::CommandBuffer,
    pub wait: B::Semaphore,
    pub signal: B::Semaphore,
    pub fence: B::Fence,
}

/// Device provider seen by the frame/swapchain core.
///
/// Implementations are cheap handles (clone = share the same logical device).
/// The underlying device must outlive every object created through it; the
/// wrappers in this crate keep a clone for exactly that reason.
///
/// Waits are unbounded. `destroy_*` calls are only made once per handle.
pub trait GpuBackend: Clone {
    type Swapchain: Copy + Eq + Debug;
    type Image: Copy + Eq + Debug;
    type ImageView: Copy + Eq + Debug;
    type RenderPass: Copy + Eq + Debug;
    type Framebuffer: Copy + Eq + Debug;
    type Fence: Copy + Eq + Debug;
    type Semaphore: Copy + Eq + Debug;
    type CommandBuffer: Copy + Eq + Debug;

    // surface + swapchain
    fn surface_support(&self) -> Result<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(Self::Swapchain, Vec<Self::Image>)>;
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);
    fn create_color_view(&self, image: Self::Image, format: SurfaceFormat) -> Result<Self::ImageView>;
    fn destroy_image_view(&self, view: Self::ImageView);

    // render pass + framebuffers
    fn create_render_pass(&self, format: SurfaceFormat) -> Result<Self::RenderPass>;
    fn destroy_render_pass(&self, render_pass: Self::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: Self::RenderPass,
        view: Self::ImageView,
        extent: Extent2D,
    ) -> Result<Self::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);

    // sync
    fn create_fence(&self, signaled: bool) -> Result<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    fn wait_for_fence(&self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;
    fn create_semaphore(&self) -> Result<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);

    // command buffers (from the device's graphics command pool)
    fn allocate_command_buffers(
        &self,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<Self::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[Self::CommandBuffer]);
    fn reset_command_buffer(&self, cmd: Self::CommandBuffer) -> Result<()>;
    fn begin_command_buffer(&self, cmd: Self::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> Result<()>;
    fn cmd_begin_render_pass(
        &self,
        cmd: Self::CommandBuffer,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        extent: Extent2D,
        clear: [f32; 4],
    );
    fn cmd_end_render_pass(&self, cmd: Self::CommandBuffer);

    // frame loop
    fn acquire_next_image(
        &self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
    ) -> Result<AcquireOutcome>;
    fn submit(&self, submission: &Submission<Self>) -> Result<()>;
    fn present(
        &self,
        swapchain: Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> Result<PresentOutcome>;
    fn wait_idle(&self) -> Result<()>;
}
