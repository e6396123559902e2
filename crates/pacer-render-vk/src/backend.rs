// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use pacer_render::{
    AcquireOutcome, CommandBufferLevel, Extent2D, GpuBackend, PresentOutcome, RenderError,
    Result, Submission, SurfaceFormat, SurfaceSupport, SwapchainDesc,
};
use tracing::debug;

use crate::check::{result_name, VkCheck};
use crate::convert::{
    capabilities, present_mode, surface_format, vk_color_space,
    vk_extent, vk_format, vk_level, vk_present_mode,
};
use crate::device::VkDevice;

/// Surface queries report a lost surface as its own error.
#[track_caller]
fn surface_query<T>(res: VkResult<T>, op: &'static str) -> Result<T> {
    match res {
        Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Err(RenderError::SurfaceLost(format!(
            "{op}: ERROR_SURFACE_LOST_KHR"
        ))),
        other => other.check(op),
    }
}

fn composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&a| supported.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

impl VkDevice {
    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        let i = &self.inner;
        surface_query(
            unsafe {
                i.surface_loader()
                    .get_physical_device_surface_capabilities(i.phys, i.surface())
            },
            "get_physical_device_surface_capabilities",
        )
    }
}

impl GpuBackend for VkDevice {
    type Swapchain = vk::SwapchainKHR;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type RenderPass = vk::RenderPass;
    type Framebuffer = vk::Framebuffer;
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandBuffer = vk::CommandBuffer;

    fn surface_support(&self) -> Result<SurfaceSupport> {
        let i = &self.inner;
        let caps = self.surface_capabilities()?;
        let formats = surface_query(
            unsafe {
                i.surface_loader()
                    .get_physical_device_surface_formats(i.phys, i.surface())
            },
            "get_physical_device_surface_formats",
        )?;
        let modes = surface_query(
            unsafe {
                i.surface_loader()
                    .get_physical_device_surface_present_modes(i.phys, i.surface())
            },
            "get_physical_device_surface_present_modes",
        )?;

        Ok(SurfaceSupport {
            capabilities: capabilities(&caps),
            formats: formats.iter().map(surface_format).collect(),
            present_modes: modes.into_iter().map(present_mode).collect(),
        })
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(vk::SwapchainKHR, Vec<vk::Image>)> {
        let i = &self.inner;
        // transform + alpha are not part of the negotiated desc
        let caps = self.surface_capabilities()?;

        let fams = i.families;
        let family_indices = [fams.graphics, fams.present];
        let (sharing, indices): (vk::SharingMode, &[u32]) = if fams.graphics_presents() {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &family_indices)
        };

        let format = vk_format(desc.format.format);
        let cs = vk_color_space(desc.format.color_space);
        let pm = vk_present_mode(desc.present_mode);
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(i.surface())
            .min_image_count(desc.min_image_count)
            .image_format(format)
            .image_color_space(cs)
            .image_extent(vk_extent(desc.extent))
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha(caps.supported_composite_alpha))
            .present_mode(pm)
            .clipped(true);

        let swapchain =
            unsafe { i.swapchain_loader.create_swapchain(&info, None) }.check("create_swapchain")?;
        let images = match unsafe { i.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { i.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(RenderError::device("get_swapchain_images", result_name(e)));
            }
        };

        debug!(
            "vkCreateSwapchainKHR: {:?} / {:?} / {:?} {}x{} sharing={:?} → {} images",
            desc.format.format,
            desc.format.color_space,
            desc.present_mode,
            desc.extent.width,
            desc.extent.height,
            sharing,
            images.len()
        );
        Ok((swapchain, images))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.inner.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_color_view(&self, image: vk::Image, format: SurfaceFormat) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk_format(format.format))
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.raw().create_image_view(&info, None) }.check("create_image_view")
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.raw().destroy_image_view(view, None) };
    }

    fn create_render_pass(&self, format: SurfaceFormat) -> Result<vk::RenderPass> {
        let attachments = [vk::AttachmentDescription::default()
            .format(vk_format(format.format))
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];
        // the UNDEFINED → attachment transition must wait for the acquire
        // semaphore, which is waited at COLOR_ATTACHMENT_OUTPUT
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.raw().create_render_pass(&info, None) }.check("create_render_pass")
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.raw().destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: Extent2D,
    ) -> Result<vk::Framebuffer> {
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.raw().create_framebuffer(&info, None) }.check("create_framebuffer")
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.raw().destroy_framebuffer(framebuffer, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.raw().create_fence(&info, None) }.check("create_fence")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.raw().destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.raw().wait_for_fences(&[fence], true, u64::MAX) }.check("wait_for_fences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.raw().reset_fences(&[fence]) }.check("reset_fences")
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.raw().create_semaphore(&info, None) }.check("create_semaphore")
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.raw().destroy_semaphore(semaphore, None) };
    }

    fn allocate_command_buffers(
        &self,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.inner.command_pool)
            .level(vk_level(level))
            .command_buffer_count(count);
        unsafe { self.raw().allocate_command_buffers(&info) }.check("allocate_command_buffers")
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.raw()
                .free_command_buffers(self.inner.command_pool, buffers)
        };
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
        .check("reset_command_buffer")
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        // re-recorded every frame after a reset
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(cmd, &info) }.check("begin_command_buffer")
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { self.raw().end_command_buffer(cmd) }.check("end_command_buffer")
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: Extent2D,
        clear: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        }];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk_extent(extent),
            })
            .clear_values(&clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.raw().cmd_end_render_pass(cmd) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        let res = unsafe {
            self.inner.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        match res {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RenderError::unexpected("acquire_next_image", result_name(e))),
        }
    }

    fn submit(&self, submission: &Submission<Self>) -> Result<()> {
        let wait = [submission.wait];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let cmds = [submission.command_buffer];
        let signal = [submission.signal];
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal);

        let res = unsafe {
            self.raw()
                .queue_submit(self.inner.graphics_queue, &[info], submission.fence)
        };
        match res {
            Ok(()) => Ok(()),
            Err(e) => Err(RenderError::unexpected("queue_submit", result_name(e))),
        }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let res = unsafe {
            self.inner
                .swapchain_loader
                .queue_present(self.inner.present_queue, &info)
        };
        match res {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RenderError::unexpected("queue_present", result_name(e))),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw().device_wait_idle() }.check("device_wait_idle")
    }
}
