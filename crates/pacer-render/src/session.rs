// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, info, warn};

use crate::backend::GpuBackend;
use crate::config::FrameConfig;
use crate::error::Result;
use crate::swapchain::Swapchain;
use crate::window::{wait_for_nonzero_size, SurfaceWindow};

/// Root GPU object: the device handle, the fixed render pass, and the
/// current swapchain.
///
/// Sync and command sets are created separately from [`Session::device`]
/// and must be dropped before the session.
pub struct Session<B: GpuBackend> {
    device: B,
    config: FrameConfig,
    render_pass: B::RenderPass,
    swapchain: Swapchain<B>,
}

impl<B: GpuBackend> Session<B> {
    // STRICT ORDER (setup):
    // 1) config valid, window has a usable size
    // 2) swapchain handle + images → views
    // 3) render pass from the negotiated format
    // 4) framebuffers against that render pass
    pub fn new(device: B, window: &mut dyn SurfaceWindow, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        let size = wait_for_nonzero_size(window);

        let mut swapchain = Swapchain::create(&device, size, &config)?;
        swapchain.create_image_views()?;

        let render_pass = device.create_render_pass(swapchain.format())?;
        debug!("created render pass for {:?}", swapchain.format().format);

        let mut session = Self {
            device,
            config,
            render_pass,
            swapchain,
        };
        session.swapchain.create_framebuffers(render_pass)?;

        info!(
            "session ready: {} images, {} frames in flight",
            session.swapchain.image_count(),
            session.config.max_frames_in_flight
        );
        Ok(session)
    }

    pub fn device(&self) -> &B {
        &self.device
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn swapchain(&self) -> &Swapchain<B> {
        &self.swapchain
    }

    pub fn render_pass(&self) -> B::RenderPass {
        self.render_pass
    }

    /// Rebuilds the swapchain for the window's current size and swaps it in.
    /// The render pass is kept.
    pub fn recreate_swapchain(&mut self, window: &mut dyn SurfaceWindow) -> Result<()> {
        let next = self
            .swapchain
            .recreate(window, &self.config, self.render_pass)?;
        // the old value is already destroyed; dropping it is a no-op
        self.swapchain = next;
        Ok(())
    }
}

impl<B: GpuBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle before session teardown failed: {e}");
        }
        self.swapchain.destroy();
        self.device.destroy_render_pass(self.render_pass);
        debug!("destroyed render pass");
    }
}
