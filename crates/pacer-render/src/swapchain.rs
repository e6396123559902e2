// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, info, warn};

use crate::backend::{GpuBackend, SwapchainDesc};
use crate::config::FrameConfig;
use crate::error::{RenderError, Result};
use crate::image_set::PresentableImages;
use crate::negotiate::negotiate;
use crate::types::{Extent2D, PresentMode, RenderSize, SurfaceFormat};
use crate::window::{wait_for_nonzero_size, SurfaceWindow};

/// Presentable image ring with its negotiated parameters, views and
/// framebuffers.
///
/// Destroyed on drop; `destroy` may also be called early and is idempotent.
pub struct Swapchain<B: GpuBackend> {
    device: B,
    handle: Option<B::Swapchain>,
    format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent2D,
    images: PresentableImages<B>,
    framebuffers: Vec<B::Framebuffer>,
}

impl<B: GpuBackend> Swapchain<B> {
    /// Negotiates and creates the swapchain handle and fetches its images.
    /// Views and framebuffers are separate steps.
    pub fn create(device: &B, window_size: RenderSize, cfg: &FrameConfig) -> Result<Self> {
        let support = device.surface_support()?;
        let n = negotiate(&support, window_size, cfg)?;

        let desc = SwapchainDesc {
            min_image_count: n.min_image_count,
            format: n.format,
            present_mode: n.present_mode,
            extent: n.extent,
        };
        let (handle, images) = device.create_swapchain(&desc)?;

        info!(
            "swapchain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images(min={} → requested={} → got={})",
            n.format.format,
            n.format.color_space,
            n.present_mode,
            n.extent.width,
            n.extent.height,
            support.capabilities.min_image_count,
            n.min_image_count,
            images.len()
        );

        Ok(Self {
            device: device.clone(),
            handle: Some(handle),
            format: n.format,
            present_mode: n.present_mode,
            extent: n.extent,
            images: PresentableImages::new(images),
            framebuffers: Vec::new(),
        })
    }

    pub fn create_image_views(&mut self) -> Result<()> {
        self.images.create_views(&self.device, self.format)
    }

    /// One framebuffer per image view, all bound to `render_pass`.
    pub fn create_framebuffers(&mut self, render_pass: B::RenderPass) -> Result<()> {
        self.destroy_framebuffers();
        self.framebuffers.reserve(self.images.views().len());
        for &view in self.images.views() {
            let fb = self
                .device
                .create_framebuffer(render_pass, view, self.extent)?;
            self.framebuffers.push(fb);
        }
        debug!("created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    // STRICT ORDER (recreate):
    // 1) Block while minimized (0x0); nothing useful can be built at that size
    // 2) device idle: no submitted frame may still reference old views/framebuffers
    // 3) Destroy framebuffers → views → swapchain handle
    // 4) Create handle → views → framebuffers against the SAME render pass
    /// Rebuilds against the current window size and returns the new swapchain.
    /// `self` is left destroyed; the caller swaps the returned value in.
    pub fn recreate(
        &mut self,
        window: &mut dyn SurfaceWindow,
        cfg: &FrameConfig,
        render_pass: B::RenderPass,
    ) -> Result<Swapchain<B>> {
        let size = wait_for_nonzero_size(window);

        self.device.wait_idle()?;
        self.destroy();

        let mut next = Swapchain::create(&self.device, size, cfg)?;
        next.create_image_views()?;
        next.create_framebuffers(render_pass)?;

        if next.format != self.format {
            warn!(
                "surface format changed on recreate ({:?} → {:?}); render pass kept",
                self.format, next.format
            );
        }
        info!(
            "swapchain recreated: {}x{} → {}x{}",
            self.extent.width, self.extent.height, next.extent.width, next.extent.height
        );
        Ok(next)
    }

    /// Framebuffers → image views → handle. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.destroy_framebuffers();
        self.images.clear(&self.device);
        if let Some(handle) = self.handle.take() {
            self.device.destroy_swapchain(handle);
            debug!("destroyed swapchain");
        }
    }

    fn destroy_framebuffers(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(fb);
        }
    }

    pub fn handle(&self) -> Result<B::Swapchain> {
        self.handle.ok_or(RenderError::SwapchainDestroyed)
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[B::Image] {
        self.images.images()
    }

    pub fn image_views(&self) -> &[B::ImageView] {
        self.images.views()
    }

    pub fn framebuffers(&self) -> &[B::Framebuffer] {
        &self.framebuffers
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<B::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl<B: GpuBackend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockWindow};
    use crate::types::{ColorSpace, PixelFormat};

    fn build(dev: &MockDevice, size: RenderSize) -> (Swapchain<MockDevice>, u64) {
        let cfg = FrameConfig::default();
        let mut sc = Swapchain::create(dev, size, &cfg).unwrap();
        sc.create_image_views().unwrap();
        let rp = dev.create_render_pass(sc.format()).unwrap();
        sc.create_framebuffers(rp).unwrap();
        (sc, rp)
    }

    #[test]
    fn counts_match_image_count() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let (sc, _rp) = build(&dev, RenderSize::new(800, 600));
        assert_eq!(sc.image_count(), 3);
        assert_eq!(sc.image_views().len(), 3);
        assert_eq!(sc.framebuffers().len(), 3);
        assert_eq!(sc.extent(), Extent2D::new(800, 600));
        assert_eq!(
            sc.format(),
            SurfaceFormat::new(PixelFormat::Bgra8Srgb, ColorSpace::SrgbNonlinear)
        );
        assert_eq!(sc.present_mode(), PresentMode::Mailbox);
        assert_eq!(dev.live_image_views(), 3);
        assert_eq!(dev.live_framebuffers(), 3);
    }

    #[test]
    fn destroy_is_idempotent_and_drop_after_destroy_is_noop() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let (mut sc, _rp) = build(&dev, RenderSize::new(800, 600));
        sc.destroy();
        sc.destroy();
        assert!(sc.is_destroyed());
        assert!(matches!(sc.handle(), Err(RenderError::SwapchainDestroyed)));
        assert_eq!(sc.image_count(), 0);
        drop(sc);
        assert_eq!(dev.live_swapchains(), 0);
        assert_eq!(dev.live_image_views(), 0);
        assert_eq!(dev.live_framebuffers(), 0);
    }

    #[test]
    fn recreate_follows_window_size() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let mut window = MockWindow::new(&dev);
        let (mut sc, rp) = build(&dev, RenderSize::new(800, 600));

        window.resize(RenderSize::new(400, 300));
        let next = sc.recreate(&mut window, &FrameConfig::default(), rp).unwrap();
        assert!(sc.is_destroyed());
        assert_eq!(next.extent(), Extent2D::new(400, 300));
        assert_eq!(next.framebuffers().len(), next.image_count());
        assert_eq!(dev.live_swapchains(), 1);
        assert_eq!(dev.live_image_views(), next.image_count());
    }

    #[test]
    fn failed_recreate_leaves_no_views_behind() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let mut window = MockWindow::new(&dev);
        let (mut sc, rp) = build(&dev, RenderSize::new(800, 600));

        window.resize(RenderSize::new(400, 300));
        dev.fail_view_creation_after(1);
        assert!(matches!(
            sc.recreate(&mut window, &FrameConfig::default(), rp),
            Err(RenderError::Device { .. })
        ));
        assert!(sc.is_destroyed());
        assert_eq!(dev.live_swapchains(), 0);
        assert_eq!(dev.live_image_views(), 0);
        assert_eq!(dev.live_framebuffers(), 0);
    }

    #[test]
    fn recreate_blocks_while_minimized() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let mut window = MockWindow::new(&dev);
        let (mut sc, rp) = build(&dev, RenderSize::new(800, 600));

        window.resize(RenderSize::new(0, 0));
        window.restore_after(4, RenderSize::new(1024, 768));
        let next = sc.recreate(&mut window, &FrameConfig::default(), rp).unwrap();

        assert_eq!(window.wait_calls(), 4);
        assert_eq!(next.extent(), Extent2D::new(1024, 768));
        // nothing torn down until a usable size was seen
        assert!(dev.wait_idle_calls() >= 1);
    }

    #[test]
    fn falls_back_or_refuses_per_policy() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        let only = SurfaceFormat::new(PixelFormat::Rgba16Float, ColorSpace::ExtendedSrgbLinear);
        dev.set_formats(vec![only]);

        let sc = Swapchain::create(&dev, RenderSize::new(800, 600), &FrameConfig::default()).unwrap();
        assert_eq!(sc.format(), only);
        drop(sc);

        let strict = FrameConfig {
            format_fallback: crate::config::FormatFallback::Strict,
            ..Default::default()
        };
        assert!(matches!(
            Swapchain::create(&dev, RenderSize::new(800, 600), &strict),
            Err(RenderError::UnsupportedSurface { .. })
        ));
        assert_eq!(dev.live_swapchains(), 0);
    }

    #[test]
    fn image_count_respects_surface_maximum() {
        let dev = MockDevice::new(RenderSize::new(800, 600));
        dev.set_image_count_limits(2, 2);
        let (sc, _rp) = build(&dev, RenderSize::new(800, 600));
        assert_eq!(sc.image_count(), 2);
        assert_eq!(sc.framebuffers().len(), 2);
    }

    #[test]
    fn undefined_extent_uses_clamped_window_size() {
        let dev = MockDevice::new(RenderSize::new(9000, 500));
        dev.set_extent_undefined(true);
        let (sc, _rp) = build(&dev, RenderSize::new(9000, 500));
        assert_eq!(sc.extent(), Extent2D::new(4096, 500));
    }
}
