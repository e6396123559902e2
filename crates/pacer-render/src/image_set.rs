// SPDX-License-Identifier: CEPL-1.0
use tracing::debug;

use crate::backend::GpuBackend;
use crate::error::Result;
use crate::types::SurfaceFormat;

/// Swapchain images plus one color view each.
///
/// The images belong to the presentation engine and go away with the
/// swapchain handle; only the views are destroyed here.
pub struct PresentableImages<B: GpuBackend> {
    images: Vec<B::Image>,
    views: Vec<B::ImageView>,
}

impl<B: GpuBackend> PresentableImages<B> {
    pub fn new(images: Vec<B::Image>) -> Self {
        Self {
            images,
            views: Vec::new(),
        }
    }

    /// 2D view per image: identity swizzle, one mip, one layer, color aspect.
    pub fn create_views(&mut self, device: &B, format: SurfaceFormat) -> Result<()> {
        self.destroy_views(device);
        self.views.reserve(self.images.len());
        for &image in &self.images {
            // pushed one at a time so a failure leaves only valid views behind
            self.views.push(device.create_color_view(image, format)?);
        }
        debug!("created {} swapchain image views", self.views.len());
        Ok(())
    }

    pub fn destroy_views(&mut self, device: &B) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view);
        }
    }

    /// Views first, then forget the (not owned) images.
    pub fn clear(&mut self, device: &B) {
        self.destroy_views(device);
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[B::Image] {
        &self.images
    }

    pub fn views(&self) -> &[B::ImageView] {
        &self.views
    }
}
