// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic swapchain lifecycle and frame pacing.
//!
//! A [`Session`] owns the device handle, the fixed render pass and the
//! [`Swapchain`]. [`SyncSet`] and [`CommandBufferSet`] hold one entry per
//! frame in flight, and [`FrameDriver`] runs acquire → record → submit →
//! present over all three.

mod backend;
mod command;
mod config;
mod error;
mod frame;
mod image_set;
mod negotiate;
mod session;
mod swapchain;
mod sync;
mod types;
mod window;

#[cfg(test)]
mod mock;

pub use backend::{AcquireOutcome, GpuBackend, PresentOutcome, Submission, SwapchainDesc};
pub use command::{CommandBufferSet, DEFAULT_CLEAR_COLOR};
pub use config::{FormatFallback, FrameConfig, DEFAULT_MAX_FRAMES_IN_FLIGHT};
pub use error::{RenderError, Result};
pub use frame::{Frame, FrameDriver, FrameEnd, FramePhase, FrameStart};
pub use image_set::PresentableImages;
pub use negotiate::{
    choose_present_mode, choose_surface_format, extent_from_caps, image_count, negotiate,
    Negotiated,
};
pub use session::Session;
pub use swapchain::Swapchain;
pub use sync::{FrameSync, SyncSet};
pub use types::{
    ColorSpace, CommandBufferLevel, Extent2D, PixelFormat, PresentMode, RenderSize,
    SurfaceCapabilities, SurfaceFormat, SurfaceSupport, UNDEFINED_EXTENT,
};
pub use window::{wait_for_nonzero_size, SurfaceWindow};
