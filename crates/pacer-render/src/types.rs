// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;

/// Framebuffer size reported by the windowing layer, in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimized windows report a zero dimension.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel dimensions of swapchain images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<RenderSize> for Extent2D {
    fn from(s: RenderSize) -> Self {
        Self {
            width: s.width,
            height: s.height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
    A2b10g10r10Unorm,
    Rgba16Float,
    /// Backend-specific raw value with no named variant here.
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    SrgbNonlinear,
    ExtendedSrgbLinear,
    Hdr10St2084,
    DisplayP3Nonlinear,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct SurfaceFormat {
    pub format: PixelFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    pub const fn new(format: PixelFormat, color_space: ColorSpace) -> Self {
        Self {
            format,
            color_space,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox, // low latency, never blocks on present
    Fifo,    // vsync; always supported
    FifoRelaxed,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CommandBufferLevel {
    #[default]
    Primary,
    Secondary,
}

/// `current_extent.width == UNDEFINED_EXTENT` means the surface size is
/// decided by the swapchain.
pub const UNDEFINED_EXTENT: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 = no upper bound.
    pub max_image_count: u32,
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
}

impl SurfaceCapabilities {
    pub fn extent_is_undefined(&self) -> bool {
        self.current_extent.width == UNDEFINED_EXTENT
    }
}

/// Everything the presentation layer reports about a surface for one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}
