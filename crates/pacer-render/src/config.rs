// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;

use crate::error::{RenderError, Result};
use crate::types::{ColorSpace, PixelFormat, PresentMode, SurfaceFormat};

pub const DEFAULT_MAX_FRAMES_IN_FLIGHT: usize = 2;

/// What to do when the surface does not offer the preferred format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFallback {
    /// Take whatever the surface lists first.
    #[default]
    FirstAvailable,
    /// Refuse to build a swapchain.
    Strict,
}

/// Frame pacing and surface negotiation tunables.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub max_frames_in_flight: usize,
    pub preferred_format: PixelFormat,
    pub preferred_color_space: ColorSpace,
    pub present_mode: PresentMode,
    pub format_fallback: FormatFallback,
    pub clear_color: [f32; 4],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: DEFAULT_MAX_FRAMES_IN_FLIGHT,
            preferred_format: PixelFormat::Bgra8Srgb,
            preferred_color_space: ColorSpace::SrgbNonlinear,
            present_mode: PresentMode::Mailbox,
            format_fallback: FormatFallback::FirstAvailable,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl FrameConfig {
    pub fn preferred_surface_format(&self) -> SurfaceFormat {
        SurfaceFormat::new(self.preferred_format, self.preferred_color_space)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "max_frames_in_flight must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
