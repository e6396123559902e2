// SPDX-License-Identifier: CEPL-1.0
//! Surface format / present mode / extent / image count selection.

use tracing::warn;

use crate::config::{FormatFallback, FrameConfig};
use crate::error::{RenderError, Result};
use crate::types::{
    Extent2D, PresentMode, RenderSize, SurfaceCapabilities, SurfaceFormat, SurfaceSupport,
};

/// The full set of choices made for one swapchain build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Negotiated {
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub min_image_count: u32,
}

pub fn negotiate(
    support: &SurfaceSupport,
    window_size: RenderSize,
    cfg: &FrameConfig,
) -> Result<Negotiated> {
    if support.formats.is_empty() {
        return Err(RenderError::SurfaceLost(
            "surface reports no formats".into(),
        ));
    }
    if support.present_modes.is_empty() {
        return Err(RenderError::SurfaceLost(
            "surface reports no present modes".into(),
        ));
    }

    Ok(Negotiated {
        format: choose_surface_format(
            &support.formats,
            cfg.preferred_surface_format(),
            cfg.format_fallback,
        )?,
        present_mode: choose_present_mode(&support.present_modes, cfg.present_mode),
        extent: extent_from_caps(&support.capabilities, window_size),
        min_image_count: image_count(&support.capabilities),
    })
}

/// `formats` must be non-empty.
pub fn choose_surface_format(
    formats: &[SurfaceFormat],
    preferred: SurfaceFormat,
    fallback: FormatFallback,
) -> Result<SurfaceFormat> {
    if formats.contains(&preferred) {
        return Ok(preferred);
    }
    match (fallback, formats.first()) {
        (FormatFallback::FirstAvailable, Some(&first)) => {
            warn!(
                "preferred surface format {:?} unavailable, using {:?}",
                preferred, first
            );
            Ok(first)
        }
        (FormatFallback::FirstAvailable, None) => {
            Err(RenderError::SurfaceLost("surface reports no formats".into()))
        }
        (FormatFallback::Strict, _) => Err(RenderError::UnsupportedSurface { wanted: preferred }),
    }
}

/// FIFO is required to be supported, so it is always a valid answer.
pub fn choose_present_mode(modes: &[PresentMode], preferred: PresentMode) -> PresentMode {
    [preferred, PresentMode::Fifo]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(PresentMode::Fifo)
}

pub fn extent_from_caps(caps: &SurfaceCapabilities, want: RenderSize) -> Extent2D {
    if !caps.extent_is_undefined() {
        caps.current_extent
    } else {
        Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn image_count(caps: &SurfaceCapabilities) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}
