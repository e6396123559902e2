// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Display;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

use crate::frame::FramePhase;
use crate::types::SurfaceFormat;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Failures that end the frame loop or abort setup.
///
/// A stale surface (out-of-date / suboptimal) is deliberately absent: it is
/// reported through [`crate::AcquireOutcome`] and [`crate::PresentOutcome`]
/// and absorbed by the frame driver.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("surface lost: {0}")]
    SurfaceLost(String),

    #[error("surface does not offer {wanted:?} and the format policy is strict")]
    UnsupportedSurface { wanted: SurfaceFormat },

    /// The driver rejected a create/allocate/wait call.
    #[error("{op} failed with {code} at {location}")]
    Device {
        op: &'static str,
        code: String,
        location: &'static Location<'static>,
    },

    /// acquire/submit/present returned something outside success + stale.
    #[error("{op} returned unexpected {code} at {location}")]
    Unexpected {
        op: &'static str,
        code: String,
        location: &'static Location<'static>,
    },

    #[error("resource not found: {}", path.display())]
    ResourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("frame driver out of order: expected {expected:?}, found {found:?}")]
    FrameOrder {
        expected: FramePhase,
        found: FramePhase,
    },

    #[error("swapchain used after destroy")]
    SwapchainDestroyed,
}

impl RenderError {
    #[track_caller]
    pub fn device(op: &'static str, code: impl Display) -> Self {
        RenderError::Device {
            op,
            code: code.to_string(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn unexpected(op: &'static str, code: impl Display) -> Self {
        RenderError::Unexpected {
            op,
            code: code.to_string(),
            location: Location::caller(),
        }
    }
}
