// SPDX-License-Identifier: CEPL-1.0
use ash::{prelude::VkResult, vk};
use pacer_render::{RenderError, Result};

/// Maps a raw driver result onto [`RenderError::Device`], recording the
/// caller's location and the result's name.
pub(crate) trait VkCheck<T> {
    fn check(self, op: &'static str) -> Result<T>;
}

impl<T> VkCheck<T> for VkResult<T> {
    #[track_caller]
    fn check(self, op: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(code) => Err(RenderError::device(op, result_name(code))),
        }
    }
}

/// `ERROR_DEVICE_LOST` rather than the driver's prose description.
pub(crate) fn result_name(code: vk::Result) -> String {
    format!("{code:?}")
}
