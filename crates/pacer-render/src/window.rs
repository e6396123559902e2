// SPDX-License-Identifier: CEPL-1.0
use tracing::info;

use crate::types::RenderSize;

/// Windowing collaborator: reports framebuffer size and can block on events.
pub trait SurfaceWindow {
    fn framebuffer_size(&self) -> RenderSize;

    /// Blocks until at least one window event has been processed.
    fn wait_events(&mut self);
}

/// Blocks while the window is minimized. Returns the first nonzero size seen.
pub fn wait_for_nonzero_size(window: &mut dyn SurfaceWindow) -> RenderSize {
    let mut size = window.framebuffer_size();
    if size.is_zero() {
        info!("framebuffer is 0x0 (minimized) → waiting for restore");
    }
    while size.is_zero() {
        window.wait_events();
        size = window.framebuffer_size();
    }
    size
}
