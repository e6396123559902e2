// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, warn};

use crate::backend::GpuBackend;
use crate::error::{RenderError, Result};

/// Per-slot synchronization primitives.
pub struct FrameSync<B: GpuBackend> {
    /// Signaled by the presentation engine when the acquired image is usable.
    pub image_available: B::Semaphore,
    /// Signaled by the slot's submission; present waits on it.
    pub render_finished: B::Semaphore,
    /// CPU waits on this before reusing the slot. Created signaled.
    pub in_flight: B::Fence,
}

impl<B: GpuBackend> Clone for FrameSync<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: GpuBackend> Copy for FrameSync<B> {}

/// One [`FrameSync`] per frame slot. Slot count is independent of the
/// swapchain image count.
pub struct SyncSet<B: GpuBackend> {
    device: B,
    slots: Vec<FrameSync<B>>,
}

impl<B: GpuBackend> SyncSet<B> {
    pub fn create(device: &B, slot_count: usize) -> Result<Self> {
        if slot_count == 0 {
            return Err(RenderError::InvalidConfig(
                "sync set needs at least one frame slot".into(),
            ));
        }

        let mut set = Self {
            device: device.clone(),
            slots: Vec::with_capacity(slot_count),
        };
        // on failure `set` drops and releases whatever slots were built
        for _ in 0..slot_count {
            let image_available = device.create_semaphore()?;
            let render_finished = match device.create_semaphore() {
                Ok(s) => s,
                Err(e) => {
                    device.destroy_semaphore(image_available);
                    return Err(e);
                }
            };
            // signaled so the very first wait on each slot returns at once
            let in_flight = match device.create_fence(true) {
                Ok(f) => f,
                Err(e) => {
                    device.destroy_semaphore(render_finished);
                    device.destroy_semaphore(image_available);
                    return Err(e);
                }
            };
            set.slots.push(FrameSync {
                image_available,
                render_finished,
                in_flight,
            });
        }
        debug!("created sync objects for {slot_count} frame slots");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSync<B>> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[FrameSync<B>] {
        &self.slots
    }

    /// Waits for the device to go idle, then destroys every semaphore and
    /// fence. Second call is a no-op.
    pub fn destroy(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle before sync teardown failed: {e}");
        }
        for s in self.slots.drain(..) {
            self.device.destroy_semaphore(s.render_finished);
            self.device.destroy_semaphore(s.image_available);
            self.device.destroy_fence(s.in_flight);
        }
        debug!("destroyed sync objects");
    }
}

impl<B: GpuBackend> Drop for SyncSet<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
