// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, trace};

use crate::backend::{AcquireOutcome, GpuBackend, PresentOutcome, Submission};
use crate::command::CommandBufferSet;
use crate::error::{RenderError, Result};
use crate::session::Session;
use crate::sync::{FrameSync, SyncSet};
use crate::types::Extent2D;
use crate::window::SurfaceWindow;

/// Where the driver is inside one acquire → record → submit → present cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    Recreating,
    /// A slot fence was reset but its submission never reached the queue.
    /// Waiting on that slot again would never return, so no further frames
    /// are accepted; only `wait_idle` and teardown remain.
    Failed,
}

/// Everything the caller needs to record one frame.
pub struct Frame<B: GpuBackend> {
    pub slot: usize,
    pub image_index: u32,
    pub command_buffer: B::CommandBuffer,
    pub framebuffer: B::Framebuffer,
    pub render_pass: B::RenderPass,
    pub extent: Extent2D,
}

pub enum FrameStart<B: GpuBackend> {
    Ready(Frame<B>),
    /// The swapchain was stale and has been rebuilt; no frame this call.
    Recreated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameEnd {
    Presented,
    /// Present reported a stale surface and the swapchain was rebuilt.
    Recreated,
}

/// Drives frames over a session, one sync slot and command buffer per frame
/// in flight.
///
/// `current_frame` rotates over `[0, max_frames_in_flight)` independently
/// of which swapchain image is acquired.
///
/// Errors are fatal to the frame but not always to the driver: a failure
/// before the slot fence is reset, or after the submission was queued,
/// returns to [`FramePhase::Idle`] with `current_frame` unchanged. A failure
/// in between leaves the driver in [`FramePhase::Failed`].
pub struct FrameDriver<'a, B: GpuBackend> {
    session: &'a mut Session<B>,
    sync: &'a SyncSet<B>,
    commands: &'a CommandBufferSet<B>,
    max_frames_in_flight: usize,
    current_frame: usize,
    current_image_index: Option<u32>,
    phase: FramePhase,
    frames_presented: u64,
    // slot fence reset, nothing queued yet that will signal it
    fence_unsignaled: bool,
}

impl<'a, B: GpuBackend> FrameDriver<'a, B> {
    pub fn new(
        session: &'a mut Session<B>,
        sync: &'a SyncSet<B>,
        commands: &'a CommandBufferSet<B>,
    ) -> Result<Self> {
        let max_frames_in_flight = session.config().max_frames_in_flight;
        if sync.len() != max_frames_in_flight || commands.len() != max_frames_in_flight {
            return Err(RenderError::InvalidConfig(format!(
                "{} frames in flight but {} sync slots and {} command buffers",
                max_frames_in_flight,
                sync.len(),
                commands.len()
            )));
        }
        Ok(Self {
            session,
            sync,
            commands,
            max_frames_in_flight,
            current_frame: 0,
            current_image_index: None,
            phase: FramePhase::Idle,
            frames_presented: 0,
            fence_unsignaled: false,
        })
    }

    fn expect_phase(&self, expected: FramePhase) -> Result<()> {
        if self.phase != expected {
            return Err(RenderError::FrameOrder {
                expected,
                found: self.phase,
            });
        }
        Ok(())
    }

    fn settle_after_error(&mut self) {
        self.current_image_index = None;
        self.phase = if self.fence_unsignaled {
            FramePhase::Failed
        } else {
            FramePhase::Idle
        };
    }

    fn slot_sync(&self) -> Result<FrameSync<B>> {
        self.sync.slot(self.current_frame).copied().ok_or_else(|| {
            RenderError::InvalidConfig(format!("no sync slot {}", self.current_frame))
        })
    }

    fn slot_command_buffer(&self) -> Result<B::CommandBuffer> {
        self.commands.get(self.current_frame).ok_or_else(|| {
            RenderError::InvalidConfig(format!("no command buffer slot {}", self.current_frame))
        })
    }

    // STRICT ORDER (begin):
    // 1) wait slot fence: the slot's previous submission is finished
    // 2) acquire: signals the slot's image_available semaphore
    // 3) only now reset the fence; an out-of-date acquire leaves it signaled
    //    so the next begin_frame does not deadlock
    // 4) reset the slot command buffer for recording
    /// Waits for the current slot, acquires an image and readies the slot's
    /// command buffer.
    ///
    /// Returns [`FrameStart::Recreated`] when the swapchain had to be rebuilt;
    /// call again to get a frame.
    pub fn begin_frame(&mut self, window: &mut dyn SurfaceWindow) -> Result<FrameStart<B>> {
        self.expect_phase(FramePhase::Idle)?;
        let res = self.try_begin_frame(window);
        if res.is_err() {
            self.settle_after_error();
        }
        res
    }

    fn try_begin_frame(&mut self, window: &mut dyn SurfaceWindow) -> Result<FrameStart<B>> {
        self.phase = FramePhase::Acquiring;
        let sync = self.slot_sync()?;
        let cmd = self.slot_command_buffer()?;
        let device = self.session.device().clone();

        device.wait_for_fence(sync.in_flight)?;

        let swapchain = self.session.swapchain().handle()?;
        let index = match device.acquire_next_image(swapchain, sync.image_available)? {
            AcquireOutcome::OutOfDate => {
                debug!("acquire: swapchain out of date");
                self.recreate(window)?;
                return Ok(FrameStart::Recreated);
            }
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    debug!("acquire: suboptimal image {index}");
                }
                index
            }
        };

        let framebuffer = self.session.swapchain().framebuffer(index).ok_or_else(|| {
            RenderError::unexpected(
                "acquire_next_image",
                format!(
                    "image index {index} of {}",
                    self.session.swapchain().image_count()
                ),
            )
        })?;

        self.fence_unsignaled = true;
        device.reset_fence(sync.in_flight)?;
        self.commands.reset(self.current_frame)?;

        self.current_image_index = Some(index);
        self.phase = FramePhase::Recording;
        trace!("frame slot {} → image {}", self.current_frame, index);

        Ok(FrameStart::Ready(Frame {
            slot: self.current_frame,
            image_index: index,
            command_buffer: cmd,
            framebuffer,
            render_pass: self.session.render_pass(),
            extent: self.session.swapchain().extent(),
        }))
    }

    /// Records `frame`'s command buffer: render pass begin, `draw`, end.
    pub fn record<F>(&self, frame: &Frame<B>, draw: F) -> Result<()>
    where
        F: FnOnce(B::CommandBuffer) -> Result<()>,
    {
        self.expect_phase(FramePhase::Recording)?;
        self.commands.record(
            frame.slot,
            frame.render_pass,
            frame.framebuffer,
            frame.extent,
            draw,
        )
    }

    // STRICT ORDER (end):
    // 1) submit: wait image_available @ COLOR_ATTACHMENT_OUTPUT, signal
    //    render_finished + slot fence
    // 2) present: wait render_finished
    // 3) stale → recreate (the frame was still shown if suboptimal)
    // 4) advance current_frame
    /// Submits the slot's recorded command buffer and presents the image.
    pub fn end_frame(&mut self, window: &mut dyn SurfaceWindow) -> Result<FrameEnd> {
        self.expect_phase(FramePhase::Recording)?;
        let res = self.try_end_frame(window);
        if res.is_err() {
            self.settle_after_error();
        }
        res
    }

    fn try_end_frame(&mut self, window: &mut dyn SurfaceWindow) -> Result<FrameEnd> {
        let image_index = self.current_image_index.ok_or(RenderError::FrameOrder {
            expected: FramePhase::Recording,
            found: self.phase,
        })?;
        let sync = self.slot_sync()?;
        let cmd = self.slot_command_buffer()?;
        let device = self.session.device().clone();

        device.submit(&Submission {
            command_buffer: cmd,
            wait: sync.image_available,
            signal: sync.render_finished,
            fence: sync.in_flight,
        })?;
        self.fence_unsignaled = false;
        self.phase = FramePhase::Submitted;

        let swapchain = self.session.swapchain().handle()?;
        self.phase = FramePhase::Presenting;
        let outcome = device.present(swapchain, image_index, sync.render_finished)?;
        self.current_image_index = None;

        let end = match outcome {
            PresentOutcome::Presented => {
                self.frames_presented += 1;
                FrameEnd::Presented
            }
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                if outcome == PresentOutcome::Suboptimal {
                    self.frames_presented += 1;
                }
                debug!("present: {:?}", outcome);
                self.recreate(window)?;
                FrameEnd::Recreated
            }
        };

        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
        self.phase = FramePhase::Idle;
        Ok(end)
    }

    fn recreate(&mut self, window: &mut dyn SurfaceWindow) -> Result<()> {
        self.phase = FramePhase::Recreating;
        self.session.recreate_swapchain(window)?;
        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Explicit rebuild, e.g. on a window resize event. Only valid between
    /// frames. `current_frame` is kept.
    pub fn recreate_swapchain(&mut self, window: &mut dyn SurfaceWindow) -> Result<()> {
        self.expect_phase(FramePhase::Idle)?;
        let res = self.recreate(window);
        if res.is_err() {
            self.settle_after_error();
        }
        res
    }

    /// Drains the device; call before tearing anything down.
    pub fn wait_idle(&self) -> Result<()> {
        self.session.device().wait_idle()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_image_index(&self) -> Option<u32> {
        self.current_image_index
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn session(&self) -> &Session<B> {
        self.session
    }
}
