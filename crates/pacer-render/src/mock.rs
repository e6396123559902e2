// SPDX-License-Identifier: CEPL-1.0
//! In-memory [`GpuBackend`] for tests.
//!
//! Simulates fences, semaphores, command buffer states and presentable image
//! ownership closely enough that protocol violations panic instead of
//! silently passing. GPU work completes only when the CPU waits for it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::backend::{AcquireOutcome, GpuBackend, PresentOutcome, Submission, SwapchainDesc};
use crate::error::{RenderError, Result};
use crate::negotiate::extent_from_caps;
use crate::types::{
    ColorSpace, CommandBufferLevel, Extent2D, PixelFormat, PresentMode, RenderSize,
    SurfaceCapabilities, SurfaceFormat, SurfaceSupport, UNDEFINED_EXTENT,
};
use crate::window::SurfaceWindow;

type Handle = u64;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Emitted when a fence wait returns (the fence is signaled at that point).
    WaitFence(Handle),
    ResetFence(Handle),
    Reset(Handle),
    Begin(Handle),
    BeginRenderPass {
        cmd: Handle,
        render_pass: Handle,
        framebuffer: Handle,
        extent: Extent2D,
        clear: [f32; 4],
    },
    EndRenderPass(Handle),
    End(Handle),
    Acquire(Option<u32>),
    Submit { cmd: Handle, fence: Handle },
    Present(u32),
    WaitIdle,
    Note(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmdState {
    Initial,
    Recording,
    Executable,
    Pending,
}

struct MockSwapchain {
    extent: Extent2D,
    images: Vec<Handle>,
    next: usize,
}

struct Pending {
    cmd: Handle,
    fence: Handle,
    signal: Handle,
    /// Set by present: the image is handed back once this work completes.
    presents: Option<Handle>,
}

struct MockState {
    next_handle: Handle,
    surface: RenderSize,
    extent_undefined: bool,
    formats: Vec<SurfaceFormat>,
    present_modes: Vec<PresentMode>,
    min_image_count: u32,
    max_image_count: u32,

    swapchains: HashMap<Handle, MockSwapchain>,
    busy_images: HashSet<Handle>,
    views: HashSet<Handle>,
    render_passes: HashSet<Handle>,
    framebuffers: HashSet<Handle>,
    fences: HashMap<Handle, bool>,
    semaphores: HashMap<Handle, bool>,
    command_buffers: HashMap<Handle, CmdState>,
    pending: VecDeque<Pending>,

    fences_until_failure: Option<usize>,
    views_until_failure: Option<usize>,
    acquire_failure: Option<RenderError>,
    submit_failure: Option<RenderError>,
    present_failure: Option<RenderError>,
    wait_idle_failures: usize,
    forced_present: VecDeque<PresentOutcome>,
    suboptimal_acquires: usize,
    wait_idle_calls: usize,
    wait_event_calls: usize,
    restore: Option<(usize, RenderSize)>,
    events: Vec<Event>,
}

impl MockState {
    fn handle(&mut self) -> Handle {
        self.next_handle += 1;
        self.next_handle
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        let current_extent = if self.extent_undefined {
            Extent2D::new(UNDEFINED_EXTENT, UNDEFINED_EXTENT)
        } else {
            self.surface.into()
        };
        SurfaceCapabilities {
            min_image_count: self.min_image_count,
            max_image_count: self.max_image_count,
            current_extent,
            min_image_extent: Extent2D::new(1, 1),
            max_image_extent: Extent2D::new(4096, 4096),
        }
    }

    fn surface_extent(&self) -> Extent2D {
        if self.surface.is_zero() {
            return Extent2D::default();
        }
        extent_from_caps(&self.capabilities(), self.surface)
    }

    fn complete_front(&mut self) {
        let Some(done) = self.pending.pop_front() else {
            panic!("no pending GPU work to complete");
        };
        self.fences.insert(done.fence, true);
        self.command_buffers.insert(done.cmd, CmdState::Executable);
        match done.presents {
            Some(image) => {
                self.busy_images.remove(&image);
            }
            None => {
                self.semaphores.insert(done.signal, true);
            }
        }
    }

    fn fence_is_pending(&self, fence: Handle) -> bool {
        self.pending.iter().any(|p| p.fence == fence)
    }

    fn semaphore_is_pending(&self, sem: Handle) -> bool {
        self.pending.iter().any(|p| p.signal == sem)
    }
}

/// Shared-state fake device. Clones observe the same state.
#[derive(Clone)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
}

impl MockDevice {
    pub fn new(surface: RenderSize) -> Self {
        let state = MockState {
            next_handle: 0,
            surface,
            extent_undefined: false,
            formats: vec![
                SurfaceFormat::new(PixelFormat::Rgba8Unorm, ColorSpace::SrgbNonlinear),
                SurfaceFormat::new(PixelFormat::Bgra8Srgb, ColorSpace::SrgbNonlinear),
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            min_image_count: 2,
            max_image_count: 0,
            swapchains: HashMap::new(),
            busy_images: HashSet::new(),
            views: HashSet::new(),
            render_passes: HashSet::new(),
            framebuffers: HashSet::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            command_buffers: HashMap::new(),
            pending: VecDeque::new(),
            fences_until_failure: None,
            views_until_failure: None,
            acquire_failure: None,
            submit_failure: None,
            present_failure: None,
            wait_idle_failures: 0,
            forced_present: VecDeque::new(),
            suboptimal_acquires: 0,
            wait_idle_calls: 0,
            wait_event_calls: 0,
            restore: None,
            events: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn set_extent_undefined(&self, undefined: bool) {
        self.state.borrow_mut().extent_undefined = undefined;
    }

    pub fn set_formats(&self, formats: Vec<SurfaceFormat>) {
        self.state.borrow_mut().formats = formats;
    }

    pub fn set_image_count_limits(&self, min: u32, max: u32) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        s.min_image_count = min;
        s.max_image_count = max;
    }

    pub fn fail_fence_creation_after(&self, successes: usize) {
        self.state.borrow_mut().fences_until_failure = Some(successes);
    }

    pub fn fail_view_creation_after(&self, successes: usize) {
        self.state.borrow_mut().views_until_failure = Some(successes);
    }

    /// Next acquire fails with `err` and touches nothing.
    pub fn fail_next_acquire(&self, err: RenderError) {
        self.state.borrow_mut().acquire_failure = Some(err);
    }

    /// Next submit fails with `err`; nothing is queued.
    pub fn fail_next_submit(&self, err: RenderError) {
        self.state.borrow_mut().submit_failure = Some(err);
    }

    /// Next present fails with `err` before the image is queued.
    pub fn fail_next_present(&self, err: RenderError) {
        self.state.borrow_mut().present_failure = Some(err);
    }

    /// The next `n` device-idle waits fail without draining anything.
    pub fn fail_wait_idle(&self, n: usize) {
        self.state.borrow_mut().wait_idle_failures = n;
    }

    /// Next present returns `outcome` regardless of the surface.
    pub fn force_present(&self, outcome: PresentOutcome) {
        self.state.borrow_mut().forced_present.push_back(outcome);
    }

    /// Next acquire succeeds but reports the swapchain as suboptimal.
    pub fn force_suboptimal_acquire(&self) {
        self.state.borrow_mut().suboptimal_acquires += 1;
    }

    pub fn fence_signaled(&self, fence: Handle) -> bool {
        self.state.borrow().fences.get(&fence).copied().unwrap_or(false)
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }

    pub fn live_image_views(&self) -> usize {
        self.state.borrow().views.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_render_passes(&self) -> usize {
        self.state.borrow().render_passes.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.borrow().fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.borrow().semaphores.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.state.borrow().command_buffers.len()
    }

    pub fn pending_submissions(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state.borrow().wait_idle_calls
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn note(&self, what: &'static str) {
        self.state.borrow_mut().events.push(Event::Note(what));
    }
}

impl GpuBackend for MockDevice {
    type Swapchain = Handle;
    type Image = Handle;
    type ImageView = Handle;
    type RenderPass = Handle;
    type Framebuffer = Handle;
    type Fence = Handle;
    type Semaphore = Handle;
    type CommandBuffer = Handle;

    fn surface_support(&self) -> Result<SurfaceSupport> {
        let s = self.state.borrow();
        Ok(SurfaceSupport {
            capabilities: s.capabilities(),
            formats: s.formats.clone(),
            present_modes: s.present_modes.clone(),
        })
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(Handle, Vec<Handle>)> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let handle = s.handle();
        let images: Vec<Handle> = (0..desc.min_image_count).map(|_| s.handle()).collect();
        s.swapchains.insert(
            handle,
            MockSwapchain {
                extent: desc.extent,
                images: images.clone(),
                next: 0,
            },
        );
        Ok((handle, images))
    }

    fn destroy_swapchain(&self, swapchain: Handle) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(sc) = s.swapchains.remove(&swapchain) else {
            panic!("swapchain {swapchain} destroyed twice");
        };
        for image in &sc.images {
            assert!(
                !s.pending.iter().any(|p| p.presents == Some(*image)),
                "swapchain destroyed while image {image} is queued for present"
            );
            // acquired but never presented goes away with the swapchain
            s.busy_images.remove(image);
        }
    }

    fn create_color_view(&self, _image: Handle, _format: SurfaceFormat) -> Result<Handle> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        match s.views_until_failure {
            Some(0) => {
                return Err(RenderError::device(
                    "create_image_view",
                    "ERROR_OUT_OF_HOST_MEMORY",
                ))
            }
            Some(n) => s.views_until_failure = Some(n - 1),
            None => {}
        }
        let view = s.handle();
        s.views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: Handle) {
        assert!(
            self.state.borrow_mut().views.remove(&view),
            "image view {view} destroyed twice"
        );
    }

    fn create_render_pass(&self, _format: SurfaceFormat) -> Result<Handle> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let rp = s.handle();
        s.render_passes.insert(rp);
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: Handle) {
        assert!(
            self.state.borrow_mut().render_passes.remove(&render_pass),
            "render pass {render_pass} destroyed twice"
        );
    }

    fn create_framebuffer(&self, render_pass: Handle, view: Handle, _extent: Extent2D) -> Result<Handle> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert!(s.render_passes.contains(&render_pass), "framebuffer on dead render pass");
        assert!(s.views.contains(&view), "framebuffer on dead image view");
        let fb = s.handle();
        s.framebuffers.insert(fb);
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: Handle) {
        assert!(
            self.state.borrow_mut().framebuffers.remove(&framebuffer),
            "framebuffer {framebuffer} destroyed twice"
        );
    }

    fn create_fence(&self, signaled: bool) -> Result<Handle> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        match s.fences_until_failure {
            Some(0) => return Err(RenderError::device("create_fence", "ERROR_OUT_OF_DEVICE_MEMORY")),
            Some(n) => s.fences_until_failure = Some(n - 1),
            None => {}
        }
        let fence = s.handle();
        s.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: Handle) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert!(!s.fence_is_pending(fence), "fence {fence} destroyed while pending");
        assert!(s.fences.remove(&fence).is_some(), "fence {fence} destroyed twice");
    }

    fn wait_for_fence(&self, fence: Handle) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(&signaled) = s.fences.get(&fence) else {
            panic!("wait on destroyed fence {fence}");
        };
        if !signaled {
            assert!(
                s.fence_is_pending(fence),
                "wait on unsignaled fence {fence} with no work that signals it"
            );
            while !s.fences.get(&fence).copied().unwrap_or(false) {
                s.complete_front();
            }
        }
        s.events.push(Event::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: Handle) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert!(!s.fence_is_pending(fence), "reset of fence {fence} still in use by the GPU");
        assert!(s.fences.insert(fence, false).is_some(), "reset of destroyed fence {fence}");
        s.events.push(Event::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> Result<Handle> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let sem = s.handle();
        s.semaphores.insert(sem, false);
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: Handle) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert!(
            !s.semaphore_is_pending(semaphore),
            "semaphore {semaphore} destroyed while pending"
        );
        assert!(
            s.semaphores.remove(&semaphore).is_some(),
            "semaphore {semaphore} destroyed twice"
        );
    }

    fn allocate_command_buffers(&self, _level: CommandBufferLevel, count: u32) -> Result<Vec<Handle>> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let buffers: Vec<Handle> = (0..count).map(|_| s.handle()).collect();
        for &b in &buffers {
            s.command_buffers.insert(b, CmdState::Initial);
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, buffers: &[Handle]) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        for b in buffers {
            match s.command_buffers.remove(b) {
                Some(CmdState::Pending) => panic!("command buffer {b} freed while pending"),
                Some(_) => {}
                None => panic!("command buffer {b} freed twice"),
            }
        }
    }

    fn reset_command_buffer(&self, cmd: Handle) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        match s.command_buffers.get(&cmd) {
            Some(CmdState::Pending) => panic!("reset of command buffer {cmd} still pending"),
            Some(_) => {}
            None => panic!("reset of freed command buffer {cmd}"),
        }
        s.command_buffers.insert(cmd, CmdState::Initial);
        s.events.push(Event::Reset(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: Handle) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        match s.command_buffers.get(&cmd) {
            Some(CmdState::Pending) => panic!("begin on pending command buffer {cmd}"),
            Some(CmdState::Recording) => panic!("begin on command buffer {cmd} already recording"),
            Some(_) => {}
            None => panic!("begin on freed command buffer {cmd}"),
        }
        s.command_buffers.insert(cmd, CmdState::Recording);
        s.events.push(Event::Begin(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: Handle) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert_eq!(
            s.command_buffers.get(&cmd),
            Some(&CmdState::Recording),
            "end on command buffer {cmd} that is not recording"
        );
        s.command_buffers.insert(cmd, CmdState::Executable);
        s.events.push(Event::End(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: Handle,
        render_pass: Handle,
        framebuffer: Handle,
        extent: Extent2D,
        clear: [f32; 4],
    ) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        assert!(s.render_passes.contains(&render_pass), "dead render pass {render_pass}");
        assert!(s.framebuffers.contains(&framebuffer), "dead framebuffer {framebuffer}");
        s.events.push(Event::BeginRenderPass {
            cmd,
            render_pass,
            framebuffer,
            extent,
            clear,
        });
    }

    fn cmd_end_render_pass(&self, cmd: Handle) {
        self.state.borrow_mut().events.push(Event::EndRenderPass(cmd));
    }

    fn acquire_next_image(&self, swapchain: Handle, signal: Handle) -> Result<AcquireOutcome> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if let Some(err) = s.acquire_failure.take() {
            return Err(err);
        }
        let surface = s.surface_extent();
        let Some(sc) = s.swapchains.get_mut(&swapchain) else {
            panic!("acquire on destroyed swapchain {swapchain}");
        };
        if sc.extent != surface {
            s.events.push(Event::Acquire(None));
            return Ok(AcquireOutcome::OutOfDate);
        }
        let index = sc.next;
        let image = sc.images[index];
        sc.next = (sc.next + 1) % sc.images.len();

        assert!(
            s.busy_images.insert(image),
            "acquired image {index} is still in flight"
        );
        match s.semaphores.get(&signal) {
            Some(false) => {}
            Some(true) => panic!("acquire signals semaphore {signal} that is already signaled"),
            None => panic!("acquire signals destroyed semaphore {signal}"),
        }
        s.semaphores.insert(signal, true);

        let suboptimal = s.suboptimal_acquires > 0;
        if suboptimal {
            s.suboptimal_acquires -= 1;
        }
        let index = index as u32;
        s.events.push(Event::Acquire(Some(index)));
        Ok(AcquireOutcome::Acquired { index, suboptimal })
    }

    fn submit(&self, submission: &Submission<Self>) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if let Some(err) = s.submit_failure.take() {
            return Err(err);
        }
        let (cmd, fence) = (submission.command_buffer, submission.fence);
        assert_eq!(
            s.command_buffers.get(&cmd),
            Some(&CmdState::Executable),
            "submit of command buffer {cmd} that was not recorded"
        );
        assert_eq!(
            s.semaphores.get(&submission.wait),
            Some(&true),
            "submit waits on semaphore {} that nothing signaled",
            submission.wait
        );
        assert_eq!(
            s.fences.get(&fence),
            Some(&false),
            "submit with fence {fence} that is signaled or destroyed"
        );
        s.semaphores.insert(submission.wait, false);
        s.command_buffers.insert(cmd, CmdState::Pending);
        s.pending.push_back(Pending {
            cmd,
            fence,
            signal: submission.signal,
            presents: None,
        });
        s.events.push(Event::Submit { cmd, fence });
        Ok(())
    }

    fn present(&self, swapchain: Handle, image_index: u32, wait: Handle) -> Result<PresentOutcome> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if let Some(err) = s.present_failure.take() {
            return Err(err);
        }
        let surface = s.surface_extent();
        let Some(sc) = s.swapchains.get(&swapchain) else {
            panic!("present on destroyed swapchain {swapchain}");
        };
        let image = sc.images[image_index as usize];
        let stale = sc.extent != surface;

        // the image goes back to the engine once the waited-on work is done
        match s.pending.iter_mut().find(|p| p.signal == wait) {
            Some(p) => p.presents = Some(image),
            None => {
                assert_eq!(
                    s.semaphores.get(&wait),
                    Some(&true),
                    "present waits on semaphore {wait} that nothing signals"
                );
                s.semaphores.insert(wait, false);
                s.busy_images.remove(&image);
            }
        }
        s.events.push(Event::Present(image_index));

        if let Some(forced) = s.forced_present.pop_front() {
            return Ok(forced);
        }
        Ok(if stale {
            PresentOutcome::OutOfDate
        } else {
            PresentOutcome::Presented
        })
    }

    fn wait_idle(&self) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if s.wait_idle_failures > 0 {
            s.wait_idle_failures -= 1;
            return Err(RenderError::device("vkDeviceWaitIdle", "ERROR_DEVICE_LOST"));
        }
        while !s.pending.is_empty() {
            s.complete_front();
        }
        s.wait_idle_calls += 1;
        s.events.push(Event::WaitIdle);
        Ok(())
    }
}

/// Window that reports the mock device's surface size.
pub struct MockWindow {
    state: Rc<RefCell<MockState>>,
}

impl MockWindow {
    pub fn new(device: &MockDevice) -> Self {
        Self {
            state: Rc::clone(&device.state),
        }
    }

    pub fn resize(&mut self, size: RenderSize) {
        self.state.borrow_mut().surface = size;
    }

    /// After `calls` total `wait_events` calls the window reports `size`.
    pub fn restore_after(&mut self, calls: usize, size: RenderSize) {
        self.state.borrow_mut().restore = Some((calls, size));
    }

    pub fn wait_calls(&self) -> usize {
        self.state.borrow().wait_event_calls
    }
}

impl SurfaceWindow for MockWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.borrow().surface
    }

    fn wait_events(&mut self) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        s.wait_event_calls += 1;
        if let Some((calls, size)) = s.restore {
            if s.wait_event_calls >= calls {
                s.surface = size;
                s.restore = None;
            }
        }
        assert!(s.wait_event_calls < 10_000, "window never restored");
    }
}
