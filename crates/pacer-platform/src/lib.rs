// SPDX-License-Identifier: CEPL-1.0
//! `winit` window driven by event pumping instead of `run_app`, so the frame
//! loop stays in the caller's hands.
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use pacer_render::{RenderSize, SurfaceWindow};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

pub use winit;

/// Event-side state; also the `ApplicationHandler` the loop is pumped with.
struct WindowState {
    title: String,
    initial_size: PhysicalSize<u32>,
    window: Option<Window>,
    create_error: Option<winit::error::OsError>,
    size: RenderSize,
    resized: bool,
    close_requested: bool,
}

impl WindowState {
    fn new(title: &str, width: u32, height: u32) -> Self {
        Self {
            title: title.to_owned(),
            initial_size: PhysicalSize::new(width, height),
            window: None,
            create_error: None,
            size: RenderSize::new(width, height),
            resized: false,
            close_requested: false,
        }
    }

    fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(s) => {
                let size = RenderSize::new(s.width, s.height);
                if size != self.size {
                    debug!("Resized → {}x{}", size.width, size.height);
                    self.size = size;
                    self.resized = true;
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                self.close_requested = true;
            }
            WindowEvent::Occluded(occluded) => debug!("Occluded={occluded}"),
            _ => {}
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(self.initial_size);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let s = window.inner_size();
                self.size = RenderSize::new(s.width, s.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != window_id) {
            return;
        }
        self.on_window_event(&event);
    }
}

/// A single window plus the event loop that feeds it.
pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    /// Creates the event loop and pumps it until the window exists.
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new().context("EventLoop::new")?;
        let mut this = Self {
            event_loop,
            state: WindowState::new(title, width, height),
        };

        while this.state.window.is_none() {
            let status = this
                .event_loop
                .pump_app_events(Some(Duration::from_millis(16)), &mut this.state);
            if let Some(e) = this.state.create_error.take() {
                return Err(e).context("create_window");
            }
            if let PumpStatus::Exit(code) = status {
                return Err(anyhow!("event loop exited ({code}) before the window was created"));
            }
        }

        let size = this.state.size;
        info!("window \"{}\" {}x{}", title, size.width, size.height);
        Ok(this)
    }

    /// Processes pending events without blocking.
    pub fn poll_events(&mut self) {
        if let PumpStatus::Exit(_) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
        {
            self.state.close_requested = true;
        }
    }

    pub fn should_close(&self) -> bool {
        self.state.close_requested
    }

    /// True once after any size change since the last call.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }
}

impl SurfaceWindow for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        match &self.state.window {
            Some(w) => {
                let s = w.inner_size();
                RenderSize::new(s.width, s.height)
            }
            None => self.state.size,
        }
    }

    fn wait_events(&mut self) {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(None, &mut self.state) {
            self.state.close_requested = true;
        }
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .display_handle()
    }
}
