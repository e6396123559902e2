// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use pacer_core::{init_tracing, load_config_or_default};
use pacer_platform::PlatformWindow;
use pacer_render::{
    CommandBufferLevel, CommandBufferSet, FrameConfig, FrameDriver, FrameEnd, FrameStart,
    PresentMode, Session, SyncSet,
};
use pacer_render_vk::{
    read_spirv_file, vk, DeviceBuffer, GraphicsPipeline, Vertex, VkDevice, TRIANGLE_FRAG_SPV,
    TRIANGLE_INDICES, TRIANGLE_VERTICES, TRIANGLE_VERT_SPV,
};
use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing file means defaults
    #[arg(long, default_value = "pacer.toml")]
    config: PathBuf,

    /// Override frame.max_frames_in_flight
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Override frame.present_mode: immediate | mailbox | fifo | fifo_relaxed
    #[arg(long, value_parser = parse_present_mode)]
    present_mode: Option<PresentMode>,

    /// Exit after this many presented frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Load tri.vert.spv / tri.frag.spv from here instead of the built-in shaders
    #[arg(long)]
    shader_dir: Option<PathBuf>,
}

fn parse_present_mode(s: &str) -> std::result::Result<PresentMode, String> {
    match s {
        "immediate" => Ok(PresentMode::Immediate),
        "mailbox" => Ok(PresentMode::Mailbox),
        "fifo" => Ok(PresentMode::Fifo),
        "fifo_relaxed" | "fifo-relaxed" => Ok(PresentMode::FifoRelaxed),
        other => Err(format!(
            "unknown present mode {other:?} (immediate | mailbox | fifo | fifo_relaxed)"
        )),
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "pacer".into(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AppCfg {
    window: WindowCfg,
    frame: FrameConfig,
}

impl AppCfg {
    /// CLI flags win over the file.
    fn apply_args(&mut self, args: &Args) {
        if let Some(n) = args.frames_in_flight {
            self.frame.max_frames_in_flight = n;
        }
        if let Some(mode) = args.present_mode {
            self.frame.present_mode = mode;
        }
    }
}

struct Geometry {
    vertices: DeviceBuffer,
    indices: DeviceBuffer,
    index_count: u32,
}

fn load_shaders(dir: Option<&Path>) -> Result<(Cow<'static, [u8]>, Cow<'static, [u8]>)> {
    match dir {
        Some(dir) => {
            let vert = read_spirv_file(dir.join("tri.vert.spv"))?;
            let frag = read_spirv_file(dir.join("tri.frag.spv"))?;
            info!("shaders loaded from {}", dir.display());
            Ok((Cow::Owned(vert), Cow::Owned(frag)))
        }
        None => Ok((
            Cow::Borrowed(TRIANGLE_VERT_SPV),
            Cow::Borrowed(TRIANGLE_FRAG_SPV),
        )),
    }
}

fn upload_triangle(device: &VkDevice) -> Result<Geometry> {
    let vertices = device
        .upload_staged(
            bytemuck::cast_slice(&TRIANGLE_VERTICES),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
        .context("vertex buffer")?;
    let indices = device
        .upload_staged(
            bytemuck::cast_slice(&TRIANGLE_INDICES),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )
        .context("index buffer")?;
    Ok(Geometry {
        vertices,
        indices,
        index_count: TRIANGLE_INDICES.len() as u32,
    })
}

fn frame_loop(
    driver: &mut FrameDriver<'_, VkDevice>,
    window: &mut PlatformWindow,
    pipeline: &GraphicsPipeline,
    geometry: &Geometry,
    max_frames: Option<u64>,
) -> Result<()> {
    let mut frames = 0u32;
    let mut last_fps_instant = Instant::now();

    loop {
        window.poll_events();
        if window.should_close() {
            break;
        }
        if max_frames.is_some_and(|n| driver.frames_presented() >= n) {
            info!("presented {} frames, exiting", driver.frames_presented());
            break;
        }

        let frame = match driver.begin_frame(window)? {
            FrameStart::Ready(frame) => frame,
            FrameStart::Recreated => continue,
        };
        driver.record(&frame, |cmd| {
            pipeline.draw_indexed(
                cmd,
                frame.extent,
                &geometry.vertices,
                &geometry.indices,
                geometry.index_count,
            );
            Ok(())
        })?;

        match driver.end_frame(window)? {
            FrameEnd::Presented => {
                frames = frames.saturating_add(1);
                // some platforms never report a stale swapchain on resize
                if window.take_resized() {
                    driver.recreate_swapchain(window)?;
                }
            }
            FrameEnd::Recreated => {
                window.take_resized();
            }
        }

        let now = Instant::now();
        if now.duration_since(last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", frames);
            frames = 0;
            last_fps_instant = now;
        }
    }
    Ok(())
}

// STRICT ORDER (setup):
// shaders (fail before any GPU object) → window → device → session →
// sync + commands → pipeline + geometry → driver
// Teardown is the reverse, after a device-idle wait.
fn run(args: &Args, cfg: AppCfg) -> Result<()> {
    let (vert, frag) = load_shaders(args.shader_dir.as_deref())?;

    let mut window = PlatformWindow::new(&cfg.window.title, cfg.window.width, cfg.window.height)?;
    let device = VkDevice::new(&window, &window, &cfg.window.title).context("vulkan init")?;

    let mut session = Session::new(device.clone(), &mut window, cfg.frame.clone())?;
    let frames_in_flight = session.config().max_frames_in_flight;
    let sync = SyncSet::create(&device, frames_in_flight)?;
    let mut commands =
        CommandBufferSet::create(&device, CommandBufferLevel::Primary, frames_in_flight)?;
    commands.set_clear_color(cfg.frame.clear_color);

    let pipeline = GraphicsPipeline::new(
        &device,
        session.render_pass(),
        &vert,
        &frag,
        &Vertex::pipeline_config(),
    )?;
    let geometry = upload_triangle(&device)?;

    let mut driver = FrameDriver::new(&mut session, &sync, &commands)?;
    let res = frame_loop(&mut driver, &mut window, &pipeline, &geometry, args.max_frames);

    // nothing may be in flight when geometry and pipeline drop
    if let Err(e) = driver.wait_idle() {
        warn!("wait_idle at shutdown failed: {e}");
    }
    res
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg: AppCfg = load_config_or_default(&args.config);
    cfg.apply_args(&args);
    info!(
        "frames in flight = {}, present mode = {:?}",
        cfg.frame.max_frames_in_flight, cfg.frame.present_mode
    );

    if let Err(e) = run(&args, cfg) {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
