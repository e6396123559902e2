// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(debug_assertions)]
type DebugState = Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>;
#[cfg(not(debug_assertions))]
type DebugState = ();

/// Queue family indices on the selected physical device.
///
/// `graphics` and `present` are the same family on most hardware. `compute`
/// falls back to `graphics` when there is no dedicated compute family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
}

impl QueueFamilies {
    pub fn graphics_presents(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct indices in graphics, present, compute order. One queue is
    /// created per entry.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.graphics];
        for f in [self.present, self.compute] {
            if !families.contains(&f) {
                families.push(f);
            }
        }
        families
    }
}

/// What one queue family can do, as far as family selection cares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FamilyCaps {
    pub graphics: bool,
    pub compute: bool,
    pub present: bool,
}

fn first(families: &[FamilyCaps], pred: impl Fn(&FamilyCaps) -> bool) -> Option<u32> {
    families.iter().position(pred).map(|i| i as u32)
}

/// Prefers one family that does both graphics and present; accepts separate
/// ones. `None` when either is missing.
pub(crate) fn select_families(families: &[FamilyCaps]) -> Option<QueueFamilies> {
    let (graphics, present) = match first(families, |f| f.graphics && f.present) {
        Some(both) => (both, both),
        None => (first(families, |f| f.graphics)?, first(families, |f| f.present)?),
    };
    let compute = first(families, |f| f.compute && !f.graphics).unwrap_or(graphics);

    Some(QueueFamilies {
        graphics,
        present,
        compute,
    })
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct for the duration of the call
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();

    use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
    if severity.contains(Sev::ERROR) {
        tracing::error!(target: "vulkan", "{msg}");
    } else if severity.contains(Sev::WARNING) {
        tracing::warn!(target: "vulkan", "{msg}");
    } else if severity.contains(Sev::INFO) {
        tracing::debug!(target: "vulkan", "{msg}");
    } else {
        tracing::trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance, enabled: bool) -> DebugState {
    if !enabled {
        return None;
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));
    match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
        Ok(m) => Some((loader, m)),
        Err(e) => {
            warn!("debug messenger unavailable: {e:?}");
            None
        }
    }
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(_entry: &Entry, _instance: &Instance, _enabled: bool) -> DebugState {}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(dbg: &mut DebugState) {
    if let Some((loader, m)) = dbg.take() {
        unsafe { loader.destroy_debug_utils_messenger(m, None) };
    }
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_dbg: &mut DebugState) {
    // no-op
}

unsafe fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default()
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name)
}

unsafe fn has_instance_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name)
}

unsafe fn has_device_extension(instance: &Instance, phys: vk::PhysicalDevice, name: &CStr) -> bool {
    unsafe { instance.enumerate_device_extension_properties(phys) }
        .unwrap_or_default()
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name)
}

/// Instance-level objects. Dropped after the logical device.
struct InstanceCtx {
    entry: Entry,
    instance: Instance,
    debug: DebugState,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

// STRICT TEARDOWN ORDER (instance level):
// surface → debug messenger → instance
impl Drop for InstanceCtx {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            destroy_debug_messenger(&mut self.debug);
            self.instance.destroy_instance(None);
        }
        debug!("destroyed surface and instance");
    }
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    app_name: &str,
    debug_utils: bool,
    validation: bool,
) -> Result<Instance> {
    let app = CString::new(app_name).context("application name contains NUL")?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app)
        .application_version(0)
        .engine_name(c"pacer")
        .engine_version(0)
        .api_version(vk::API_VERSION_1_0);

    let mut exts = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    if debug_utils {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    let layers: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&exts)
        .enabled_layer_names(&layers);

    Ok(unsafe { entry.create_instance(&create_info, None) }?)
}

// STRICT ORDER:
// 1) Create VkInstance (platform WSI + debug ext)
// 2) Create VkSurfaceKHR FROM THIS INSTANCE
// 3) Pick physical device + queue families AGAINST THIS SURFACE
unsafe fn init_instance_and_surface(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    app_name: &str,
) -> Result<InstanceCtx> {
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("display_handle: {e}"))?
        .as_raw();
    let wh = window
        .window_handle()
        .map_err(|e| anyhow!("window_handle: {e}"))?
        .as_raw();

    let entry = Entry::linked();

    let debug_utils =
        cfg!(debug_assertions) && unsafe { has_instance_extension(&entry, ash::ext::debug_utils::NAME) };
    let validation = cfg!(debug_assertions) && unsafe { has_instance_layer(&entry, VALIDATION_LAYER) };
    if cfg!(debug_assertions) && !validation {
        warn!("validation layer not installed; running without it");
    }

    let instance = unsafe { create_instance(&entry, dh, app_name, debug_utils, validation) }
        .context("create_instance")?;
    let debug = unsafe { create_debug_messenger(&entry, &instance, debug_utils) };
    let surface_loader = surface::Instance::new(&entry, &instance);

    // from here on, failures drop `ctx` and release the instance
    let mut ctx = InstanceCtx {
        entry,
        instance,
        debug,
        surface_loader,
        surface: vk::SurfaceKHR::null(),
    };
    ctx.surface = unsafe { ash_window::create_surface(&ctx.entry, &ctx.instance, dh, wh, None) }
        .context("ash_window::create_surface")?;
    Ok(ctx)
}

struct Candidate {
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    props: vk::PhysicalDeviceProperties,
}

fn device_type_rank(t: vk::PhysicalDeviceType) -> u32 {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

fn device_type_name(t: vk::PhysicalDeviceType) -> &'static str {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
        vk::PhysicalDeviceType::CPU => "cpu",
        _ => "other",
    }
}

unsafe fn pick_physical_device(ctx: &InstanceCtx) -> Result<Candidate> {
    let instance = &ctx.instance;
    let mut best: Option<Candidate> = None;

    for phys in unsafe { instance.enumerate_physical_devices() }
        .context("enumerate_physical_devices")?
    {
        if !unsafe { has_device_extension(instance, phys, swapchain::NAME) } {
            continue;
        }

        let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        let caps: Vec<FamilyCaps> = qprops
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let usable = q.queue_count > 0;
                FamilyCaps {
                    graphics: usable && q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    compute: usable && q.queue_flags.contains(vk::QueueFlags::COMPUTE),
                    present: usable
                        && unsafe {
                            ctx.surface_loader
                                .get_physical_device_surface_support(phys, i as u32, ctx.surface)
                        }
                        .unwrap_or(false),
                }
            })
            .collect();
        let Some(families) = select_families(&caps) else {
            continue;
        };

        // a device that reports no formats or modes cannot host a swapchain
        let formats = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_formats(phys, ctx.surface)
        }
        .unwrap_or_default();
        let modes = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_present_modes(phys, ctx.surface)
        }
        .unwrap_or_default();
        if formats.is_empty() || modes.is_empty() {
            continue;
        }

        let props = unsafe { instance.get_physical_device_properties(phys) };
        let better = best.as_ref().map_or(true, |b| {
            device_type_rank(props.device_type) > device_type_rank(b.props.device_type)
        });
        if better {
            best = Some(Candidate {
                phys,
                families,
                props,
            });
        }
    }

    best.ok_or_else(|| anyhow!("no physical device with graphics + present queues and VK_KHR_swapchain"))
}

pub(crate) struct Inner {
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) command_pool: vk::CommandPool,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
    pub(crate) families: QueueFamilies,
    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    name: String,
    // dropped last
    ctx: InstanceCtx,
}

impl Inner {
    pub(crate) fn surface_loader(&self) -> &surface::Instance {
        &self.ctx.surface_loader
    }

    pub(crate) fn surface(&self) -> vk::SurfaceKHR {
        self.ctx.surface
    }
}

// STRICT TEARDOWN ORDER (device level):
// - device_wait_idle()
// - command pool BEFORE device
// - device BEFORE surface/instance (InstanceCtx drops after this)
impl Drop for Inner {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
        debug!("destroyed logical device {}", self.name);
    }
}

/// Vulkan device provider: instance, surface, physical and logical device,
/// queues and the graphics command pool.
///
/// Clones share one device. Every object created through it must be
/// destroyed before the last clone drops; the `pacer-render` wrappers keep a
/// clone for that reason.
#[derive(Clone)]
pub struct VkDevice {
    pub(crate) inner: Arc<Inner>,
}

impl VkDevice {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
    ) -> Result<Self> {
        let ctx = unsafe { init_instance_and_surface(window, display, app_name) }?;
        let cand = unsafe { pick_physical_device(&ctx) }?;
        let families = cand.families;
        let name = unsafe { CStr::from_ptr(cand.props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let priorities = [1.0_f32];
        let qinfos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|f| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(f)
                    .queue_priorities(&priorities)
            })
            .collect();
        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo::default()
            .queue_create_infos(&qinfos)
            .enabled_extension_names(&device_exts);

        let device = unsafe { ctx.instance.create_device(cand.phys, &dinfo, None) }
            .context("create_device")?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(families.graphics);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(p) => p,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e).context("create_command_pool");
            }
        };

        let (graphics_queue, present_queue, compute_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
                device.get_device_queue(families.compute, 0),
            )
        };
        let swapchain_loader = swapchain::Device::new(&ctx.instance, &device);
        let memory_properties =
            unsafe { ctx.instance.get_physical_device_memory_properties(cand.phys) };

        info!(
            "device: {} ({}), queue families graphics={} present={} compute={}",
            name,
            device_type_name(cand.props.device_type),
            families.graphics,
            families.present,
            families.compute
        );
        if !families.graphics_presents() {
            info!("graphics and present are separate families → concurrent image sharing");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                device,
                swapchain_loader,
                command_pool,
                graphics_queue,
                present_queue,
                compute_queue,
                families,
                phys: cand.phys,
                memory_properties,
                name,
                ctx,
            }),
        })
    }

    /// The logical device, for recording draw commands.
    pub fn raw(&self) -> &ash::Device {
        &self.inner.device
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.inner.phys
    }

    pub fn families(&self) -> QueueFamilies {
        self.inner.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.inner.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.inner.present_queue
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.inner.compute_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFX_PRESENT: FamilyCaps = FamilyCaps {
        graphics: true,
        compute: true,
        present: true,
    };
    const GFX: FamilyCaps = FamilyCaps {
        graphics: true,
        compute: true,
        present: false,
    };
    const COMPUTE: FamilyCaps = FamilyCaps {
        graphics: false,
        compute: true,
        present: false,
    };
    const PRESENT: FamilyCaps = FamilyCaps {
        graphics: false,
        compute: false,
        present: true,
    };

    #[test]
    fn prefers_a_family_that_does_both() {
        let f = select_families(&[GFX, PRESENT, GFX_PRESENT]).unwrap();
        assert_eq!((f.graphics, f.present), (2, 2));
        assert!(f.graphics_presents());
        assert_eq!(f.compute, 2);
        assert_eq!(f.unique(), vec![2]);
    }

    #[test]
    fn accepts_separate_graphics_and_present() {
        let f = select_families(&[PRESENT, GFX]).unwrap();
        assert_eq!((f.graphics, f.present), (1, 0));
        assert!(!f.graphics_presents());
        assert_eq!(f.unique(), vec![1, 0]);
    }

    #[test]
    fn dedicated_compute_family_is_used() {
        let f = select_families(&[GFX_PRESENT, COMPUTE]).unwrap();
        assert_eq!(f.compute, 1);
        assert_eq!(f.unique(), vec![0, 1]);
    }

    #[test]
    fn missing_present_rejects_device() {
        assert_eq!(select_families(&[GFX, COMPUTE]), None);
        assert_eq!(select_families(&[PRESENT]), None);
        assert_eq!(select_families(&[]), None);
    }
}
