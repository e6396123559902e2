// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use pacer_render::{RenderError, Result};
use tracing::debug;

use crate::check::VkCheck;
use crate::device::VkDevice;

/// A buffer and its dedicated memory. Both are released on drop.
pub struct DeviceBuffer {
    device: VkDevice,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl DeviceBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Copies `bytes` to the start of the buffer. The memory must be
    /// host-visible and host-coherent.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(RenderError::InvalidConfig(format!(
                "{} bytes do not fit a {}-byte buffer",
                bytes.len(),
                self.size
            )));
        }
        let d = self.device.raw();
        unsafe {
            let ptr = d
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .check("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            d.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        // buffer first; either handle may still be null after a failed create
        unsafe {
            let d = self.device.raw();
            d.destroy_buffer(self.buffer, None);
            d.free_memory(self.memory, None);
        }
    }
}

/// Index of the first memory type allowed by `type_bits` that has every
/// flag in `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize]
                .property_flags
                .contains(required)
    })
}

impl VkDevice {
    pub fn memory_type_index(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type(&self.inner.memory_properties, type_bits, required).ok_or_else(|| {
            RenderError::device("find_memory_type", format!("no memory type with {required:?}"))
        })
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: vk::MemoryPropertyFlags,
    ) -> Result<DeviceBuffer> {
        if size == 0 {
            return Err(RenderError::InvalidConfig("zero-sized buffer".into()));
        }
        let d = self.raw();
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { d.create_buffer(&info, None) }.check("create_buffer")?;

        // from here on an early return drops `out` and frees what exists
        let mut out = DeviceBuffer {
            device: self.clone(),
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };
        let req = unsafe { d.get_buffer_memory_requirements(buffer) };
        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(req.size)
            .memory_type_index(self.memory_type_index(req.memory_type_bits, memory)?);
        out.memory = unsafe { d.allocate_memory(&alloc, None) }.check("allocate_memory")?;
        unsafe { d.bind_buffer_memory(buffer, out.memory, 0) }.check("bind_buffer_memory")?;
        Ok(out)
    }

    /// One-shot staging upload: host → staging, then staging → a new
    /// device-local buffer with `TRANSFER_DST | usage`. Blocks until the copy
    /// has finished on the graphics queue.
    pub fn upload_staged(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> Result<DeviceBuffer> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write(bytes)?;

        let dst = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.one_shot(|d, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { d.cmd_copy_buffer(cmd, staging.handle(), dst.handle(), &[region]) };
        })?;
        debug!("uploaded {size} bytes via staging ({usage:?})");
        Ok(dst)
    }

    /// Records `record` into a temporary primary command buffer, submits it
    /// to the graphics queue and waits for the queue to drain.
    fn one_shot(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let d = self.raw();
        let pool = self.inner.command_pool;
        let ai = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let bufs = unsafe { d.allocate_command_buffers(&ai) }.check("allocate_command_buffers")?;
        let Some(&cmd) = bufs.first() else {
            return Err(RenderError::device("allocate_command_buffers", "no buffer returned"));
        };

        let run = || -> Result<()> {
            let bi = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { d.begin_command_buffer(cmd, &bi) }.check("begin_command_buffer")?;
            record(d, cmd);
            unsafe { d.end_command_buffer(cmd) }.check("end_command_buffer")?;

            let cmds = [cmd];
            let si = vk::SubmitInfo::default().command_buffers(&cmds);
            let queue = self.inner.graphics_queue;
            unsafe { d.queue_submit(queue, &[si], vk::Fence::null()) }.check("queue_submit")?;
            unsafe { d.queue_wait_idle(queue) }.check("queue_wait_idle")
        };
        let res = run();

        // freed even when recording or submission failed
        unsafe { d.free_command_buffers(pool, &bufs) };
        res
    }
}
