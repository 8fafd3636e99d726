use super::descriptor::{DescriptorAllocatorGrowable, PoolSizeRatio};
use crate::{Result, ren::frame::deletion::DeletionQueue, vk_check};

use ash::{Device as DeviceHandle, vk};

/// Initial set count of every frame's descriptor allocator.
pub const FRAME_DESCRIPTOR_SETS: u32 = 128;

pub const FRAME_POOL_RATIOS: [PoolSizeRatio; 4] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
];

/// Everything one frame in flight owns. Reused once its fence signals.
pub struct Frame {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    pub swapchain_semaphore: vk::Semaphore,
    pub render_semaphore: vk::Semaphore,
    pub render_fence: vk::Fence,

    pub descriptors: DescriptorAllocatorGrowable,
    pub deletion: DeletionQueue,
}

impl Frame {
    pub fn new(device_handle: &DeviceHandle, queue_family_index: u32) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = vk_check!(unsafe { device_handle.create_command_pool(&pool_create_info, None) })?;

        let buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);

        let command_buffer = vk_check!(unsafe { device_handle.allocate_command_buffers(&buffer_allocate_info) })?[0];

        Ok(Self {
            command_pool,
            command_buffer,
            swapchain_semaphore: create_semaphore(device_handle)?,
            render_semaphore: create_semaphore(device_handle)?,
            // Signalled so the first wait on a fresh slot returns immediately.
            render_fence: create_fence(device_handle, Some(vk::FenceCreateFlags::SIGNALED))?,
            descriptors: DescriptorAllocatorGrowable::new(device_handle, FRAME_DESCRIPTOR_SETS, &FRAME_POOL_RATIOS)?,
            deletion: DeletionQueue::new(),
        })
    }

    pub fn generator(device_handle: &DeviceHandle, queue_family_index: u32, buffering: usize) -> Result<Vec<Frame>> {
        (0..buffering)
            .map(|_| Frame::new(device_handle, queue_family_index))
            .collect()
    }

    /// The frame's deletion queue must already have been flushed.
    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        self.descriptors.destroy_pools(device_handle);
        unsafe {
            device_handle.destroy_command_pool(self.command_pool, None);
            device_handle.destroy_fence(self.render_fence, None);
            device_handle.destroy_semaphore(self.render_semaphore, None);
            device_handle.destroy_semaphore(self.swapchain_semaphore, None);
        }
    }
}

pub fn create_semaphore(device_handle: &DeviceHandle) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    vk_check!(unsafe { device_handle.create_semaphore(&create_info, None) })
}

pub fn create_fence(device_handle: &DeviceHandle, flags: Option<vk::FenceCreateFlags>) -> Result<vk::Fence> {
    let create_info = vk::FenceCreateInfo::default().flags(flags.unwrap_or_default());
    vk_check!(unsafe { device_handle.create_fence(&create_info, None) })
}

pub fn get_submit_info<'a>(
    command_buffer_infos: &'a [vk::CommandBufferSubmitInfo<'a>],
    wait_semaphore_infos: &'a [vk::SemaphoreSubmitInfo<'a>],
    signal_semaphore_infos: &'a [vk::SemaphoreSubmitInfo<'a>],
) -> vk::SubmitInfo2<'a> {
    vk::SubmitInfo2::default()
        .command_buffer_infos(command_buffer_infos)
        .wait_semaphore_infos(wait_semaphore_infos)
        .signal_semaphore_infos(signal_semaphore_infos)
}
