use super::frame::create_fence;
use crate::{Result, ren::frame::deletion::{DeletionQueue, Resource}, vk_check};

use ash::{Device as DeviceHandle, vk};

/// Blocking one-off submissions for uploads outside the frame loop.
pub struct ImmediateManager {
    pub fence: vk::Fence,
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
}

impl ImmediateManager {
    pub fn new(device_handle: &DeviceHandle, queue_family_index: u32, queue: vk::Queue, deletion: &mut DeletionQueue) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = vk_check!(unsafe { device_handle.create_command_pool(&pool_create_info, None) })?;
        deletion.push(Resource::CommandPool(command_pool));

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = vk_check!(unsafe { device_handle.allocate_command_buffers(&allocate_info) })?[0];

        let fence = create_fence(device_handle, Some(vk::FenceCreateFlags::SIGNALED))?;
        deletion.push(Resource::Fence(fence));

        Ok(Self { fence, command_pool, command_buffer, queue })
    }

    /// Records `record` into the shared command buffer, submits it and waits for completion.
    pub fn submit(&self, device_handle: &DeviceHandle, record: impl FnOnce(vk::CommandBuffer)) -> Result<()> {
        let fences = [self.fence];
        vk_check!(unsafe { device_handle.reset_fences(&fences) })?;
        vk_check!(unsafe { device_handle.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty()) })?;

        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        vk_check!(unsafe { device_handle.begin_command_buffer(self.command_buffer, &begin_info) })?;
        record(self.command_buffer);
        vk_check!(unsafe { device_handle.end_command_buffer(self.command_buffer) })?;

        let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(self.command_buffer)];
        let submit_infos = [vk::SubmitInfo2::default().command_buffer_infos(&command_buffer_infos)];
        vk_check!(unsafe { device_handle.queue_submit2(self.queue, &submit_infos, self.fence) })?;
        vk_check!(unsafe { device_handle.wait_for_fences(&fences, true, u64::MAX) })
    }
}
