use crate::{
    Result,
    ren::frame::deletion::{DeletionQueue, Destroy, Resource},
};

use ash::{Device as DeviceHandle, Instance as InstanceHandle, vk};
use gpu_allocator::vulkan as vka;

/// Releases deletion-queue records against a live device and allocator.
pub struct Destroyer<'a> {
    pub device: &'a DeviceHandle,
    pub allocator: &'a mut vka::Allocator,
}

impl Destroy for Destroyer<'_> {
    fn destroy(&mut self, resource: Resource) -> Result<()> {
        let device = self.device;
        unsafe {
            match resource {
                Resource::Buffer { handle, allocation } => {
                    device.destroy_buffer(handle, None);
                    self.allocator.free(allocation)?;
                }
                Resource::Image { handle, view, allocation } => {
                    device.destroy_image_view(view, None);
                    device.destroy_image(handle, None);
                    self.allocator.free(allocation)?;
                }
                Resource::ImageView(view) => device.destroy_image_view(view, None),
                Resource::Sampler(sampler) => device.destroy_sampler(sampler, None),
                Resource::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                Resource::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
                Resource::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout, None),
                Resource::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
                Resource::ShaderModule(module) => device.destroy_shader_module(module, None),
                Resource::CommandPool(pool) => device.destroy_command_pool(pool, None),
                Resource::Fence(fence) => device.destroy_fence(fence, None),
                Resource::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
            }
        }
        Ok(())
    }
}

/// Device memory allocator plus the queue of resources that live as long as the renderer.
pub struct ResourceAllocator {
    pub handle: vka::Allocator,
    pub global: DeletionQueue,
}

impl ResourceAllocator {
    pub fn new(instance: &InstanceHandle, device: &DeviceHandle, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let handle = vka::Allocator::new(&vka::AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self { handle, global: DeletionQueue::new() })
    }

    pub fn destroyer<'a>(&'a mut self, device: &'a DeviceHandle) -> Destroyer<'a> {
        Destroyer { device, allocator: &mut self.handle }
    }

    /// Flushes `queue` through this allocator.
    pub fn flush(&mut self, device: &DeviceHandle, queue: &mut DeletionQueue) -> Result<()> {
        queue.flush(&mut self.destroyer(device))
    }

    pub fn destroy(&mut self, device: &DeviceHandle) -> Result<()> {
        let mut global = std::mem::take(&mut self.global);
        self.flush(device, &mut global)?;
        #[cfg(feature = "debug")]
        self.handle.report_memory_leaks(log::Level::Warn);
        Ok(())
    }
}
