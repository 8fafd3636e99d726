use crate::{Error, Result, ren::frame::deletion::Resource, vk_check};

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};

#[derive(Debug)]
pub struct Buffer {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub min_alignment: usize,
    pub allocation: vka::Allocation,
}

impl Buffer {
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = vk_check!(unsafe { device_handle.create_buffer(&create_info, None) })?;

        let requirements = unsafe { device_handle.get_buffer_memory_requirements(handle) };
        let allocation = match allocator.allocate(&vka::AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: vka::AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { device_handle.destroy_buffer(handle, None) };
                return Err(error.into());
            }
        };

        vk_check!(unsafe { device_handle.bind_buffer_memory(handle, allocation.memory(), allocation.offset()) })?;

        Ok(Self {
            handle,
            size,
            usage,
            location,
            min_alignment: requirements.alignment as usize,
            allocation,
        })
    }

    /// Requires the buffer to have been created with `SHADER_DEVICE_ADDRESS` usage.
    pub fn device_address(&self, device_handle: &DeviceHandle) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.handle);
        unsafe { device_handle.get_buffer_device_address(&info) }
    }

    /// Copies `src` into host-visible memory at `start_offset`, padded to the buffer's alignment.
    pub fn upload<T: Copy>(&mut self, src: &[T], start_offset: usize) -> Result<presser::CopyRecord> {
        let mut slab = self.allocation.try_as_mapped_slab().ok_or_else(|| {
            gpu_allocator::AllocationError::FailedToMap(format!("buffer {:?} is not host visible", self.handle))
        })?;
        presser::copy_from_slice_to_offset_with_align(src, &mut slab, start_offset, self.min_alignment)
            .map_err(Error::Upload)
    }

    pub fn into_resource(self) -> Resource {
        Resource::Buffer { handle: self.handle, allocation: self.allocation }
    }
}
