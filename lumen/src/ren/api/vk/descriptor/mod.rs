pub mod growable;
pub mod writer;

pub use growable::DescriptorAllocatorGrowable;
pub use writer::DescriptorWriter;

use crate::{Error, Result, ren::frame::deletion::Resource, vk_check};

use ash::{Device as DeviceHandle, prelude::VkResult, vk};

pub struct DescriptorSetLayoutBuilder {
    pub bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self { bindings: vec![] }
    }
}

impl DescriptorSetLayoutBuilder {
    pub fn add_binding(mut self, binding: u32, descriptor_type: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_count(1)
                .descriptor_type(descriptor_type),
        );
        self
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn build(
        &mut self,
        device_handle: &DeviceHandle,
        shader_stages: vk::ShaderStageFlags,
        flags: Option<vk::DescriptorSetLayoutCreateFlags>,
    ) -> Result<vk::DescriptorSetLayout> {
        self.bindings
            .iter_mut()
            .for_each(|binding| binding.stage_flags |= shader_stages);

        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings)
            .flags(flags.unwrap_or_default());

        vk_check!(unsafe { device_handle.create_descriptor_set_layout(&create_info, None) })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

pub fn pool_sizes(set_count: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| {
            vk::DescriptorPoolSize::default()
                .ty(ratio.ty)
                .descriptor_count(((ratio.ratio * set_count as f32) as u32).max(1))
        })
        .collect()
}

/// The pool operations descriptor allocators need, so their policies can run without a GPU.
pub trait DescriptorDevice {
    fn create_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool>;
    fn allocate_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet>;
    fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;
    fn destroy_pool(&self, pool: vk::DescriptorPool);
}

impl DescriptorDevice for DeviceHandle {
    fn create_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        unsafe { self.create_descriptor_pool(&create_info, None) }
    }

    fn allocate_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.allocate_descriptor_sets(&allocate_info) }?;
        sets.first().copied().ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe { self.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
    }

    fn destroy_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.destroy_descriptor_pool(pool, None) };
    }
}

/// Single pool sized up front. Running out is an error.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    pub fn new(device: &impl DescriptorDevice, max_sets: u32, pool_ratios: &[PoolSizeRatio]) -> Result<Self> {
        let pool = vk_check!(device.create_pool(max_sets, &pool_sizes(max_sets, pool_ratios)))?;
        Ok(Self { pool })
    }

    pub fn allocate(&mut self, device: &impl DescriptorDevice, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        device
            .allocate_set(self.pool, layout)
            .map_err(Error::DescriptorPoolExhausted)
    }

    pub fn reset_pool(&mut self, device: &impl DescriptorDevice) -> Result<()> {
        vk_check!(device.reset_pool(self.pool))
    }

    pub fn destroy(&mut self, device: &impl DescriptorDevice) {
        device.destroy_pool(self.pool);
        self.pool = vk::DescriptorPool::null();
    }

    /// Hands the pool to a deletion queue instead of destroying it now.
    pub fn into_resource(self) -> Resource {
        Resource::DescriptorPool(self.pool)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use ash::vk::Handle;
    use std::{cell::RefCell, collections::HashMap};

    #[derive(Default)]
    pub struct PoolState {
        pub capacity: u32,
        pub allocated: u32,
        pub resets: u32,
    }

    /// Tracks per-pool capacity and fails allocations the way a driver does once a pool is full.
    #[derive(Default)]
    pub struct Device {
        pub pools: RefCell<HashMap<u64, PoolState>>,
        pub destroyed: RefCell<Vec<u64>>,
        next: RefCell<u64>,
        pub exhaustion: Option<vk::Result>,
        /// Raw handle of a pool whose reset fails.
        pub failing_reset: Option<u64>,
    }

    impl Device {
        pub fn with_exhaustion(result: vk::Result) -> Self {
            Self { exhaustion: Some(result), ..Default::default() }
        }

        pub fn total_capacity(&self) -> u32 {
            self.pools.borrow().values().map(|pool| pool.capacity).sum()
        }

        pub fn total_allocated(&self) -> u32 {
            self.pools.borrow().values().map(|pool| pool.allocated).sum()
        }

        pub fn capacities(&self) -> Vec<u32> {
            let pools = self.pools.borrow();
            let mut keys: Vec<_> = pools.keys().copied().collect();
            keys.sort();
            keys.iter().map(|key| pools[key].capacity).collect()
        }
    }

    impl DescriptorDevice for Device {
        fn create_pool(&self, max_sets: u32, _pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
            let mut next = self.next.borrow_mut();
            *next += 1;
            self.pools
                .borrow_mut()
                .insert(*next, PoolState { capacity: max_sets, ..Default::default() });
            Ok(vk::DescriptorPool::from_raw(*next))
        }

        fn allocate_set(&self, pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
            let mut pools = self.pools.borrow_mut();
            let state = pools
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_UNKNOWN)?;
            if state.allocated >= state.capacity {
                return Err(self.exhaustion.unwrap_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
            }
            state.allocated += 1;
            Ok(vk::DescriptorSet::from_raw(pool.as_raw() << 32 | state.allocated as u64))
        }

        fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
            if self.failing_reset == Some(pool.as_raw()) {
                return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
            }
            let mut pools = self.pools.borrow_mut();
            let state = pools
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_UNKNOWN)?;
            state.allocated = 0;
            state.resets += 1;
            Ok(())
        }

        fn destroy_pool(&self, pool: vk::DescriptorPool) {
            self.pools.borrow_mut().remove(&pool.as_raw());
            self.destroyed.borrow_mut().push(pool.as_raw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATIOS: [PoolSizeRatio; 2] = [
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 0.5),
    ];

    #[test]
    fn pool_sizes_scale_with_set_count() {
        let sizes = pool_sizes(10, &RATIOS);
        assert_eq!(sizes[0].descriptor_count, 30);
        assert_eq!(sizes[1].descriptor_count, 5);
        assert_eq!(pool_sizes(1, &RATIOS)[1].descriptor_count, 1);
    }

    #[test]
    fn fixed_allocator_fails_hard_when_full() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocator::new(&device, 2, &RATIOS).unwrap();
        let layout = vk::DescriptorSetLayout::null();

        assert!(allocator.allocate(&device, layout).is_ok());
        assert!(allocator.allocate(&device, layout).is_ok());
        assert!(matches!(
            allocator.allocate(&device, layout),
            Err(Error::DescriptorPoolExhausted(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
        ));

        allocator.reset_pool(&device).unwrap();
        assert!(allocator.allocate(&device, layout).is_ok());

        allocator.destroy(&device);
        assert_eq!(device.destroyed.borrow().len(), 1);
    }
}
