use super::{DescriptorDevice, PoolSizeRatio, pool_sizes};
use crate::{Error, Result, vk_check};

use ash::vk;

pub const MAX_SETS_PER_POOL: u32 = 4092;
const GROWTH_FACTOR: f32 = 1.5;

fn grow(sets: u32) -> u32 {
    ((sets as f32 * GROWTH_FACTOR) as u32).min(MAX_SETS_PER_POOL)
}

/// Hands out descriptor sets from a chain of pools, creating a larger pool whenever the
/// current one runs dry. Pools are only ever reset together through [`clear_pools`].
///
/// [`clear_pools`]: DescriptorAllocatorGrowable::clear_pools
#[derive(Debug)]
pub struct DescriptorAllocatorGrowable {
    ratios: Vec<PoolSizeRatio>,
    current: Option<vk::DescriptorPool>,
    ready_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl DescriptorAllocatorGrowable {
    pub fn new(device: &impl DescriptorDevice, initial_sets: u32, ratios: &[PoolSizeRatio]) -> Result<Self> {
        let initial_sets = initial_sets.clamp(1, MAX_SETS_PER_POOL);
        let pool = vk_check!(device.create_pool(initial_sets, &pool_sizes(initial_sets, ratios)))?;

        Ok(Self {
            ratios: ratios.to_vec(),
            current: Some(pool),
            ready_pools: vec![],
            full_pools: vec![],
            sets_per_pool: grow(initial_sets),
        })
    }

    /// Set count the next freshly created pool will get.
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    pub fn pool_count(&self) -> usize {
        self.ready_pools.len() + self.full_pools.len() + usize::from(self.current.is_some())
    }

    pub fn full_pool_count(&self) -> usize {
        self.full_pools.len()
    }

    fn get_pool(&mut self, device: &impl DescriptorDevice) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        let sets = self.sets_per_pool;
        let pool = vk_check!(device.create_pool(sets, &pool_sizes(sets, &self.ratios)))?;
        self.sets_per_pool = grow(sets);
        log::debug!("descriptor pool created with {sets} sets, next will hold {}", self.sets_per_pool);
        Ok(pool)
    }

    pub fn allocate(&mut self, device: &impl DescriptorDevice, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let pool = match self.current {
            Some(pool) => pool,
            None => {
                let pool = self.get_pool(device)?;
                self.current = Some(pool);
                pool
            }
        };

        match device.allocate_set(pool, layout) {
            Ok(set) => Ok(set),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);
                self.current = None;

                let pool = self.get_pool(device)?;
                self.current = Some(pool);
                device
                    .allocate_set(pool, layout)
                    .map_err(Error::DescriptorPoolExhausted)
            }
            Err(result) => Err(Error::vulkan(result, "allocate_descriptor_sets")),
        }
    }

    /// Resets every pool and makes all of them available again. Sets handed out earlier become invalid.
    pub fn clear_pools(&mut self, device: &impl DescriptorDevice) -> Result<()> {
        if let Some(pool) = self.current.take() {
            self.ready_pools.push(pool);
        }
        for &pool in &self.ready_pools {
            vk_check!(device.reset_pool(pool))?;
        }

        // Pools stay tracked even when a reset fails, so `destroy_pools` still reaches them.
        let mut full_pools = std::mem::take(&mut self.full_pools).into_iter();
        while let Some(pool) = full_pools.next() {
            if let Err(error) = vk_check!(device.reset_pool(pool)) {
                self.full_pools.push(pool);
                self.full_pools.extend(full_pools);
                return Err(error);
            }
            self.ready_pools.push(pool);
        }
        Ok(())
    }

    pub fn destroy_pools(&mut self, device: &impl DescriptorDevice) {
        self.current
            .take()
            .into_iter()
            .chain(self.ready_pools.drain(..))
            .chain(self.full_pools.drain(..))
            .for_each(|pool| device.destroy_pool(pool));
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock;
    use super::*;

    const RATIOS: [PoolSizeRatio; 1] = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)];

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::null()
    }

    #[test]
    fn first_pool_has_the_requested_size() {
        let device = mock::Device::default();
        let allocator = DescriptorAllocatorGrowable::new(&device, 10, &RATIOS).unwrap();

        assert_eq!(device.capacities(), vec![10]);
        assert_eq!(allocator.sets_per_pool(), 15);
        assert_eq!(allocator.pool_count(), 1);
    }

    #[test]
    fn exhausting_a_pool_grows_into_a_larger_one() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 4, &RATIOS).unwrap();

        for _ in 0..20 {
            allocator.allocate(&device, layout()).unwrap();
        }

        // 4 + 6 + 9 + 13 covers 20 sets
        assert_eq!(device.capacities(), vec![4, 6, 9, 13]);
        assert_eq!(allocator.full_pool_count(), 3);
        assert_eq!(device.total_allocated(), 20);
        assert!(device.total_allocated() <= device.total_capacity());
    }

    #[test]
    fn growth_is_capped() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 4000, &RATIOS).unwrap();
        assert_eq!(allocator.sets_per_pool(), MAX_SETS_PER_POOL);

        for _ in 0..4001 {
            allocator.allocate(&device, layout()).unwrap();
        }
        assert_eq!(device.capacities(), vec![4000, MAX_SETS_PER_POOL]);
        assert_eq!(allocator.sets_per_pool(), MAX_SETS_PER_POOL);
    }

    #[test]
    fn fragmented_pool_is_treated_as_full() {
        let device = mock::Device::with_exhaustion(vk::Result::ERROR_FRAGMENTED_POOL);
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 1, &RATIOS).unwrap();

        allocator.allocate(&device, layout()).unwrap();
        allocator.allocate(&device, layout()).unwrap();
        assert_eq!(allocator.full_pool_count(), 1);
    }

    #[test]
    fn clear_pools_recycles_everything() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 2, &RATIOS).unwrap();
        for _ in 0..6 {
            allocator.allocate(&device, layout()).unwrap();
        }
        let pools = allocator.pool_count();

        allocator.clear_pools(&device).unwrap();
        assert_eq!(allocator.full_pool_count(), 0);
        assert_eq!(allocator.pool_count(), pools);
        assert_eq!(device.total_allocated(), 0);

        allocator.clear_pools(&device).unwrap();
        assert_eq!(allocator.pool_count(), pools);

        // Recycled pools are reused before anything new is created.
        for _ in 0..6 {
            allocator.allocate(&device, layout()).unwrap();
        }
        assert_eq!(device.capacities().len(), pools);
    }

    #[test]
    fn second_failure_is_fatal() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 1, &RATIOS).unwrap();
        allocator.allocate(&device, layout()).unwrap();

        // The fresh pool gets zero capacity so the retry fails too.
        device.pools.borrow_mut().values_mut().for_each(|pool| pool.capacity = 0);
        let mut starved = DescriptorAllocatorGrowable {
            sets_per_pool: 0,
            ..allocator
        };
        assert!(matches!(
            starved.allocate(&device, layout()),
            Err(Error::DescriptorPoolExhausted(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
        ));
    }

    #[test]
    fn failed_reset_keeps_every_pool_tracked() {
        let mut device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 1, &RATIOS).unwrap();
        for _ in 0..4 {
            allocator.allocate(&device, layout()).unwrap();
        }
        let pools = allocator.pool_count();
        assert!(allocator.full_pool_count() >= 2);

        device.failing_reset = Some(1);
        assert!(allocator.clear_pools(&device).is_err());
        assert_eq!(allocator.pool_count(), pools);

        allocator.destroy_pools(&device);
        assert_eq!(device.destroyed.borrow().len(), pools);
    }

    #[test]
    fn destroy_pools_releases_every_pool() {
        let device = mock::Device::default();
        let mut allocator = DescriptorAllocatorGrowable::new(&device, 1, &RATIOS).unwrap();
        for _ in 0..3 {
            allocator.allocate(&device, layout()).unwrap();
        }
        let pools = allocator.pool_count();

        allocator.destroy_pools(&device);
        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(device.destroyed.borrow().len(), pools);
        assert!(device.pools.borrow().is_empty());
    }
}
