use crate::Result;

use ash::vk;
use gpu_allocator::vulkan as vka;

/// A resource waiting to be released, tagged with what it is.
#[derive(Debug)]
pub enum Resource {
    Buffer { handle: vk::Buffer, allocation: vka::Allocation },
    Image { handle: vk::Image, view: vk::ImageView, allocation: vka::Allocation },
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    ShaderModule(vk::ShaderModule),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
}

/// Releases a single record. Implemented by the Vulkan backend and by test doubles.
pub trait Destroy {
    fn destroy(&mut self, resource: Resource) -> Result<()>;
}

/// Resources released newest-first, so dependents go before what they depend on.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    records: Vec<Resource>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource) {
        self.records.push(resource);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pending records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.records.iter()
    }

    /// Destroys every record in reverse registration order. Stops at the first failure,
    /// leaving the records not yet visited queued.
    pub fn flush(&mut self, destroyer: &mut impl Destroy) -> Result<()> {
        while let Some(resource) = self.records.pop() {
            destroyer.destroy(resource)?;
        }
        Ok(())
    }

    /// Passes `result` through. An error first releases everything queued so far; a failure
    /// while releasing is logged and the original error is returned.
    pub fn release_on_error<T>(&mut self, destroyer: &mut impl Destroy, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(error) = self.flush(destroyer) {
                log::error!("releasing partially built resources failed: {error}");
            }
        }
        result
    }

    /// Moves `other`'s records after this queue's, so they are released first on flush.
    pub fn append(&mut self, other: &mut DeletionQueue) {
        self.records.append(&mut other.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use ash::vk::Handle;

    #[derive(Default)]
    struct Recorder {
        destroyed: Vec<u64>,
        fail_on: Option<u64>,
    }

    impl Destroy for Recorder {
        fn destroy(&mut self, resource: Resource) -> Result<()> {
            let raw = match resource {
                Resource::Sampler(sampler) => sampler.as_raw(),
                Resource::Pipeline(pipeline) => pipeline.as_raw(),
                other => panic!("unexpected {other:?}"),
            };
            if self.fail_on == Some(raw) {
                return Err(Error::vulkan(vk::Result::ERROR_DEVICE_LOST, "test"));
            }
            self.destroyed.push(raw);
            Ok(())
        }
    }

    #[test]
    fn flush_runs_in_reverse_registration_order() {
        let mut queue = DeletionQueue::new();
        for raw in [0xA, 0xB, 0xC] {
            queue.push(Resource::Sampler(vk::Sampler::from_raw(raw)));
        }

        let mut recorder = Recorder::default();
        queue.flush(&mut recorder).unwrap();

        assert_eq!(recorder.destroyed, vec![0xC, 0xB, 0xA]);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_of_empty_queue_is_a_no_op() {
        let mut recorder = Recorder::default();
        DeletionQueue::new().flush(&mut recorder).unwrap();
        assert!(recorder.destroyed.is_empty());
    }

    #[test]
    fn failed_flush_keeps_unvisited_records() {
        let mut queue = DeletionQueue::new();
        queue.push(Resource::Pipeline(vk::Pipeline::from_raw(1)));
        queue.push(Resource::Pipeline(vk::Pipeline::from_raw(2)));
        queue.push(Resource::Pipeline(vk::Pipeline::from_raw(3)));

        let mut recorder = Recorder { fail_on: Some(2), ..Default::default() };
        assert!(queue.flush(&mut recorder).is_err());
        assert_eq!(recorder.destroyed, vec![3]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn setup_failure_releases_what_was_built() {
        let mut pending = DeletionQueue::new();
        pending.push(Resource::Pipeline(vk::Pipeline::from_raw(1)));
        pending.push(Resource::Pipeline(vk::Pipeline::from_raw(2)));

        let mut recorder = Recorder::default();
        let built = pending.release_on_error(&mut recorder, Ok(3u64)).unwrap();
        assert_eq!(built, 3);
        assert!(recorder.destroyed.is_empty());
        assert_eq!(pending.len(), 2);

        let failed: Result<u64> = Err(Error::Pipeline(vk::Result::ERROR_UNKNOWN));
        let result = pending.release_on_error(&mut recorder, failed);
        assert!(matches!(result, Err(Error::Pipeline(vk::Result::ERROR_UNKNOWN))));
        assert_eq!(recorder.destroyed, vec![2, 1]);
        assert!(pending.is_empty());
    }

    #[test]
    fn appended_records_are_released_first() {
        let mut main = DeletionQueue::new();
        main.push(Resource::Sampler(vk::Sampler::from_raw(1)));
        let mut scene = DeletionQueue::new();
        scene.push(Resource::Sampler(vk::Sampler::from_raw(2)));

        main.append(&mut scene);
        let mut recorder = Recorder::default();
        main.flush(&mut recorder).unwrap();

        assert_eq!(recorder.destroyed, vec![2, 1]);
        assert!(scene.is_empty());
    }
}
