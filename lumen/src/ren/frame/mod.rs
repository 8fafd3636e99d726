//! Frame-in-flight bookkeeping that does not touch the device: slot selection, the sticky
//! resize request and classification of acquire, present and fence-wait results.

pub mod deletion;

use crate::{Error, Result};

use ash::{prelude::VkResult, vk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32 },
    /// The surface no longer matches the swapchain; the frame must be abandoned.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Stale,
}

#[derive(Debug)]
pub struct FramePacer {
    frame_number: u64,
    buffering: usize,
    resize_requested: bool,
    fence_timeout_ms: Option<u64>,
}

impl FramePacer {
    pub fn new(buffering: usize, fence_timeout_ms: Option<u64>) -> Self {
        Self {
            frame_number: 0,
            buffering: buffering.max(1),
            resize_requested: false,
            fence_timeout_ms,
        }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn buffering(&self) -> usize {
        self.buffering
    }

    /// Ring index of the frame about to be recorded.
    pub fn slot(&self) -> usize {
        (self.frame_number % self.buffering as u64) as usize
    }

    /// Called once the frame has been handed to presentation.
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    pub fn request_resize(&mut self) {
        if !self.resize_requested {
            log::debug!("resize requested at frame {}", self.frame_number);
        }
        self.resize_requested = true;
    }

    pub fn resize_handled(&mut self) {
        self.resize_requested = false;
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }

    /// Maps the slot fence wait. A timeout only happens with a bounded wait configured and is fatal.
    pub fn on_fence_wait(&self, result: VkResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                let timeout_ms = self.fence_timeout_ms.unwrap_or(u64::MAX);
                log::error!("frame slot {} still busy after {timeout_ms} ms", self.slot());
                Err(Error::FrameTimeout { slot: self.slot(), timeout_ms })
            }
            Err(result) => Err(Error::vulkan(result, "wait_for_fences")),
        }
    }

    /// A suboptimal acquire still renders but schedules a rebuild; out-of-date abandons the frame.
    pub fn on_acquire(&mut self, result: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.request_resize();
                }
                Ok(AcquireOutcome::Ready { image_index })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.request_resize();
                Ok(AcquireOutcome::Stale)
            }
            Err(result) => Err(Error::vulkan(result, "acquire_next_image")),
        }
    }

    pub fn on_present(&mut self, result: VkResult<bool>) -> Result<PresentOutcome> {
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.request_resize();
                Ok(PresentOutcome::Stale)
            }
            Err(result) => Err(Error::vulkan(result, "queue_present")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_cycle_through_the_ring() {
        let mut pacer = FramePacer::new(2, None);
        let slots: Vec<_> = (0..5)
            .map(|_| {
                let slot = pacer.slot();
                pacer.advance();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn out_of_date_acquire_aborts_and_sticks_until_handled() {
        let mut pacer = FramePacer::new(2, None);
        let outcome = pacer.on_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();

        assert_eq!(outcome, AcquireOutcome::Stale);
        assert!(pacer.resize_requested());
        assert_eq!(pacer.frame_number(), 0);

        let outcome = pacer.on_acquire(Ok((1, false))).unwrap();
        assert_eq!(outcome, AcquireOutcome::Ready { image_index: 1 });
        assert!(pacer.resize_requested());

        pacer.resize_handled();
        assert!(!pacer.resize_requested());
    }

    #[test]
    fn suboptimal_acquire_renders_and_requests_resize() {
        let mut pacer = FramePacer::new(2, None);
        let outcome = pacer.on_acquire(Ok((2, true))).unwrap();
        assert_eq!(outcome, AcquireOutcome::Ready { image_index: 2 });
        assert!(pacer.resize_requested());
    }

    #[test]
    fn stale_present_requests_resize() {
        let mut pacer = FramePacer::new(2, None);
        assert_eq!(pacer.on_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert!(!pacer.resize_requested());
        assert_eq!(pacer.on_present(Ok(true)).unwrap(), PresentOutcome::Stale);
        assert!(pacer.resize_requested());
    }

    #[test]
    fn device_loss_is_fatal() {
        let mut pacer = FramePacer::new(2, None);
        assert!(matches!(
            pacer.on_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(Error::Vulkan { result: vk::Result::ERROR_DEVICE_LOST, .. })
        ));
        assert!(pacer.on_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn fence_wait_is_unbounded_unless_configured() {
        assert_eq!(FramePacer::new(2, None).fence_timeout_ns(), u64::MAX);

        let bounded = FramePacer::new(2, Some(250));
        assert_eq!(bounded.fence_timeout_ns(), 250_000_000);
        assert!(matches!(
            bounded.on_fence_wait(Err(vk::Result::TIMEOUT)),
            Err(Error::FrameTimeout { slot: 0, timeout_ms: 250 })
        ));
        assert!(bounded.on_fence_wait(Ok(())).is_ok());
    }
}
