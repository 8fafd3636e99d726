use crate::{Result, vk_check};

use ash::{Entry, Instance, khr, prelude::VkResult, vk};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub struct Surface {
    pub instance: khr::surface::Instance,
    pub khr: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(entry: &Entry, instance: &Instance, window: &(impl HasDisplayHandle + HasWindowHandle)) -> Result<Self> {
        let surface_instance = khr::surface::Instance::new(entry, instance);
        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let khr = vk_check!(unsafe { ash_window::create_surface(entry, instance, display_handle, window_handle, None) })?;

        Ok(Self { instance: surface_instance, khr })
    }

    pub fn supports(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VkResult<bool> {
        unsafe {
            self.instance
                .get_physical_device_surface_support(physical_device, queue_family_index, self.khr)
        }
    }

    pub fn destroy(&mut self) {
        unsafe { self.instance.destroy_surface(self.khr, None) };
    }
}
