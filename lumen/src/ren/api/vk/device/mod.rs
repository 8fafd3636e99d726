pub mod config;

use super::surface::Surface;
use crate::{Error, Result, vk_check};
use config::{PhysicalDeviceQueueFamilies, QueueFamilyType};

use ash::{Device as DeviceHandle, Instance, vk};

pub struct Device {
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: PhysicalDeviceQueueFamilies,
    pub handle: DeviceHandle,
}

impl Device {
    pub fn new(instance: &Instance, surface: &Surface) -> Result<Self> {
        let physical_devices = vk_check!(unsafe { instance.enumerate_physical_devices() })?;

        let mut suitable_physical_devices: Vec<_> = physical_devices
            .iter()
            .filter_map(|&physical_device| {
                config::validate_physical_device(instance, physical_device, surface)
                    .inspect_err(|reason| log::debug!("skipping physical device {physical_device:?}: {reason:?}"))
                    .ok()
            })
            .collect();

        suitable_physical_devices.sort();

        let selected = suitable_physical_devices.first().ok_or(Error::NoSuitableDevice)?;
        log::info!("using physical device {}", selected.name);

        let mut device_config = config::DeviceConfig::new(selected);
        let extensions = device_config.get_extensions();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&device_config.queue_create_infos)
            .enabled_extension_names(&extensions)
            .push_next(&mut device_config.vk_13_features)
            .push_next(&mut device_config.vk_12_features);

        let handle = vk_check!(unsafe { instance.create_device(selected.handle, &create_info, None) })?;

        Ok(Self {
            physical_device: selected.handle,
            queue_families: selected.queue_families.clone(),
            handle,
        })
    }

    pub fn family_index(&self, queue_family_type: QueueFamilyType) -> u32 {
        self.queue_families.get_family_index(queue_family_type)
    }

    pub fn get_queue(&self, queue_family_type: QueueFamilyType) -> vk::Queue {
        unsafe { self.handle.get_device_queue(self.family_index(queue_family_type), 0) }
    }

    pub fn wait_idle(&self) -> Result<()> {
        vk_check!(unsafe { self.handle.device_wait_idle() })
    }

    pub fn destroy(&mut self) {
        unsafe { self.handle.destroy_device(None) };
    }
}
