use super::super::surface::Surface;

use ash::{Instance, khr, vk};
use std::{
    collections::BTreeSet,
    ffi::{CStr, c_char},
};

pub struct DeviceConfig<'a> {
    pub extensions: Vec<&'static CStr>,
    pub vk_13_features: vk::PhysicalDeviceVulkan13Features<'a>,
    pub vk_12_features: vk::PhysicalDeviceVulkan12Features<'a>,
    pub queue_create_infos: Vec<vk::DeviceQueueCreateInfo<'a>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeviceConfigError {
    FeatureNotSupported(&'static CStr),
    ExtensionNotSupported(&'static CStr),
    QueueFamilyNotSupported(&'static CStr),
    Query(vk::Result),
}

pub const REQUIRED_EXTENSIONS: [&CStr; 1] = [khr::swapchain::NAME];

/// Ranks physical devices; lower sorts first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalDeviceProperties {
    pub type_rank: u8,
    pub max_image_dimension_2d: std::cmp::Reverse<u32>,
}

pub fn type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

impl PhysicalDeviceProperties {
    pub fn new(properties: &vk::PhysicalDeviceProperties) -> Self {
        Self {
            type_rank: type_rank(properties.device_type),
            max_image_dimension_2d: std::cmp::Reverse(properties.limits.max_image_dimension2_d),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum QueueFamilyType {
    Graphics,
    Present,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalDeviceQueueFamilies {
    pub graphics_family_index: Option<u32>,
    pub present_family_index: Option<u32>,
}

// One queue from each family.
const QUEUE_PRIORITIES: [f32; 1] = [1.0];

impl PhysicalDeviceQueueFamilies {
    pub fn get_family_index(&self, family_type: QueueFamilyType) -> u32 {
        match family_type {
            QueueFamilyType::Graphics => self.graphics_family_index.unwrap_or(u32::MAX),
            QueueFamilyType::Present => self.present_family_index.unwrap_or(u32::MAX),
        }
    }

    pub fn get_unique_indices(&self) -> Vec<u32> {
        self.graphics_family_index
            .into_iter()
            .chain(self.present_family_index)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidPhysicalDevice {
    pub properties: PhysicalDeviceProperties,
    pub queue_families: PhysicalDeviceQueueFamilies,
    pub handle: vk::PhysicalDevice,
    pub name: String,
}

impl<'a> DeviceConfig<'a> {
    pub fn new(valid_physical_device: &ValidPhysicalDevice) -> Self {
        let vk_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let vk_12_features = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);

        let queue_create_infos = valid_physical_device
            .queue_families
            .get_unique_indices()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&QUEUE_PRIORITIES)
            })
            .collect();

        Self { extensions: REQUIRED_EXTENSIONS.to_vec(), vk_13_features, vk_12_features, queue_create_infos }
    }

    pub fn get_extensions(&self) -> Vec<*const c_char> {
        self.extensions.iter().map(|extension| extension.as_ptr()).collect()
    }
}

pub fn validate_physical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    surface: &Surface,
) -> Result<ValidPhysicalDevice, DeviceConfigError> {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    validate_extensions(instance, physical_device, &REQUIRED_EXTENSIONS)?;
    validate_physical_device_feature_requirements(instance, physical_device)?;
    let queue_families = validate_physical_device_queue_families(instance, physical_device, surface)?;

    Ok(ValidPhysicalDevice {
        properties: PhysicalDeviceProperties::new(&properties),
        queue_families,
        handle: physical_device,
        name,
    })
}

fn validate_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    extensions: &[&'static CStr],
) -> Result<(), DeviceConfigError> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(DeviceConfigError::Query)?;

    extensions.iter().try_for_each(|&extension| {
        available
            .iter()
            .any(|property| property.extension_name_as_c_str().is_ok_and(|name| name == extension))
            .then_some(())
            .ok_or(DeviceConfigError::ExtensionNotSupported(extension))
    })
}

fn validate_physical_device_feature_requirements(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<(), DeviceConfigError> {
    let mut vk_13_features = vk::PhysicalDeviceVulkan13Features::default();
    let mut vk_12_features = vk::PhysicalDeviceVulkan12Features::default();
    let mut features_2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vk_13_features)
        .push_next(&mut vk_12_features);

    unsafe { instance.get_physical_device_features2(physical_device, &mut features_2) };

    let required = [
        (vk_13_features.dynamic_rendering, c"vk_13_dynamic_rendering"),
        (vk_13_features.synchronization2, c"vk_13_synchronization2"),
        (vk_12_features.buffer_device_address, c"vk_12_buffer_device_address"),
        (vk_12_features.descriptor_indexing, c"vk_12_descriptor_indexing"),
    ];
    match required.iter().find(|(supported, _)| *supported == vk::FALSE) {
        Some(&(_, feature)) => Err(DeviceConfigError::FeatureNotSupported(feature)),
        None => Ok(()),
    }
}

fn validate_physical_device_queue_families(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    surface: &Surface,
) -> Result<PhysicalDeviceQueueFamilies, DeviceConfigError> {
    let queue_family_properties = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut families = PhysicalDeviceQueueFamilies::default();
    for (index, family) in queue_family_properties.iter().enumerate() {
        let index = index as u32;
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && families.graphics_family_index.is_none() {
            families.graphics_family_index = Some(index);
        }
        if families.present_family_index.is_none() && surface.supports(physical_device, index).map_err(DeviceConfigError::Query)? {
            families.present_family_index = Some(index);
        }
    }

    if families.graphics_family_index.is_none() {
        return Err(DeviceConfigError::QueueFamilyNotSupported(c"graphics"));
    }
    if families.present_family_index.is_none() {
        return Err(DeviceConfigError::QueueFamilyNotSupported(c"present"));
    }

    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn candidate(device_type: vk::PhysicalDeviceType, max_dimension: u32, raw: u64) -> ValidPhysicalDevice {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = device_type;
        properties.limits.max_image_dimension2_d = max_dimension;
        ValidPhysicalDevice {
            properties: PhysicalDeviceProperties::new(&properties),
            queue_families: PhysicalDeviceQueueFamilies::default(),
            handle: vk::PhysicalDevice::from_raw(raw),
            name: String::new(),
        }
    }

    #[test]
    fn discrete_devices_sort_first_then_larger_limits() {
        let mut devices = vec![
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384, 1),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8192, 2),
            candidate(vk::PhysicalDeviceType::CPU, 32768, 3),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384, 4),
        ];
        devices.sort();

        let order: Vec<_> = devices.iter().map(|device| device.handle.as_raw()).collect();
        assert_eq!(order, vec![4, 2, 1, 3]);
    }

    #[test]
    fn shared_queue_family_is_requested_once() {
        let shared = PhysicalDeviceQueueFamilies { graphics_family_index: Some(0), present_family_index: Some(0) };
        assert_eq!(shared.get_unique_indices(), vec![0]);

        let split = PhysicalDeviceQueueFamilies { graphics_family_index: Some(2), present_family_index: Some(1) };
        assert_eq!(split.get_unique_indices(), vec![1, 2]);
        assert_eq!(split.get_family_index(QueueFamilyType::Present), 1);
    }
}
