use crate::{Error, Result, vk_check};

use ash::{Entry, khr, vk};
use std::ffi::{CStr, c_char};
use winit::raw_window_handle::RawDisplayHandle;

#[cfg(feature = "debug")]
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct InstanceConfig {
    layers: Vec<&'static CStr>,
    extensions: Vec<&'static CStr>,
}

impl InstanceConfig {
    pub fn new(entry: &Entry, display_handle: RawDisplayHandle) -> Result<Self> {
        let available_layers = vk_check!(unsafe { entry.enumerate_instance_layer_properties() })?;
        let layer_names: Vec<_> = available_layers
            .iter()
            .filter_map(|layer| layer.layer_name_as_c_str().ok())
            .collect();

        #[allow(unused_mut)]
        let mut layers = vec![];
        #[cfg(feature = "debug")]
        if layer_names.contains(&VALIDATION_LAYER) {
            layers.push(VALIDATION_LAYER);
        } else {
            log::warn!("validation layer unavailable, continuing without it");
        }
        #[cfg(not(feature = "debug"))]
        let _ = layer_names;

        // SAFETY: ash-window hands out pointers to static extension names.
        let window_extensions = vk_check!(ash_window::enumerate_required_extensions(display_handle))?
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) });

        let mut extensions: Vec<&'static CStr> = window_extensions.collect();
        extensions.push(khr::get_physical_device_properties2::NAME);
        #[cfg(feature = "debug")]
        extensions.push(ash::ext::debug_utils::NAME);

        let available_extensions = vk_check!(unsafe { entry.enumerate_instance_extension_properties(None) })?;
        let available: Vec<_> = available_extensions
            .iter()
            .filter_map(|extension| extension.extension_name_as_c_str().ok())
            .collect();
        validate_names(&extensions, &available)?;

        Ok(Self { layers, extensions })
    }

    pub fn get_layers(&self) -> Vec<*const c_char> {
        self.layers.iter().map(|layer| layer.as_ptr()).collect()
    }

    pub fn get_extensions(&self) -> Vec<*const c_char> {
        self.extensions.iter().map(|extension| extension.as_ptr()).collect()
    }
}

fn validate_names(required: &[&CStr], available: &[&CStr]) -> Result<()> {
    match required.iter().find(|name| !available.contains(name)) {
        Some(missing) => {
            log::error!("instance extension {missing:?} is not supported");
            Err(Error::vulkan(vk::Result::ERROR_EXTENSION_NOT_PRESENT, "create_instance"))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_extension_is_reported() {
        let available = [khr::surface::NAME, khr::get_physical_device_properties2::NAME];
        assert!(validate_names(&[khr::surface::NAME], &available).is_ok());
        assert!(matches!(
            validate_names(&[khr::surface::NAME, khr::xcb_surface::NAME], &available),
            Err(Error::Vulkan { result: vk::Result::ERROR_EXTENSION_NOT_PRESENT, .. })
        ));
    }
}
