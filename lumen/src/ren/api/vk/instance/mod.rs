pub mod config;

use crate::{Result, info::Info, vk_check};

use ash::{Entry, Instance as VkInstance, vk};
use winit::raw_window_handle::RawDisplayHandle;

#[cfg(feature = "debug")]
struct InstanceDebugUtils {
    instance: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct Instance {
    pub handle: VkInstance,
    #[cfg(feature = "debug")]
    debug_utils: InstanceDebugUtils,
}

impl Instance {
    pub fn new(entry: &Entry, info: &Info, display_handle: RawDisplayHandle) -> Result<Self> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(&info.app_name)
            .application_version(info.app_version)
            .engine_name(&info.engine_name)
            .engine_version(info.engine_version)
            .api_version(vk::API_VERSION_1_3);

        let instance_config = config::InstanceConfig::new(entry, display_handle)?;
        let extensions = instance_config.get_extensions();
        let layers = instance_config.get_layers();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let handle = vk_check!(unsafe { entry.create_instance(&create_info, None) })?;

        #[cfg(feature = "debug")]
        {
            let messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(pfn_user_callback));

            let instance = ash::ext::debug_utils::Instance::new(entry, &handle);
            let messenger = match unsafe { instance.create_debug_utils_messenger(&messenger_create_info, None) } {
                Ok(messenger) => messenger,
                Err(result) => {
                    unsafe { handle.destroy_instance(None) };
                    return Err(crate::Error::vulkan(result, "create_debug_utils_messenger"));
                }
            };

            Ok(Self { handle, debug_utils: InstanceDebugUtils { instance, messenger } })
        }
        #[cfg(not(feature = "debug"))]
        {
            Ok(Self { handle })
        }
    }

    pub fn destroy(&mut self) {
        #[cfg(feature = "debug")]
        unsafe {
            self.debug_utils
                .instance
                .destroy_debug_utils_messenger(self.debug_utils.messenger, None)
        };
        unsafe { self.handle.destroy_instance(None) };
    }
}

#[cfg(feature = "debug")]
unsafe extern "system" fn pfn_user_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    use std::{borrow::Cow, ffi::CStr};

    let callback_data = unsafe { *p_callback_data };
    let message_id_number = callback_data.message_id_number;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy() }
    };

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let level = match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Trace,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        _ => log::Level::Error,
    };
    log::log!(target: "lumen::vulkan", level, "{message_type:?} [{message_id_name} ({message_id_number})]: {message}");

    vk::FALSE
}
