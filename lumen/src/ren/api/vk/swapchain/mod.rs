use super::{device::Device, surface::Surface};
use crate::{Error, Result, vk_check};

use ash::{Device as DeviceHandle, Instance, khr, vk};

pub const DESIRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(physical_device: vk::PhysicalDevice, surface: &Surface) -> Result<Self> {
        let capabilities = vk_check!(unsafe {
            surface
                .instance
                .get_physical_device_surface_capabilities(physical_device, surface.khr)
        })?;

        let formats = vk_check!(unsafe {
            surface
                .instance
                .get_physical_device_surface_formats(physical_device, surface.khr)
        })?;
        if formats.is_empty() {
            return Err(Error::Surface("no surface formats"));
        }

        let present_modes = vk_check!(unsafe {
            surface
                .instance
                .get_physical_device_surface_present_modes(physical_device, surface.khr)
        })?;
        if present_modes.is_empty() {
            return Err(Error::Surface("no present modes"));
        }

        Ok(Self { capabilities, formats, present_modes })
    }
}

pub struct Swapchain {
    pub device: khr::swapchain::Device,
    pub khr: vk::SwapchainKHR,
    pub format: vk::Format,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(instance: &Instance, device: &Device, surface: &Surface, desired_extent: vk::Extent2D) -> Result<Self> {
        let surface_support = SurfaceSupport::query(device.physical_device, surface)?;

        let surface_format = select_surface_format(&surface_support.formats, DESIRED_FORMAT, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let present_mode = select_present_mode(&surface_support.present_modes, vk::PresentModeKHR::FIFO);
        let extent = select_swapchain_extent(&surface_support.capabilities, desired_extent);
        let min_image_count = select_swapchain_min_image_count(&surface_support.capabilities);
        let queue_family_indices = device.queue_families.get_unique_indices();
        let image_sharing_mode = if queue_family_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.khr)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(image_sharing_mode)
            .pre_transform(surface_support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        if image_sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&queue_family_indices);
        }

        let swapchain_device = khr::swapchain::Device::new(instance, &device.handle);

        let khr = vk_check!(unsafe { swapchain_device.create_swapchain(&create_info, None) })?;
        let images = vk_check!(unsafe { swapchain_device.get_swapchain_images(khr) })?;
        let image_views = images
            .iter()
            .map(|&swapchain_image| {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(swapchain_image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                vk_check!(unsafe { device.handle.create_image_view(&create_info, None) })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "swapchain created: {}x{} {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            images.len()
        );

        Ok(Self {
            device: swapchain_device,
            khr,
            format: surface_format.format,
            images,
            image_views,
            extent,
        })
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            // Images belong to the swapchain itself.
            self.images.clear();
            self.image_views
                .drain(..)
                .for_each(|image_view| device_handle.destroy_image_view(image_view, None));
            self.device.destroy_swapchain(self.khr, None);
        };
        self.khr = vk::SwapchainKHR::null();
    }
}

fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    desired_format: vk::Format,
    desired_color_space: vk::ColorSpaceKHR,
) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|format| format.format == desired_format && format.color_space == desired_color_space)
        .or(formats.first())
        .copied()
        .unwrap_or_default()
}

fn select_present_mode(present_modes: &[vk::PresentModeKHR], desired_present_mode: vk::PresentModeKHR) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&present_mode| present_mode == desired_present_mode)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn select_swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let vk::SurfaceCapabilitiesKHR { min_image_extent, max_image_extent, .. } = *capabilities;
    vk::Extent2D {
        width: desired.width.clamp(min_image_extent.width, max_image_extent.width),
        height: desired.height.clamp(min_image_extent.height, max_image_extent.height),
    }
}

fn select_swapchain_min_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let upper_bound = if capabilities.max_image_count > 0 { capabilities.max_image_count } else { u32::MAX };
    (capabilities.min_image_count + 1).min(upper_bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        }
    }

    #[test]
    fn surface_dictated_extent_wins() {
        let fixed = vk::Extent2D { width: 800, height: 600 };
        let desired = vk::Extent2D { width: 1700, height: 900 };
        assert_eq!(select_swapchain_extent(&capabilities(fixed), desired), fixed);
    }

    #[test]
    fn free_extent_is_clamped_to_limits() {
        let free = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        let desired = vk::Extent2D { width: 9000, height: 0 };
        assert_eq!(
            select_swapchain_extent(&capabilities(free), desired),
            vk::Extent2D { width: 4096, height: 1 }
        );
    }

    #[test]
    fn one_image_above_minimum_within_maximum() {
        let mut caps = capabilities(vk::Extent2D::default());
        assert_eq!(select_swapchain_min_image_count(&caps), 3);
        caps.min_image_count = 3;
        assert_eq!(select_swapchain_min_image_count(&caps), 3);
        caps.max_image_count = 0;
        assert_eq!(select_swapchain_min_image_count(&caps), 4);
    }

    #[test]
    fn format_falls_back_to_first_offered() {
        let offered = [
            vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_SRGB, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
            vk::SurfaceFormatKHR { format: DESIRED_FORMAT, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
        ];
        assert_eq!(
            select_surface_format(&offered, DESIRED_FORMAT, vk::ColorSpaceKHR::SRGB_NONLINEAR).format,
            DESIRED_FORMAT
        );
        assert_eq!(
            select_surface_format(&offered[..1], DESIRED_FORMAT, vk::ColorSpaceKHR::SRGB_NONLINEAR).format,
            vk::Format::R8G8B8A8_SRGB
        );
        assert_eq!(select_present_mode(&[vk::PresentModeKHR::MAILBOX], vk::PresentModeKHR::FIFO), vk::PresentModeKHR::FIFO);
    }
}
