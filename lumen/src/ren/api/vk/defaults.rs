use super::{
    buffer::Buffer,
    descriptor::DescriptorAllocatorGrowable,
    image::Image,
    immediate::ImmediateManager,
    material::{MaterialResources, MetallicRoughness},
};
use crate::{
    Result,
    ren::{
        draw::{MaterialInstance, MaterialPass},
        frame::deletion::{DeletionQueue, Resource},
    },
    vk_check,
};

use ash::{Device as DeviceHandle, vk};
use glam::Vec4;
use gpu_allocator::{MemoryLocation, vulkan as vka};
use lumen_gpu::{MATERIAL_CONSTANTS_SIZE, MaterialConstants};
use std::sync::Arc;

pub const CHECKERBOARD_SIZE: u32 = 16;

/// `packUnorm4x8`: x in the lowest byte.
pub fn pack_unorm4x8(color: Vec4) -> u32 {
    let [r, g, b, a] = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round().to_array();
    u32::from_le_bytes([r as u8, g as u8, b as u8, a as u8])
}

/// Magenta and black squares, one texel each.
pub fn checkerboard() -> Vec<u32> {
    let magenta = pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0));
    let black = pack_unorm4x8(Vec4::new(0.0, 0.0, 0.0, 1.0));
    (0..CHECKERBOARD_SIZE * CHECKERBOARD_SIZE)
        .map(|i| {
            let (x, y) = (i % CHECKERBOARD_SIZE, i / CHECKERBOARD_SIZE);
            if (x % 2) ^ (y % 2) == 1 { magenta } else { black }
        })
        .collect()
}

/// Fallback textures, samplers and material used when an asset supplies none.
pub struct DefaultResources {
    pub white: vk::ImageView,
    pub grey: vk::ImageView,
    pub black: vk::ImageView,
    pub error_checkerboard: vk::ImageView,
    pub sampler_nearest: vk::Sampler,
    pub sampler_linear: vk::Sampler,
    pub material: Arc<MaterialInstance>,
}

fn texture(
    device_handle: &DeviceHandle,
    allocator: &mut vka::Allocator,
    immediate: &ImmediateManager,
    deletion: &mut DeletionQueue,
    name: &str,
    pixels: &[u32],
    size: u32,
) -> Result<vk::ImageView> {
    let image = Image::with_data(
        device_handle,
        allocator,
        immediate,
        name,
        bytemuck::cast_slice(pixels),
        vk::Extent3D { width: size, height: size, depth: 1 },
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
        false,
    )?;
    let view = image.view;
    deletion.push(image.into_resource());
    Ok(view)
}

pub fn create_sampler(device_handle: &DeviceHandle, filter: vk::Filter, deletion: &mut DeletionQueue) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .max_lod(vk::LOD_CLAMP_NONE);
    let sampler = vk_check!(unsafe { device_handle.create_sampler(&create_info, None) })?;
    deletion.push(Resource::Sampler(sampler));
    Ok(sampler)
}

impl DefaultResources {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        immediate: &ImmediateManager,
        deletion: &mut DeletionQueue,
        materials: &mut MetallicRoughness,
        descriptors: &mut DescriptorAllocatorGrowable,
    ) -> Result<Self> {
        let mut solid = |name: &str, color: Vec4| {
            texture(device_handle, allocator, immediate, deletion, name, &[pack_unorm4x8(color)], 1)
        };
        let white = solid("white", Vec4::ONE)?;
        let grey = solid("grey", Vec4::new(0.66, 0.66, 0.66, 1.0))?;
        let black = solid("black", Vec4::new(0.0, 0.0, 0.0, 1.0))?;
        let error_checkerboard = texture(
            device_handle,
            allocator,
            immediate,
            deletion,
            "error_checkerboard",
            &checkerboard(),
            CHECKERBOARD_SIZE,
        )?;

        let sampler_nearest = create_sampler(device_handle, vk::Filter::NEAREST, deletion)?;
        let sampler_linear = create_sampler(device_handle, vk::Filter::LINEAR, deletion)?;

        let mut constants = Buffer::new(
            device_handle,
            allocator,
            MATERIAL_CONSTANTS_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "default_material_constants",
            MemoryLocation::CpuToGpu,
        )?;
        let uploaded = constants.upload(&[MaterialConstants::default()], 0);
        let data_buffer = constants.handle;
        deletion.push(constants.into_resource());
        uploaded?;

        let resources = MaterialResources {
            color_image: white,
            color_sampler: sampler_linear,
            metal_rough_image: white,
            metal_rough_sampler: sampler_linear,
            data_buffer,
            data_buffer_offset: 0,
        };
        let material = materials.write_material(device_handle, MaterialPass::MainColor, &resources, descriptors)?;

        Ok(Self {
            white,
            grey,
            black,
            error_checkerboard,
            sampler_nearest,
            sampler_linear,
            material: Arc::new(material),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_puts_red_in_the_low_byte() {
        assert_eq!(pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0)), 0xFFFF_00FF);
        assert_eq!(pack_unorm4x8(Vec4::new(0.66, 0.66, 0.66, 1.0)), 0xFFA8_A8A8);
        assert_eq!(pack_unorm4x8(Vec4::splat(2.0)), u32::MAX);
    }

    #[test]
    fn checkerboard_alternates_per_texel() {
        let pixels = checkerboard();
        let magenta = pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0));

        assert_eq!(pixels.len(), 256);
        assert_ne!(pixels[0], magenta);
        assert_eq!(pixels[1], magenta);
        assert_eq!(pixels[16], magenta);
        assert_eq!(pixels[17], pixels[0]);
        assert_eq!(pixels.iter().filter(|&&p| p == magenta).count(), 128);
    }
}
