//! Plain data shared between the host and the shader programs under `shaders/`.
//!
//! Every type here mirrors a GLSL block byte for byte, so field order and sizes are load-bearing.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Per-draw push block for the mesh pipelines: world matrix plus vertex buffer device address.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct PushConstants {
    pub transform: Mat4,
    pub vertex_buffer_address: u64,
}

pub const PUSH_CONSTANTS_SIZE: usize = 72;

impl PushConstants {
    pub fn new(transform: Mat4, vertex_buffer_address: u64) -> Self {
        Self { transform, vertex_buffer_address }
    }

    /// Tightly packed bytes as the shader sees them. `Mat4` is 16-aligned on the host,
    /// so the struct itself carries tail padding the push range must not include.
    pub fn as_buffer(&self) -> [u8; PUSH_CONSTANTS_SIZE] {
        let mut buffer = [0u8; PUSH_CONSTANTS_SIZE];
        buffer[..64].copy_from_slice(bytemuck::bytes_of(&self.transform));
        buffer[64..].copy_from_slice(&self.vertex_buffer_address.to_ne_bytes());
        buffer
    }
}

impl Default for PushConstants {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            vertex_buffer_address: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position_uv_x: Vec4,
    pub normal_uv_y: Vec4,
    pub color: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2, color: Vec4) -> Self {
        Self {
            position_uv_x: Vec4::from((position, uv.x)),
            normal_uv_y: Vec4::from((normal, uv.y)),
            color,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position_uv_x.truncate()
    }
}

pub const VERTEX_SIZE: u64 = size_of::<Vertex>() as u64;

/// Per-frame uniform block bound at set 0 of every mesh pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub ambient_color: Vec4,
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

pub const SCENE_DATA_SIZE: u64 = size_of::<SceneData>() as u64;

/// Uniform block bound at set 1 binding 0 of the metallic-roughness pipelines.
/// Padded to 256 bytes so many instances can share one buffer at aligned offsets.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    pub metal_rough_factors: Vec4,
    pub extra: [Vec4; 14],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            color_factors: Vec4::ONE,
            metal_rough_factors: Vec4::new(1.0, 0.5, 0.0, 0.0),
            extra: [Vec4::ZERO; 14],
        }
    }
}

pub const MATERIAL_CONSTANTS_SIZE: u64 = size_of::<MaterialConstants>() as u64;

/// Free-form parameters handed to a background compute effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BackgroundPushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

/// Overlay geometry is pulled from a device address like meshes are.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct OverlayPushConstants {
    pub scale: Vec2,
    pub translate: Vec2,
    pub vertex_buffer_address: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_shader_layouts() {
        assert_eq!(VERTEX_SIZE, 48);
        assert_eq!(SCENE_DATA_SIZE, 240);
        assert_eq!(MATERIAL_CONSTANTS_SIZE, 256);
        assert_eq!(size_of::<BackgroundPushConstants>(), 64);
        assert_eq!(size_of::<OverlayPushConstants>(), 24);
    }

    #[test]
    fn push_constants_pack_without_padding() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let buffer = PushConstants::new(transform, 0xDEAD_BEEF).as_buffer();

        let translation: [f32; 4] = bytemuck::pod_read_unaligned(&buffer[48..64]);
        assert_eq!(translation, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(u64::from_ne_bytes(buffer[64..72].try_into().unwrap()), 0xDEAD_BEEF);
    }
}
