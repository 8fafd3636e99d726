use crate::ren::draw::MaterialInstance;

use ash::vk;
use glam::Vec3;
use std::sync::Arc;

/// Local-space box around a surface, stored as centre plus half size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub origin: Vec3,
    pub sphere_radius: f32,
    pub extents: Vec3,
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let extents = (max - min) / 2.0;
        Self {
            origin: (max + min) / 2.0,
            sphere_radius: extents.length(),
            extents,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self::from_min_max(min, max)
    }
}

#[derive(Clone, Debug)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    pub material: Arc<MaterialInstance>,
}

/// Device handles of an uploaded mesh. Memory is owned by whoever uploaded it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuMeshBuffers {
    pub index_buffer: vk::Buffer,
    pub vertex_buffer: vk::Buffer,
    pub vertex_buffer_address: vk::DeviceAddress,
}

#[derive(Debug)]
pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub buffers: GpuMeshBuffers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_from_points_centre_and_extents() {
        let bounds = Bounds::from_points([
            Vec3::new(-1.0, 0.0, 2.0),
            Vec3::new(3.0, 4.0, 2.0),
            Vec3::new(1.0, 2.0, 6.0),
        ]);

        assert_eq!(bounds.origin, Vec3::new(1.0, 2.0, 4.0));
        assert_eq!(bounds.extents, Vec3::new(2.0, 2.0, 2.0));
        assert!((bounds.sphere_radius - 12f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn bounds_of_nothing_is_degenerate() {
        assert_eq!(Bounds::from_points(std::iter::empty()), Bounds::default());
    }
}
