use super::{
    NodeKey, NodeKind, SceneGraph,
    mesh::{Bounds, GeoSurface, MeshAsset},
};
use crate::{
    Result,
    ren::{
        api::vk::{
            UploadContext,
            buffer::Buffer,
            descriptor::{DescriptorAllocatorGrowable, PoolSizeRatio},
            image::Image,
            material::MaterialResources,
            mesh,
            resource_allocator::Destroyer,
        },
        draw::{DrawContext, MaterialInstance, MaterialPass, Renderable},
        frame::deletion::{DeletionQueue, Resource},
    },
};

use ash::{Device as DeviceHandle, vk};
use glam::{Mat4, Vec2, Vec3, Vec4};
use gltf::{
    image::Format,
    material::AlphaMode,
    texture::{MagFilter, MinFilter},
};
use gpu_allocator::{MemoryLocation, vulkan as vka};
use lumen_gpu::{MATERIAL_CONSTANTS_SIZE, MaterialConstants, Vertex};
use std::{path::Path, sync::Arc};

const MATERIAL_POOL_RATIOS: [PoolSizeRatio; 3] = [
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
];

/// Magnification filter for a glTF sampler. Unspecified filters sample linearly.
pub fn mag_filter(filter: Option<MagFilter>) -> vk::Filter {
    match filter {
        Some(MagFilter::Nearest) => vk::Filter::NEAREST,
        Some(MagFilter::Linear) | None => vk::Filter::LINEAR,
    }
}

pub fn min_filter(filter: Option<MinFilter>) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter {
        Some(MinFilter::Nearest) | Some(MinFilter::NearestMipmapNearest) => {
            (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST)
        }
        Some(MinFilter::NearestMipmapLinear) => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        Some(MinFilter::LinearMipmapNearest) => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        Some(MinFilter::Linear) | Some(MinFilter::LinearMipmapLinear) | None => {
            (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR)
        }
    }
}

/// Expands decoded pixels to tightly packed RGBA8. Wider channel formats are not supported.
pub fn to_rgba8(format: Format, pixels: &[u8]) -> Option<Vec<u8>> {
    match format {
        Format::R8G8B8A8 => Some(pixels.to_vec()),
        Format::R8G8B8 => Some(pixels.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], u8::MAX]).collect()),
        Format::R8G8 => Some(pixels.chunks_exact(2).flat_map(|p| [p[0], p[1], 0, u8::MAX]).collect()),
        Format::R8 => Some(pixels.iter().flat_map(|&p| [p, p, p, u8::MAX]).collect()),
        _ => None,
    }
}

pub fn material_pass(alpha_mode: AlphaMode) -> MaterialPass {
    match alpha_mode {
        AlphaMode::Blend => MaterialPass::Transparent,
        AlphaMode::Opaque | AlphaMode::Mask => MaterialPass::MainColor,
    }
}

/// Parent index of every node, from each node's child list.
fn node_parents(node_count: usize, children: impl IntoIterator<Item = (usize, usize)>) -> Vec<Option<usize>> {
    let mut parents = vec![None; node_count];
    for (parent, child) in children {
        if let Some(slot) = parents.get_mut(child) {
            *slot = Some(parent);
        }
    }
    parents
}

/// An imported glTF asset. Owns every device resource it created and its own descriptor pools.
pub struct LoadedScene {
    pub meshes: Vec<Arc<MeshAsset>>,
    pub materials: Vec<Arc<MaterialInstance>>,
    pub graph: SceneGraph,
    descriptors: DescriptorAllocatorGrowable,
    deletion: DeletionQueue,
}

impl LoadedScene {
    pub fn load(ctx: &mut UploadContext<'_>, path: &Path) -> Result<Self> {
        let (document, buffers, images) = gltf::import(path)?;

        let material_count = document.materials().len() as u32;
        let mut scene = Self {
            meshes: vec![],
            materials: vec![],
            graph: SceneGraph::new(),
            descriptors: DescriptorAllocatorGrowable::new(ctx.device, material_count.max(1), &MATERIAL_POOL_RATIOS)?,
            deletion: DeletionQueue::new(),
        };

        if let Err(error) = scene.populate(ctx, &document, &buffers, &images) {
            log::warn!("discarding partially imported {}", path.display());
            scene.destroy(ctx.device, ctx.allocator)?;
            return Err(error);
        }

        log::debug!(
            "{}: {} meshes, {} materials, {} nodes",
            path.display(),
            scene.meshes.len(),
            scene.materials.len(),
            scene.graph.len()
        );
        Ok(scene)
    }

    fn populate(
        &mut self,
        ctx: &mut UploadContext<'_>,
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> Result<()> {
        let samplers = document
            .samplers()
            .map(|sampler| self.create_sampler(ctx.device, &sampler))
            .collect::<Result<Vec<_>>>()?;

        let mut views = Vec::with_capacity(images.len());
        for (index, data) in images.iter().enumerate() {
            views.push(self.upload_image(ctx, index, data)?);
        }

        self.load_materials(ctx, document, &samplers, &views)?;

        for gltf_mesh in document.meshes() {
            let mesh = self.load_mesh(ctx, &gltf_mesh, buffers)?;
            self.meshes.push(Arc::new(mesh));
        }

        self.load_nodes(document);
        Ok(())
    }

    fn create_sampler(&mut self, device_handle: &DeviceHandle, sampler: &gltf::texture::Sampler<'_>) -> Result<vk::Sampler> {
        let (min_filter, mipmap_mode) = min_filter(sampler.min_filter());
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(mag_filter(sampler.mag_filter()))
            .min_filter(min_filter)
            .mipmap_mode(mipmap_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let handle = vk_check!(unsafe { device_handle.create_sampler(&create_info, None) })?;
        self.deletion.push(Resource::Sampler(handle));
        Ok(handle)
    }

    /// Unsupported pixel formats and failed uploads fall back to the error texture.
    fn upload_image(&mut self, ctx: &mut UploadContext<'_>, index: usize, data: &gltf::image::Data) -> Result<vk::ImageView> {
        let Some(pixels) = to_rgba8(data.format, &data.pixels) else {
            log::warn!("image {index} has unsupported format {:?}", data.format);
            return Ok(ctx.defaults.error_checkerboard);
        };

        let image = Image::with_data(
            ctx.device,
            ctx.allocator,
            ctx.immediate,
            &format!("gltf_image_{index}"),
            &pixels,
            vk::Extent3D { width: data.width, height: data.height, depth: 1 },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
            true,
        );

        match image {
            Ok(image) => {
                let view = image.view;
                self.deletion.push(image.into_resource());
                Ok(view)
            }
            Err(error) => {
                log::warn!("image {index} failed to upload: {error}");
                Ok(ctx.defaults.error_checkerboard)
            }
        }
    }

    fn load_materials(
        &mut self,
        ctx: &mut UploadContext<'_>,
        document: &gltf::Document,
        samplers: &[vk::Sampler],
        views: &[vk::ImageView],
    ) -> Result<()> {
        let count = document.materials().len();
        if count == 0 {
            return Ok(());
        }

        let constants: Vec<MaterialConstants> = document
            .materials()
            .map(|material| {
                let pbr = material.pbr_metallic_roughness();
                MaterialConstants {
                    color_factors: Vec4::from_array(pbr.base_color_factor()),
                    metal_rough_factors: Vec4::new(pbr.metallic_factor(), pbr.roughness_factor(), 0.0, 0.0),
                    ..Default::default()
                }
            })
            .collect();

        let mut buffer = Buffer::new(
            ctx.device,
            ctx.allocator,
            MATERIAL_CONSTANTS_SIZE * count as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "gltf_material_constants",
            MemoryLocation::CpuToGpu,
        )?;
        let uploaded = buffer.upload(&constants, 0);
        let data_buffer = buffer.handle;
        self.deletion.push(buffer.into_resource());
        uploaded?;

        let texture = |info: Option<gltf::texture::Info<'_>>| {
            let Some(info) = info else {
                return (ctx.defaults.white, ctx.defaults.sampler_linear);
            };
            let texture = info.texture();
            let view = views.get(texture.source().index()).copied().unwrap_or(ctx.defaults.white);
            let sampler = texture
                .sampler()
                .index()
                .and_then(|index| samplers.get(index).copied())
                .unwrap_or(ctx.defaults.sampler_linear);
            (view, sampler)
        };

        let resources: Vec<(MaterialPass, MaterialResources)> = document
            .materials()
            .enumerate()
            .map(|(index, material)| {
                let pbr = material.pbr_metallic_roughness();
                let (color_image, color_sampler) = texture(pbr.base_color_texture());
                let (metal_rough_image, metal_rough_sampler) = texture(pbr.metallic_roughness_texture());
                let resources = MaterialResources {
                    color_image,
                    color_sampler,
                    metal_rough_image,
                    metal_rough_sampler,
                    data_buffer,
                    data_buffer_offset: index as u32 * MATERIAL_CONSTANTS_SIZE as u32,
                };
                (material_pass(material.alpha_mode()), resources)
            })
            .collect();

        for (pass, resources) in resources {
            let instance = ctx
                .materials
                .write_material(ctx.device, pass, &resources, &mut self.descriptors)?;
            self.materials.push(Arc::new(instance));
        }
        Ok(())
    }

    fn load_mesh(
        &mut self,
        ctx: &mut UploadContext<'_>,
        gltf_mesh: &gltf::Mesh<'_>,
        buffers: &[gltf::buffer::Data],
    ) -> Result<MeshAsset> {
        let mut indices: Vec<u32> = vec![];
        let mut vertices: Vec<Vertex> = vec![];
        let mut surfaces = vec![];

        for primitive in gltf_mesh.primitives() {
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
            let start_index = indices.len() as u32;
            let base_vertex = vertices.len();

            if let Some(read) = reader.read_indices() {
                indices.extend(read.into_u32().map(|index| index + base_vertex as u32));
            }

            if let Some(positions) = reader.read_positions() {
                vertices.extend(
                    positions.map(|position| Vertex::new(Vec3::from_array(position), Vec3::X, Vec2::ZERO, Vec4::ONE)),
                );
            }
            let primitive_vertices = &mut vertices[base_vertex..];

            if let Some(normals) = reader.read_normals() {
                for (vertex, normal) in primitive_vertices.iter_mut().zip(normals) {
                    vertex.normal_uv_y = Vec4::from((Vec3::from_array(normal), vertex.normal_uv_y.w));
                }
            }
            if let Some(coords) = reader.read_tex_coords(0) {
                for (vertex, [u, v]) in primitive_vertices.iter_mut().zip(coords.into_f32()) {
                    vertex.position_uv_x.w = u;
                    vertex.normal_uv_y.w = v;
                }
            }
            if let Some(colors) = reader.read_colors(0) {
                for (vertex, color) in primitive_vertices.iter_mut().zip(colors.into_rgba_f32()) {
                    vertex.color = Vec4::from_array(color);
                }
            }

            let material = primitive
                .material()
                .index()
                .and_then(|index| self.materials.get(index))
                .unwrap_or(&ctx.defaults.material);

            surfaces.push(GeoSurface {
                start_index,
                count: indices.len() as u32 - start_index,
                bounds: Bounds::from_points(primitive_vertices.iter().map(Vertex::position)),
                material: Arc::clone(material),
            });
        }

        let buffers = mesh::upload_mesh(ctx.device, ctx.allocator, ctx.immediate, &mut self.deletion, &indices, &vertices)?;

        Ok(MeshAsset {
            name: gltf_mesh.name().unwrap_or_default().to_owned(),
            surfaces,
            buffers,
        })
    }

    fn load_nodes(&mut self, document: &gltf::Document) {
        let nodes: Vec<gltf::Node<'_>> = document.nodes().collect();
        let parents = node_parents(
            nodes.len(),
            nodes
                .iter()
                .flat_map(|node| node.children().map(move |child| (node.index(), child.index()))),
        );

        let mut stack: Vec<(usize, Option<NodeKey>)> = parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| (index, None))
            .collect();

        while let Some((index, parent)) = stack.pop() {
            let node = &nodes[index];
            let kind = match node.mesh().and_then(|mesh| self.meshes.get(mesh.index())) {
                Some(mesh) => NodeKind::Mesh(Arc::clone(mesh)),
                None => NodeKind::Transform,
            };
            let local_transform = Mat4::from_cols_array_2d(&node.transform().matrix());

            let Some(key) = self.graph.insert(parent, kind, local_transform) else {
                continue;
            };
            stack.extend(node.children().map(|child| (child.index(), Some(key))));
        }

        self.graph.refresh_all();
    }

    /// Releases every device resource of the scene. The GPU must no longer reference any of them.
    pub fn destroy(&mut self, device_handle: &DeviceHandle, allocator: &mut vka::Allocator) -> Result<()> {
        self.graph = SceneGraph::new();
        self.meshes.clear();
        self.materials.clear();
        self.descriptors.destroy_pools(device_handle);
        self.deletion.flush(&mut Destroyer { device: device_handle, allocator })
    }
}

impl Renderable for LoadedScene {
    fn draw(&self, top_matrix: &Mat4, ctx: &mut DrawContext) {
        self.graph.draw(top_matrix, ctx);
    }
}
