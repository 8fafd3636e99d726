pub mod background;
pub mod buffer;
pub mod defaults;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod image;
pub mod imgui;
pub mod immediate;
pub mod instance;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod recorder;
pub mod resource_allocator;
pub mod surface;
pub mod swapchain;

use crate::{
    Result,
    info::Info,
    ren::{
        draw::{self, DrawContext, EngineStats, Renderable},
        frame::{
            AcquireOutcome, FramePacer,
            deletion::{DeletionQueue, Resource},
        },
        settings::{MAX_RENDER_SCALE, MIN_RENDER_SCALE, Settings},
    },
    scene::{
        NodeKey, NodeKind, SceneGraph,
        camera::{self, Camera},
        gltf::LoadedScene,
        mesh::{Bounds, GeoSurface, MeshAsset},
    },
};
use background::ComputeEffect;
use buffer::Buffer;
use defaults::DefaultResources;
use descriptor::{DescriptorAllocatorGrowable, DescriptorSetLayoutBuilder, DescriptorWriter, PoolSizeRatio};
use device::{Device, config::QueueFamilyType};
use frame::Frame;
use image::Image;
use immediate::ImmediateManager;
use instance::Instance;
use material::MetallicRoughness;
use pipeline::shader::Precompiled;
use recorder::VkRecorder;
use resource_allocator::ResourceAllocator;
use surface::Surface;
use swapchain::Swapchain;

use ash::{Device as DeviceHandle, Entry, vk};
use glam::{Mat4, Vec3, Vec4};
use gpu_allocator::{MemoryLocation, vulkan as vka};
use lumen_gpu::{SCENE_DATA_SIZE, SceneData, Vertex};
use std::{collections::BTreeMap, mem::ManuallyDrop, path::Path, sync::Arc, time::Instant};
use winit::{raw_window_handle::HasDisplayHandle, window::Window};

pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const GLOBAL_DESCRIPTOR_SETS: u32 = 10;
const GLOBAL_POOL_RATIOS: [PoolSizeRatio; 3] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1.0),
];

pub fn scene_data(view: Mat4, proj: Mat4) -> SceneData {
    SceneData {
        view,
        proj,
        view_proj: proj * view,
        ambient_color: Vec4::splat(0.03).with_w(1.0),
        sunlight_direction: Vec3::new(1.0, -3.0, -1.0).normalize().extend(1.0),
        sunlight_color: Vec4::new(1.0, 1.0, 0.9, 1.0),
    }
}

/// `min(swapchain, draw image) * scale`, never below one pixel.
pub fn draw_extent(swapchain: vk::Extent2D, draw_image: vk::Extent2D, render_scale: f32) -> vk::Extent2D {
    let scale = |a: u32, b: u32| ((a.min(b) as f32 * render_scale) as u32).max(1);
    vk::Extent2D {
        width: scale(swapchain.width, draw_image.width),
        height: scale(swapchain.height, draw_image.height),
    }
}

/// Borrowed device state handed to code that creates GPU resources outside the frame loop.
pub struct UploadContext<'a> {
    pub device: &'a DeviceHandle,
    pub allocator: &'a mut vka::Allocator,
    pub immediate: &'a ImmediateManager,
    pub materials: &'a mut MetallicRoughness,
    pub defaults: &'a DefaultResources,
}

/// What an overlay gets while the swapchain image is bound as the only colour attachment.
pub struct OverlayContext<'a> {
    pub device: &'a DeviceHandle,
    pub allocator: &'a mut vka::Allocator,
    /// Released once this frame slot comes around again.
    pub deletion: &'a mut DeletionQueue,
    pub command_buffer: vk::CommandBuffer,
    pub extent: vk::Extent2D,
}

/// UI or debug geometry composited over the finished frame.
pub trait Overlay {
    fn record(&mut self, ctx: &mut OverlayContext<'_>) -> Result<()>;
}

/// Swapchain image acquired for the frame being recorded.
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub slot: usize,
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
}

pub struct Renderer {
    settings: Settings,

    // Vulkan structures
    _entry: Entry,
    instance: Instance,
    surface: Surface,
    device: Device,
    swapchain: Swapchain,
    graphics_queue: vk::Queue,

    // Render loop structures
    frames: Vec<Frame>,
    pacer: FramePacer,
    resource_allocator: ManuallyDrop<ResourceAllocator>,
    immediate: ImmediateManager,
    global_descriptors: DescriptorAllocatorGrowable,

    // Render loop resources
    draw_image: Image,
    depth_image: Image,
    draw_extent: vk::Extent2D,
    render_scale: f32,
    draw_image_set: vk::DescriptorSet,
    scene_layout: vk::DescriptorSetLayout,
    background: ComputeEffect,
    materials: MetallicRoughness,
    defaults: DefaultResources,

    // Scene
    main_draw_context: DrawContext,
    scene_data: SceneData,
    scenes: BTreeMap<String, LoadedScene>,
    pub graph: SceneGraph,
    pub camera: Camera,
    pub stats: EngineStats,
}

impl Renderer {
    pub fn new(info: &Info, settings: Settings, window: &Window) -> Result<Self> {
        let entry = unsafe { Entry::load() }?;

        let display_handle = window.display_handle()?.as_raw();
        let instance = Instance::new(&entry, info, display_handle)?;
        let surface = Surface::new(&entry, &instance.handle, window)?;
        let device = Device::new(&instance.handle, &surface)?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            &instance.handle,
            &device,
            &surface,
            vk::Extent2D { width: size.width, height: size.height },
        )?;

        let handle = &device.handle;
        let graphics_family = device.family_index(QueueFamilyType::Graphics);
        let graphics_queue = device.get_queue(QueueFamilyType::Graphics);

        let frames = Frame::generator(handle, graphics_family, settings.buffering as usize)?;
        let pacer = FramePacer::new(settings.buffering as usize, settings.fence_timeout_ms);

        let mut resource_allocator = ResourceAllocator::new(&instance.handle, handle, device.physical_device)?;
        let immediate = ImmediateManager::new(handle, graphics_family, graphics_queue, &mut resource_allocator.global)?;

        let image_extent = vk::Extent3D {
            width: settings.resolution.width,
            height: settings.resolution.height,
            depth: 1,
        };
        let draw_image = Image::new(
            handle,
            &mut resource_allocator.handle,
            "draw_image",
            DRAW_FORMAT,
            image_extent,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            false,
        )?;
        let depth_image = Image::new(
            handle,
            &mut resource_allocator.handle,
            "depth_image",
            DEPTH_FORMAT,
            image_extent,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            false,
        )?;

        // Global descriptors
        let mut global_descriptors = DescriptorAllocatorGrowable::new(handle, GLOBAL_DESCRIPTOR_SETS, &GLOBAL_POOL_RATIOS)?;

        let draw_image_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(handle, vk::ShaderStageFlags::COMPUTE, None)?;
        resource_allocator.global.push(Resource::DescriptorSetLayout(draw_image_layout));

        let scene_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(handle, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT, None)?;
        resource_allocator.global.push(Resource::DescriptorSetLayout(scene_layout));

        let draw_image_set = global_descriptors.allocate(handle, draw_image_layout)?;
        let mut writer = DescriptorWriter::new();
        writer.write_image(
            0,
            draw_image.view,
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        writer.update_set(handle, draw_image_set);

        // Pipelines
        let compiler = Precompiled;
        let background = ComputeEffect::gradient(
            handle,
            &mut resource_allocator.destroyer(handle),
            &compiler,
            &settings.shader_dir,
            draw_image_layout,
        )?;
        let mut materials = MetallicRoughness::new(
            handle,
            &mut resource_allocator.destroyer(handle),
            &compiler,
            &settings.shader_dir,
            scene_layout,
            draw_image.format,
            depth_image.format,
        )?;

        let defaults = DefaultResources::new(
            handle,
            &mut resource_allocator.handle,
            &immediate,
            &mut resource_allocator.global,
            &mut materials,
            &mut global_descriptors,
        )?;

        log::info!(
            "renderer ready: {} frames in flight, draw image {}x{}",
            pacer.buffering(),
            image_extent.width,
            image_extent.height
        );

        let render_scale = settings.render_scale;
        let draw_extent = draw_extent(swapchain.extent, draw_image.extent_2d(), render_scale);

        Ok(Self {
            settings,
            _entry: entry,
            instance,
            surface,
            device,
            swapchain,
            graphics_queue,
            frames,
            pacer,
            resource_allocator: ManuallyDrop::new(resource_allocator),
            immediate,
            global_descriptors,
            draw_image,
            depth_image,
            draw_extent,
            render_scale,
            draw_image_set,
            scene_layout,
            background,
            materials,
            defaults,
            main_draw_context: DrawContext::default(),
            scene_data: SceneData::default(),
            scenes: BTreeMap::new(),
            graph: SceneGraph::new(),
            camera: Camera::new(Vec3::new(0.0, 0.0, 5.0)),
            stats: EngineStats::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn frame_number(&self) -> u64 {
        self.pacer.frame_number()
    }

    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.render_scale = render_scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE);
    }

    pub fn resize_requested(&self) -> bool {
        self.pacer.resize_requested()
    }

    pub fn request_resize(&mut self) {
        self.pacer.request_resize();
    }

    /// Everything needed to create GPU resources outside a frame.
    pub fn upload_context(&mut self) -> UploadContext<'_> {
        UploadContext {
            device: &self.device.handle,
            allocator: &mut self.resource_allocator.handle,
            immediate: &self.immediate,
            materials: &mut self.materials,
            defaults: &self.defaults,
        }
    }

    pub fn load_scene(&mut self, name: impl Into<String>, path: &Path) -> Result<()> {
        let name = name.into();
        let scene = LoadedScene::load(&mut self.upload_context(), path)?;
        log::info!("loaded scene {name:?} from {}", path.display());
        if let Some(mut previous) = self.scenes.insert(name, scene) {
            self.device.wait_idle()?;
            previous.destroy(&self.device.handle, &mut self.resource_allocator.handle)?;
        }
        Ok(())
    }

    /// Uploads geometry drawn with the default material. The buffers live as long as the renderer.
    pub fn upload_mesh(&mut self, name: &str, indices: &[u32], vertices: &[Vertex]) -> Result<Arc<MeshAsset>> {
        let allocator = &mut *self.resource_allocator;
        let buffers = mesh::upload_mesh(
            &self.device.handle,
            &mut allocator.handle,
            &self.immediate,
            &mut allocator.global,
            indices,
            vertices,
        )?;

        let surface = GeoSurface {
            start_index: 0,
            count: indices.len() as u32,
            bounds: Bounds::from_points(vertices.iter().map(Vertex::position)),
            material: Arc::clone(&self.defaults.material),
        };

        Ok(Arc::new(MeshAsset { name: name.to_owned(), surfaces: vec![surface], buffers }))
    }

    /// Adds a mesh node to the editable graph with its world transform already resolved.
    pub fn spawn_mesh(&mut self, mesh: Arc<MeshAsset>, parent: Option<NodeKey>, transform: Mat4) -> Option<NodeKey> {
        let key = self.graph.insert(parent, NodeKind::Mesh(mesh), transform)?;
        self.graph.set_local_transform(key, transform);
        Some(key)
    }

    /// Rebuilds the draw list and the per-frame scene constants.
    pub fn update_scene(&mut self) {
        let start = Instant::now();

        self.camera.update();

        let roots: Vec<&dyn Renderable> = self
            .scenes
            .values()
            .map(|scene| scene as &dyn Renderable)
            .chain(std::iter::once(&self.graph as &dyn Renderable))
            .collect();
        draw::traverse(&roots, &Mat4::IDENTITY, &mut self.main_draw_context);

        let aspect_ratio = self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32;
        self.scene_data = scene_data(self.camera.view_matrix(), camera::projection(aspect_ratio));

        self.stats.scene_update_time = start.elapsed().as_secs_f32() * 1000.0;
    }

    /// Waits for the slot's previous submission, recycles its resources and acquires an image.
    /// `None` means the swapchain went stale and the frame was abandoned.
    pub fn begin_frame(&mut self) -> Result<Option<FrameTarget>> {
        let slot = self.pacer.slot();
        let handle = &self.device.handle;
        let fences = [self.frames[slot].render_fence];

        self.pacer
            .on_fence_wait(unsafe { handle.wait_for_fences(&fences, true, self.pacer.fence_timeout_ns()) })?;

        let frame = &mut self.frames[slot];
        self.resource_allocator.flush(handle, &mut frame.deletion)?;
        frame.descriptors.clear_pools(handle)?;

        let acquired = unsafe {
            self.swapchain.device.acquire_next_image(
                self.swapchain.khr,
                u64::MAX,
                frame.swapchain_semaphore,
                vk::Fence::null(),
            )
        };
        let image_index = match self.pacer.on_acquire(acquired)? {
            AcquireOutcome::Ready { image_index } => image_index,
            AcquireOutcome::Stale => return Ok(None),
        };

        self.draw_extent = draw_extent(self.swapchain.extent, self.draw_image.extent_2d(), self.render_scale);

        vk_check!(unsafe { handle.reset_fences(&fences) })?;
        vk_check!(unsafe { handle.reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty()) })?;
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        vk_check!(unsafe { handle.begin_command_buffer(frame.command_buffer, &begin_info) })?;

        Ok(Some(FrameTarget { slot, image_index, command_buffer: frame.command_buffer }))
    }

    /// Ends recording, submits on the graphics queue and presents.
    pub fn submit_and_present(&mut self, target: FrameTarget) -> Result<()> {
        let handle = &self.device.handle;
        let frame = &self.frames[target.slot];

        vk_check!(unsafe { handle.end_command_buffer(target.command_buffer) })?;

        let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(target.command_buffer)];
        let wait_semaphore_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.swapchain_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal_semaphore_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.render_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)];
        let submit_info = [frame::get_submit_info(&command_buffer_infos, &wait_semaphore_infos, &signal_semaphore_infos)];
        vk_check!(unsafe { handle.queue_submit2(self.graphics_queue, &submit_info, frame.render_fence) })?;

        let swapchains = [self.swapchain.khr];
        let wait_semaphores = [frame.render_semaphore];
        let image_indices = [target.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);

        let presented = unsafe { self.swapchain.device.queue_present(self.graphics_queue, &present_info) };
        self.pacer.on_present(presented)?;
        self.pacer.advance();
        Ok(())
    }

    /// Renders one frame: background, geometry, blit to the swapchain, then the overlay.
    pub fn draw(&mut self, overlay: Option<&mut dyn Overlay>) -> Result<()> {
        let Some(target) = self.begin_frame()? else {
            return Ok(());
        };

        let handle = &self.device.handle;
        let cmd = target.command_buffer;
        let swapchain_image = self.swapchain.images[target.image_index as usize];
        let swapchain_view = self.swapchain.image_views[target.image_index as usize];

        image::transition(handle, cmd, self.draw_image.handle, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        self.background.record(handle, cmd, self.draw_image_set, self.draw_extent);

        image::transition(
            handle,
            cmd,
            self.draw_image.handle,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        image::transition(
            handle,
            cmd,
            self.depth_image.handle,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        self.draw_geometry(target)?;

        let handle = &self.device.handle;
        image::transition(
            handle,
            cmd,
            self.draw_image.handle,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        image::transition(handle, cmd, swapchain_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        image::copy(handle, cmd, self.draw_image.handle, swapchain_image, self.draw_extent, self.swapchain.extent);

        image::transition(
            handle,
            cmd,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        if let Some(overlay) = overlay {
            self.draw_overlay(target, swapchain_view, overlay)?;
        }

        image::transition(
            &self.device.handle,
            cmd,
            swapchain_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        self.submit_and_present(target)
    }

    fn draw_geometry(&mut self, target: FrameTarget) -> Result<()> {
        let handle = &self.device.handle;
        let frame = &mut self.frames[target.slot];

        // Scene constants live until this slot is reused.
        let mut scene_buffer = Buffer::new(
            handle,
            &mut self.resource_allocator.handle,
            SCENE_DATA_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "scene_data",
            MemoryLocation::CpuToGpu,
        )?;
        let uploaded = scene_buffer.upload(std::slice::from_ref(&self.scene_data), 0);
        let scene_buffer_handle = scene_buffer.handle;
        frame.deletion.push(scene_buffer.into_resource());
        uploaded?;

        let scene_set = frame.descriptors.allocate(handle, self.scene_layout)?;
        let mut writer = DescriptorWriter::new();
        writer.write_buffer(0, scene_buffer_handle, SCENE_DATA_SIZE, 0, vk::DescriptorType::UNIFORM_BUFFER);
        writer.update_set(handle, scene_set);

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.draw_image.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent: self.draw_extent })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        unsafe { handle.cmd_begin_rendering(target.command_buffer, &rendering_info) };

        let mut recorder = VkRecorder {
            device: handle,
            command_buffer: target.command_buffer,
            scene_set,
            extent: self.draw_extent,
        };
        draw::submit(&mut self.main_draw_context, &self.scene_data.view_proj, &mut recorder, &mut self.stats);

        unsafe { handle.cmd_end_rendering(target.command_buffer) };
        Ok(())
    }

    fn draw_overlay(&mut self, target: FrameTarget, view: vk::ImageView, overlay: &mut dyn Overlay) -> Result<()> {
        let handle = &self.device.handle;
        let extent = self.swapchain.extent;

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe { handle.cmd_begin_rendering(target.command_buffer, &rendering_info) };
        let recorded = overlay.record(&mut OverlayContext {
            device: handle,
            allocator: &mut self.resource_allocator.handle,
            deletion: &mut self.frames[target.slot].deletion,
            command_buffer: target.command_buffer,
            extent,
        });
        unsafe { handle.cmd_end_rendering(target.command_buffer) };
        recorded
    }

    /// Rebuilds the swapchain for the new window size. The draw and depth images keep their size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.wait_idle()?;
        self.swapchain.destroy(&self.device.handle);
        self.swapchain = Swapchain::new(
            &self.instance.handle,
            &self.device,
            &self.surface,
            vk::Extent2D { width, height },
        )?;
        self.pacer.resize_handled();
        Ok(())
    }

    /// Device handle, allocator and immediate submitter for an overlay renderer's setup.
    pub fn overlay_setup(&mut self) -> (&DeviceHandle, &mut vka::Allocator, &ImmediateManager, &mut DeletionQueue) {
        let allocator = &mut *self.resource_allocator;
        (&self.device.handle, &mut allocator.handle, &self.immediate, &mut allocator.global)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        let handle = &self.device.handle;

        for (name, mut scene) in std::mem::take(&mut self.scenes) {
            log::debug!("releasing scene {name:?}");
            scene.destroy(handle, &mut self.resource_allocator.handle)?;
        }
        self.graph = SceneGraph::new();

        for frame in &mut self.frames {
            self.resource_allocator.flush(handle, &mut frame.deletion)?;
            frame.destroy(handle);
        }

        self.background.destroy(handle);
        self.materials.destroy(handle);
        self.global_descriptors.destroy_pools(handle);

        let draw_image = std::mem::replace(&mut self.draw_image, placeholder_image());
        let depth_image = std::mem::replace(&mut self.depth_image, placeholder_image());
        self.resource_allocator.global.push(draw_image.into_resource());
        self.resource_allocator.global.push(depth_image.into_resource());
        self.resource_allocator.destroy(handle)
    }
}

fn placeholder_image() -> Image {
    Image {
        handle: vk::Image::null(),
        view: vk::ImageView::null(),
        extent: vk::Extent3D::default(),
        format: vk::Format::UNDEFINED,
        mip_levels: 0,
        allocation: vka::Allocation::default(),
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            log::error!("renderer shutdown incomplete: {error}");
        }
        // The allocator returns its memory blocks to the device, so it goes first.
        unsafe { ManuallyDrop::drop(&mut self.resource_allocator) };
        self.swapchain.destroy(&self.device.handle);
        self.surface.destroy();
        self.device.destroy();
        self.instance.destroy();
        log::info!("renderer shut down after {} frames", self.pacer.frame_number());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_extent_is_scaled_and_bounded_by_both_targets() {
        let swapchain = vk::Extent2D { width: 1920, height: 1080 };
        let draw_image = vk::Extent2D { width: 1700, height: 900 };

        assert_eq!(draw_extent(swapchain, draw_image, 1.0), draw_image);
        assert_eq!(draw_extent(swapchain, draw_image, 0.5), vk::Extent2D { width: 850, height: 450 });
        assert_eq!(
            draw_extent(vk::Extent2D { width: 800, height: 1200 }, draw_image, 1.0),
            vk::Extent2D { width: 800, height: 900 }
        );
        assert_eq!(draw_extent(vk::Extent2D { width: 1, height: 1 }, draw_image, 0.3), vk::Extent2D { width: 1, height: 1 });
    }

    #[test]
    fn scene_constants_use_fixed_lighting() {
        let data = scene_data(Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0)));

        assert_eq!(data.view_proj, Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(data.ambient_color, Vec4::new(0.03, 0.03, 0.03, 1.0));
        assert_eq!(data.sunlight_color, Vec4::new(1.0, 1.0, 0.9, 1.0));
        assert_eq!(data.sunlight_direction.w, 1.0);
        assert!((data.sunlight_direction.truncate().length() - 1.0).abs() < 1e-6);
    }
}
