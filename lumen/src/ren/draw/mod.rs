//! Per-frame draw list: traversal output, visibility culling, batching order and submission.

use crate::scene::mesh::Bounds;

use ash::vk::{self, Handle};
use glam::{Mat4, Vec3, Vec4};
use lumen_gpu::PushConstants;
use std::{sync::Arc, time::Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaterialPass {
    #[default]
    MainColor,
    Transparent,
    Other,
}

/// Immutable pipeline shared by every material instance that references it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

#[derive(Clone, Debug)]
pub struct MaterialInstance {
    pub pipeline: Arc<MaterialPipeline>,
    pub material_set: vk::DescriptorSet,
    pub pass: MaterialPass,
}

/// One indexed draw. Rebuilt by traversal every frame.
#[derive(Clone, Debug)]
pub struct RenderObject {
    pub index_count: u32,
    pub first_index: u32,
    pub index_buffer: vk::Buffer,
    pub material: Arc<MaterialInstance>,
    pub bounds: Bounds,
    pub transform: Mat4,
    pub vertex_buffer_address: vk::DeviceAddress,
}

#[derive(Debug, Default)]
pub struct DrawContext {
    pub opaque_surfaces: Vec<RenderObject>,
    pub transparent_surfaces: Vec<RenderObject>,
}

impl DrawContext {
    pub fn push(&mut self, object: RenderObject) {
        match object.material.pass {
            MaterialPass::Transparent => self.transparent_surfaces.push(object),
            MaterialPass::MainColor | MaterialPass::Other => self.opaque_surfaces.push(object),
        }
    }

    pub fn clear(&mut self) {
        self.opaque_surfaces.clear();
        self.transparent_surfaces.clear();
    }

    pub fn len(&self) -> usize {
        self.opaque_surfaces.len() + self.transparent_surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything that can contribute render objects under a parent matrix.
pub trait Renderable {
    fn draw(&self, top_matrix: &Mat4, ctx: &mut DrawContext);
}

/// Clears `ctx` and fills it from every root in order.
pub fn traverse(roots: &[&dyn Renderable], top_matrix: &Mat4, ctx: &mut DrawContext) {
    ctx.clear();
    for root in roots {
        root.draw(top_matrix, ctx);
    }
}

const CORNERS: [Vec3; 8] = [
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, -1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(-1.0, 1.0, -1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(-1.0, -1.0, -1.0),
];

/// Conservative frustum test: the clip-space box of the projected corners must overlap
/// x, y in [-1, 1] and z in [0, 1].
pub fn is_visible(object: &RenderObject, view_proj: &Mat4) -> bool {
    let matrix = *view_proj * object.transform;

    let mut min = Vec3::splat(1.5);
    let mut max = Vec3::splat(-1.5);

    for corner in CORNERS {
        let v = matrix * Vec4::from((object.bounds.origin + corner * object.bounds.extents, 1.0));
        let v = v.truncate() / v.w;

        min = min.min(v);
        max = max.max(v);
    }

    !(min.z > 1.0 || max.z < 0.0 || min.x > 1.0 || max.x < -1.0 || min.y > 1.0 || max.y < -1.0)
}

fn material_key(object: &RenderObject) -> (usize, u64) {
    (Arc::as_ptr(&object.material) as usize, object.index_buffer.as_raw())
}

/// Indices of visible opaque objects, stably ordered by material identity then index buffer.
pub fn opaque_draw_order(objects: &[RenderObject], view_proj: &Mat4) -> Vec<usize> {
    let mut order: Vec<usize> = (0..objects.len())
        .filter(|&index| is_visible(&objects[index], view_proj))
        .collect();
    order.sort_by_key(|&index| material_key(&objects[index]));
    order
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineStats {
    /// Milliseconds.
    pub frametime: f32,
    pub triangle_count: u32,
    pub drawcall_count: u32,
    pub scene_update_time: f32,
    pub mesh_draw_time: f32,
}

/// Command sink for batched submission. The Vulkan recorder writes a command buffer;
/// tests count calls.
pub trait DrawRecorder {
    /// Binds `pipeline` together with the per-frame scene set and the dynamic viewport and scissor.
    fn bind_pipeline(&mut self, pipeline: &MaterialPipeline);
    fn bind_material(&mut self, material: &MaterialInstance);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);
    fn push_constants(&mut self, layout: vk::PipelineLayout, constants: &PushConstants);
    fn draw_indexed(&mut self, index_count: u32, first_index: u32);
}

#[derive(Default)]
struct BindState {
    pipeline: Option<*const MaterialPipeline>,
    material: Option<*const MaterialInstance>,
    index_buffer: Option<vk::Buffer>,
}

fn record_object(object: &RenderObject, state: &mut BindState, recorder: &mut impl DrawRecorder, stats: &mut EngineStats) {
    let material = Arc::as_ptr(&object.material);
    if state.material != Some(material) {
        state.material = Some(material);

        let pipeline = Arc::as_ptr(&object.material.pipeline);
        if state.pipeline != Some(pipeline) {
            state.pipeline = Some(pipeline);
            recorder.bind_pipeline(&object.material.pipeline);
        }

        recorder.bind_material(&object.material);
    }

    if state.index_buffer != Some(object.index_buffer) {
        state.index_buffer = Some(object.index_buffer);
        recorder.bind_index_buffer(object.index_buffer);
    }

    let constants = PushConstants::new(object.transform, object.vertex_buffer_address);
    recorder.push_constants(object.material.pipeline.layout, &constants);

    stats.drawcall_count += 1;
    stats.triangle_count += object.index_count / 3;
    recorder.draw_indexed(object.index_count, object.first_index);
}

/// Culls, orders and records every object in `ctx`, then empties it.
///
/// Opaque objects go first in material order; transparent ones follow in traversal order.
/// Both buckets pass the same visibility test. Binds are only issued when the pipeline,
/// material or index buffer identity changes.
pub fn submit(ctx: &mut DrawContext, view_proj: &Mat4, recorder: &mut impl DrawRecorder, stats: &mut EngineStats) {
    let start = Instant::now();

    stats.drawcall_count = 0;
    stats.triangle_count = 0;

    let opaque_order = opaque_draw_order(&ctx.opaque_surfaces, view_proj);
    let mut state = BindState::default();

    for index in opaque_order {
        record_object(&ctx.opaque_surfaces[index], &mut state, recorder, stats);
    }

    for object in ctx.transparent_surfaces.iter().filter(|object| is_visible(object, view_proj)) {
        record_object(object, &mut state, recorder, stats);
    }

    ctx.clear();

    stats.mesh_draw_time = start.elapsed().as_secs_f32() * 1000.0;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        BindPipeline(vk::Pipeline),
        BindMaterial(vk::DescriptorSet),
        BindIndexBuffer(vk::Buffer),
        PushConstants(Mat4),
        DrawIndexed { index_count: u32, first_index: u32 },
    }

    #[derive(Default)]
    pub struct Recorder {
        pub commands: Vec<Command>,
    }

    impl Recorder {
        pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
            self.commands.iter().filter(|command| predicate(command)).count()
        }
    }

    impl DrawRecorder for Recorder {
        fn bind_pipeline(&mut self, pipeline: &MaterialPipeline) {
            self.commands.push(Command::BindPipeline(pipeline.pipeline));
        }

        fn bind_material(&mut self, material: &MaterialInstance) {
            self.commands.push(Command::BindMaterial(material.material_set));
        }

        fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::BindIndexBuffer(buffer));
        }

        fn push_constants(&mut self, _layout: vk::PipelineLayout, constants: &PushConstants) {
            self.commands.push(Command::PushConstants(constants.transform));
        }

        fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
            self.commands.push(Command::DrawIndexed { index_count, first_index });
        }
    }

    pub fn pipeline(raw: u64) -> Arc<MaterialPipeline> {
        Arc::new(MaterialPipeline {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw),
        })
    }

    pub fn material(pipeline: &Arc<MaterialPipeline>, set: u64, pass: MaterialPass) -> Arc<MaterialInstance> {
        Arc::new(MaterialInstance {
            pipeline: pipeline.clone(),
            material_set: vk::DescriptorSet::from_raw(set),
            pass,
        })
    }

    /// Reversed-Z projection looking down -Z from the origin.
    pub fn view_proj() -> Mat4 {
        let mut proj = Mat4::perspective_rh(70f32.to_radians(), 1.0, 10000.0, 0.1);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::{mock::*, *};

    fn object(material: &Arc<MaterialInstance>, index_buffer: u64, translation: Vec3) -> RenderObject {
        RenderObject {
            index_count: 6,
            first_index: 0,
            index_buffer: vk::Buffer::from_raw(index_buffer),
            material: material.clone(),
            bounds: Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)),
            transform: Mat4::from_translation(translation),
            vertex_buffer_address: 0,
        }
    }

    #[test]
    fn box_behind_camera_is_culled() {
        let material = material(&pipeline(1), 1, MaterialPass::MainColor);
        let behind = object(&material, 1, Vec3::new(0.0, 0.0, 10.0));
        assert!(!is_visible(&behind, &view_proj()));
    }

    #[test]
    fn box_in_front_is_kept_and_far_off_axis_is_culled() {
        let material = material(&pipeline(1), 1, MaterialPass::MainColor);
        assert!(is_visible(&object(&material, 1, Vec3::new(0.0, 0.0, -10.0)), &view_proj()));
        assert!(!is_visible(&object(&material, 1, Vec3::new(100.0, 0.0, -10.0)), &view_proj()));
    }

    #[test]
    fn box_enclosing_camera_is_kept() {
        let material = material(&pipeline(1), 1, MaterialPass::MainColor);
        let mut enclosing = object(&material, 1, Vec3::ZERO);
        enclosing.bounds = Bounds::from_min_max(Vec3::new(-5.0, -3.0, -7.0), Vec3::new(4.0, 6.0, 5.0));
        assert!(is_visible(&enclosing, &view_proj()));
    }

    #[test]
    fn sort_groups_by_material_then_index_buffer_stably() {
        let pipeline = pipeline(1);
        let material = material(&pipeline, 1, MaterialPass::MainColor);
        let objects = vec![
            object(&material, 20, Vec3::new(0.0, 0.0, -10.0)),
            object(&material, 10, Vec3::new(0.0, 0.0, -11.0)),
            object(&material, 20, Vec3::new(0.0, 0.0, -12.0)),
            object(&material, 10, Vec3::new(0.0, 0.0, -13.0)),
        ];

        let order = opaque_draw_order(&objects, &view_proj());
        assert_eq!(order, vec![1, 3, 0, 2]);
        assert_eq!(order, opaque_draw_order(&objects, &view_proj()));
    }

    #[test]
    fn submission_binds_only_on_identity_change() {
        let shared = pipeline(1);
        let first = material(&shared, 10, MaterialPass::MainColor);
        let second = material(&shared, 11, MaterialPass::MainColor);

        let mut ctx = DrawContext::default();
        for (material, index_buffer) in [(&first, 1), (&second, 1), (&first, 1), (&second, 2)] {
            ctx.push(object(material, index_buffer, Vec3::new(0.0, 0.0, -10.0)));
        }

        let mut recorder = Recorder::default();
        let mut stats = EngineStats::default();
        submit(&mut ctx, &view_proj(), &mut recorder, &mut stats);

        assert_eq!(recorder.count(|c| matches!(c, Command::BindPipeline(_))), 1);
        assert_eq!(recorder.count(|c| matches!(c, Command::BindMaterial(_))), 2);
        assert_eq!(recorder.count(|c| matches!(c, Command::DrawIndexed { .. })), 4);
        assert_eq!(recorder.count(|c| matches!(c, Command::PushConstants(_))), 4);
        assert_eq!(stats.drawcall_count, 4);
        assert_eq!(stats.triangle_count, 8);
        assert!(ctx.is_empty());
    }

    #[test]
    fn transparent_objects_follow_opaque_in_traversal_order() {
        let opaque = material(&pipeline(1), 10, MaterialPass::MainColor);
        let transparent = material(&pipeline(2), 20, MaterialPass::Transparent);

        let mut ctx = DrawContext::default();
        ctx.push(object(&transparent, 9, Vec3::new(0.0, 0.0, -10.0)));
        ctx.push(object(&opaque, 5, Vec3::new(0.0, 0.0, -10.0)));
        ctx.push(object(&transparent, 1, Vec3::new(0.0, 0.0, -10.0)));
        assert_eq!(ctx.opaque_surfaces.len(), 1);
        assert_eq!(ctx.transparent_surfaces.len(), 2);

        let mut recorder = Recorder::default();
        submit(&mut ctx, &view_proj(), &mut recorder, &mut EngineStats::default());

        let index_binds: Vec<_> = recorder
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::BindIndexBuffer(buffer) => Some(buffer.as_raw()),
                _ => None,
            })
            .collect();
        assert_eq!(index_binds, vec![5, 9, 1]);
    }

    #[test]
    fn transparent_objects_outside_the_view_are_skipped() {
        let transparent = material(&pipeline(2), 20, MaterialPass::Transparent);

        let mut ctx = DrawContext::default();
        ctx.push(object(&transparent, 1, Vec3::new(0.0, 0.0, -10.0)));
        ctx.push(object(&transparent, 2, Vec3::new(0.0, 0.0, 10.0)));

        let mut recorder = Recorder::default();
        let mut stats = EngineStats::default();
        submit(&mut ctx, &view_proj(), &mut recorder, &mut stats);

        assert_eq!(recorder.commands.iter().find_map(|c| match c {
            Command::BindIndexBuffer(buffer) => Some(buffer.as_raw()),
            _ => None,
        }), Some(1));
        assert_eq!(stats.drawcall_count, 1);
    }

    #[test]
    fn stats_reset_every_submission() {
        let material = material(&pipeline(1), 1, MaterialPass::MainColor);
        let mut stats = EngineStats::default();
        let mut recorder = Recorder::default();

        for _ in 0..2 {
            let mut ctx = DrawContext::default();
            ctx.push(object(&material, 1, Vec3::new(0.0, 0.0, -10.0)));
            submit(&mut ctx, &view_proj(), &mut recorder, &mut stats);
        }

        assert_eq!(stats.drawcall_count, 1);
        assert_eq!(stats.triangle_count, 2);
    }
}
