//! Window ownership and the event-driven frame loop.

use crate::{
    Error, Result,
    imgui::ImGui,
    info::Info,
    input::{self, Event, Key},
    ren::{Overlay, Renderer, Settings},
};

use glam::{Mat4, Vec2, Vec3, Vec4};
use lumen_gpu::Vertex;
use std::{
    thread,
    time::{Duration, Instant},
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{CursorGrabMode, Window, WindowId},
};

const MINIMIZED_SLEEP: Duration = Duration::from_millis(100);

/// Unit cube with per-face normals, coloured by normal.
pub fn cube() -> (Vec<u32>, Vec<Vertex>) {
    let faces = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for normal in faces {
        let (u, v) = normal.any_orthonormal_pair();
        let base = vertices.len() as u32;
        for (s, t) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + u * s + v * t) * 0.5;
            let uv = Vec2::new((s + 1.0) / 2.0, (t + 1.0) / 2.0);
            let color = Vec4::from(((normal + Vec3::ONE) * 0.5, 1.0));
            vertices.push(Vertex::new(position, normal, uv, color));
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (indices, vertices)
}

struct Running {
    // Field order is drop order; the surface must not outlive its window.
    imgui: ImGui,
    renderer: Renderer,
    window: Window,
}

pub struct App {
    info: Info,
    settings: Settings,
    running: Option<Running>,
    error: Option<Error>,
    minimized: bool,
    pointer_captured: bool,
}

/// Opens the window and drives frames until quit or a fatal error.
pub fn run(info: Info, settings: Settings) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(info, settings);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

impl App {
    pub fn new(info: Info, settings: Settings) -> Self {
        Self {
            info,
            settings,
            running: None,
            error: None,
            minimized: false,
            pointer_captured: false,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let resolution = self.settings.resolution;
        let window_attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(PhysicalSize::new(resolution.width, resolution.height))
            .with_resizable(true);
        let window = event_loop.create_window(window_attributes)?;

        let mut renderer = Renderer::new(&self.info, self.settings.clone(), &window)?;

        let mut has_scene = false;
        if let Some(path) = self.settings.scene.clone() {
            match renderer.load_scene("structure", &path) {
                Ok(()) => has_scene = true,
                Err(error) => log::error!("failed to load scene {}: {error}", path.display()),
            }
        }
        if !has_scene {
            let (indices, vertices) = cube();
            let mesh = renderer.upload_mesh("cube", &indices, &vertices)?;
            renderer.spawn_mesh(mesh, None, Mat4::IDENTITY);
        }

        let imgui = ImGui::new(&window, &mut renderer)?;

        Ok(Running { imgui, renderer, window })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("{error}");
        self.error = Some(error);
        self.running = None;
        event_loop.exit();
    }

    fn set_pointer_capture(&mut self, captured: bool) {
        let Some(running) = &self.running else {
            return;
        };

        let window = &running.window;
        let grabbed = if captured {
            window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(error) = grabbed {
            log::warn!("cursor grab unavailable: {error}");
            return;
        }

        window.set_cursor_visible(!captured);
        self.pointer_captured = captured;
    }

    fn handle(&mut self, event_loop: &ActiveEventLoop, event: Event) {
        match event {
            Event::Quit | Event::KeyDown(Key::Escape) => event_loop.exit(),
            Event::Minimized => self.minimized = true,
            Event::Restored => self.minimized = false,
            Event::Resized { .. } => {
                self.minimized = false;
                if let Some(running) = &mut self.running {
                    running.renderer.request_resize();
                }
            }
            Event::KeyDown(Key::P) => self.set_pointer_capture(!self.pointer_captured),
            Event::KeyDown(_) | Event::KeyUp(_) | Event::PointerMotion { .. } => {
                if let Some(running) = &mut self.running {
                    let typing = matches!(event, Event::KeyDown(_)) && running.imgui.wants_keyboard();
                    if !typing {
                        running.renderer.camera.process_event(&event);
                    }
                }
            }
        }
    }

    fn frame(&mut self) -> Result<()> {
        let Some(running) = &mut self.running else {
            return Ok(());
        };
        let start = Instant::now();
        let renderer = &mut running.renderer;

        if renderer.resize_requested() {
            let size = running.window.inner_size();
            if size.width == 0 || size.height == 0 {
                return Ok(());
            }
            renderer.resize(size.width, size.height)?;
        }

        let mut render_scale = renderer.render_scale();
        running.imgui.prepare(&renderer.stats, &mut render_scale);
        renderer.set_render_scale(render_scale);

        renderer.update_scene();
        renderer.draw(Some(&mut running.imgui as &mut dyn Overlay))?;

        renderer.stats.frametime = start.elapsed().as_secs_f32() * 1000.0;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }

        match self.start(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(error) => self.fail(event_loop, error),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(running) = &mut self.running {
            running.imgui.handle_window_event(&event);
        }

        if let WindowEvent::RedrawRequested = event {
            if !self.minimized {
                if let Err(error) = self.frame() {
                    self.fail(event_loop, error);
                }
            }
            return;
        }

        if let Some(event) = input::translate(&event) {
            self.handle(event_loop, event);
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.pointer_captured {
                if let Some(running) = &mut self.running {
                    running.renderer.camera.process_event(&Event::PointerMotion { dx, dy });
                }
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.minimized {
            thread::sleep(MINIMIZED_SLEEP);
            return;
        }
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.running = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_four_vertices_and_two_triangles_per_face() {
        let (indices, vertices) = cube();

        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&index| (index as usize) < vertices.len()));
        assert!(
            vertices
                .iter()
                .all(|vertex| vertex.position().abs().max_element() <= 0.5 + 1e-6)
        );
    }
}
