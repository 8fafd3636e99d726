//! Dear ImGui context fed from winit events, drawing the engine statistics window.

use crate::{
    Result,
    ren::{
        api::vk::{Overlay, OverlayContext, Renderer, imgui::OverlayRenderer, pipeline::shader::Precompiled},
        draw::EngineStats,
        settings::{MAX_RENDER_SCALE, MIN_RENDER_SCALE},
    },
};

use imgui::{Condition, Context, Io, Key, MouseButton};
use std::time::Instant;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
    window::Window,
};

/// Keys the UI widgets need for navigation and text editing.
pub fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::Tab => Key::Tab,
        KeyCode::ArrowLeft => Key::LeftArrow,
        KeyCode::ArrowRight => Key::RightArrow,
        KeyCode::ArrowUp => Key::UpArrow,
        KeyCode::ArrowDown => Key::DownArrow,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Insert => Key::Insert,
        KeyCode::Delete => Key::Delete,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Space => Key::Space,
        KeyCode::Enter => Key::Enter,
        KeyCode::NumpadEnter => Key::KeypadEnter,
        KeyCode::Escape => Key::Escape,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        _ => return None,
    })
}

pub fn map_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        winit::event::MouseButton::Middle => Some(MouseButton::Middle),
        winit::event::MouseButton::Back => Some(MouseButton::Extra1),
        winit::event::MouseButton::Forward => Some(MouseButton::Extra2),
        winit::event::MouseButton::Other(_) => None,
    }
}

pub struct ImGui {
    context: Context,
    renderer: OverlayRenderer,
    scale_factor: f64,
    last_frame: Instant,
    /// `new_frame` was called and the matching `render` has not happened yet.
    frame_pending: bool,
}

impl ImGui {
    pub fn new(window: &Window, renderer: &mut Renderer) -> Result<Self> {
        let mut context = Context::create();
        context.set_ini_filename(None);

        let scale_factor = window.scale_factor();
        set_display_size(context.io_mut(), window.inner_size(), scale_factor);

        let shader_dir = renderer.settings().shader_dir.clone();
        let color_format = renderer.swapchain_format();
        let (device, allocator, immediate, deletion) = renderer.overlay_setup();
        let renderer = OverlayRenderer::new(
            &mut context,
            device,
            allocator,
            immediate,
            deletion,
            &Precompiled,
            &shader_dir,
            color_format,
        )?;

        Ok(Self {
            context,
            renderer,
            scale_factor,
            last_frame: Instant::now(),
            frame_pending: false,
        })
    }

    /// Whether a focused widget is consuming key presses this frame.
    pub fn wants_keyboard(&self) -> bool {
        self.context.io().want_capture_keyboard
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        let io = self.context.io_mut();
        match event {
            WindowEvent::Resized(size) => set_display_size(io, *size, self.scale_factor),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = *scale_factor;
                io.display_framebuffer_scale = [*scale_factor as f32; 2];
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = position.to_logical::<f32>(self.scale_factor);
                io.add_mouse_pos_event([position.x, position.y]);
            }
            WindowEvent::CursorLeft { .. } => io.add_mouse_pos_event([-f32::MAX, -f32::MAX]),
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = map_button(*button) {
                    io.add_mouse_button_event(button, *state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(h, v) => io.add_mouse_wheel_event([*h, *v]),
                MouseScrollDelta::PixelDelta(position) => {
                    let position = position.to_logical::<f32>(self.scale_factor);
                    io.add_mouse_wheel_event([position.x.signum(), position.y.signum()]);
                }
            },
            WindowEvent::ModifiersChanged(modifiers) => {
                let state: ModifiersState = modifiers.state();
                io.add_key_event(Key::ModShift, state.shift_key());
                io.add_key_event(Key::ModCtrl, state.control_key());
                io.add_key_event(Key::ModAlt, state.alt_key());
                io.add_key_event(Key::ModSuper, state.super_key());
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = map_key(code) {
                        io.add_key_event(key, pressed);
                    }
                }
                if pressed {
                    for character in event.text.iter().flat_map(|text| text.chars()).filter(|c| !c.is_control()) {
                        io.add_input_character(character);
                    }
                }
            }
            _ => {}
        }
    }

    /// Starts a UI frame and lays out the statistics window. The render scale slider writes
    /// straight into `render_scale`.
    pub fn prepare(&mut self, stats: &EngineStats, render_scale: &mut f32) {
        if self.frame_pending {
            // the previous frame never reached the overlay pass
            self.context.render();
        }

        let now = Instant::now();
        self.context.io_mut().update_delta_time(now - self.last_frame);
        self.last_frame = now;

        let ui = self.context.new_frame();
        ui.window("Stats")
            .position([10.0, 10.0], Condition::FirstUseEver)
            .always_auto_resize(true)
            .build(|| {
                ui.text(format!("frametime {:.3} ms", stats.frametime));
                ui.text(format!("draw time {:.3} ms", stats.mesh_draw_time));
                ui.text(format!("update time {:.3} ms", stats.scene_update_time));
                ui.text(format!("triangles {}", stats.triangle_count));
                ui.text(format!("draws {}", stats.drawcall_count));
                ui.separator();
                ui.slider("render scale", MIN_RENDER_SCALE, MAX_RENDER_SCALE, render_scale);
            });

        self.frame_pending = true;
    }
}

fn set_display_size(io: &mut Io, size: PhysicalSize<u32>, scale_factor: f64) {
    let logical = size.to_logical::<f32>(scale_factor);
    io.display_size = [logical.width, logical.height];
    io.display_framebuffer_scale = [scale_factor as f32; 2];
}

impl Overlay for ImGui {
    fn record(&mut self, ctx: &mut OverlayContext<'_>) -> Result<()> {
        if !self.frame_pending {
            return Ok(());
        }
        self.frame_pending = false;

        let draw_data = self.context.render();
        self.renderer.draw(draw_data, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_keys_are_forwarded() {
        assert_eq!(map_key(KeyCode::Backspace), Some(Key::Backspace));
        assert_eq!(map_key(KeyCode::KeyC), Some(Key::C));
        assert_eq!(map_key(KeyCode::F5), None);
    }

    #[test]
    fn only_named_buttons_are_forwarded() {
        assert_eq!(map_button(winit::event::MouseButton::Middle), Some(MouseButton::Middle));
        assert_eq!(map_button(winit::event::MouseButton::Other(9)), None);
    }
}
