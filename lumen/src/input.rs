//! Window events reduced to what the renderer and camera consume.

use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    P,
    Escape,
}

impl Key {
    fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::KeyW => Some(Self::W),
            KeyCode::KeyA => Some(Self::A),
            KeyCode::KeyS => Some(Self::S),
            KeyCode::KeyD => Some(Self::D),
            KeyCode::KeyP => Some(Self::P),
            KeyCode::Escape => Some(Self::Escape),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    KeyDown(Key),
    KeyUp(Key),
    /// Relative motion in physical pixels.
    PointerMotion { dx: f64, dy: f64 },
    Resized { width: u32, height: u32 },
    Minimized,
    Restored,
    Quit,
}

/// Translates a winit window event. Pointer motion arrives separately as a device event.
pub fn translate(event: &WindowEvent) -> Option<Event> {
    match event {
        WindowEvent::CloseRequested => Some(Event::Quit),
        WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => Some(Event::Minimized),
        WindowEvent::Resized(size) => Some(Event::Resized { width: size.width, height: size.height }),
        WindowEvent::Occluded(true) => Some(Event::Minimized),
        WindowEvent::Occluded(false) => Some(Event::Restored),
        WindowEvent::KeyboardInput {
            event: KeyEvent { physical_key: PhysicalKey::Code(code), state, repeat: false, .. },
            ..
        } => {
            let key = Key::from_code(*code)?;
            Some(match state {
                ElementState::Pressed => Event::KeyDown(key),
                ElementState::Released => Event::KeyUp(key),
            })
        }
        _ => None,
    }
}
