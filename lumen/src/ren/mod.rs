pub mod api;
pub mod draw;
pub mod frame;
pub mod settings;

pub use api::vk::{Overlay, OverlayContext, Renderer};
pub use settings::{Resolution, Settings};
