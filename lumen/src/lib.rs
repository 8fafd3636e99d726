#[macro_use]
mod macros;

pub mod app;
pub mod error;
pub mod imgui;
pub mod info;
pub mod input;
pub mod ren;
pub mod scene;

pub use error::{Error, Result};
