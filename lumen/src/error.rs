use ash::vk;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Raw Vulkan failure with the call site that observed it.
    #[error("vulkan call failed with {result:?} at {site}")]
    Vulkan { result: vk::Result, site: &'static str },

    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("gpu memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    #[error("no physical device satisfies the renderer requirements")]
    NoSuitableDevice,

    #[error("presentation surface unusable: {0}")]
    Surface(&'static str),

    #[error("shader {path} failed to load: {message}")]
    Shader { path: PathBuf, message: String },

    #[error("pipeline creation rejected by the device: {0:?}")]
    Pipeline(vk::Result),

    #[error("host copy into mapped memory failed: {0:?}")]
    Upload(presser::CopyError),

    #[error("descriptor allocation failed on a fresh pool: {0:?}")]
    DescriptorPoolExhausted(vk::Result),

    #[error("frame slot {slot} not released by the gpu within {timeout_ms} ms")]
    FrameTimeout { slot: usize, timeout_ms: u64 },

    #[error("window handle unavailable: {0}")]
    Window(#[from] winit::raw_window_handle::HandleError),

    #[error("event loop failure: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("window creation failed: {0}")]
    WindowCreation(#[from] winit::error::OsError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("scene import failed: {0}")]
    Import(#[from] gltf::Error),
}

impl Error {
    pub fn vulkan(result: vk::Result, site: &'static str) -> Self {
        Self::Vulkan { result, site }
    }
}
