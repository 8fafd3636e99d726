/// Maps an `ash` result into [`crate::Error::Vulkan`], tagging it with the invoking file and line.
///
/// ```ignore
/// let fence = vk_check!(unsafe { device.create_fence(&create_info, None) })?;
/// ```
#[macro_export]
macro_rules! vk_check {
    ($call:expr) => {
        ($call).map_err(|result| $crate::Error::vulkan(result, concat!(file!(), ":", line!())))
    };
}
