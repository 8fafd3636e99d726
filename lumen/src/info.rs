use std::ffi::CString;

pub struct Info {
    pub app_name: CString,
    pub app_version: u32,
    pub engine_name: CString,
    pub engine_version: u32,
}

impl Info {
    pub fn new(app_name: &str, app_version: u32) -> Self {
        // interior NULs cannot reach the driver
        let app_name = CString::new(app_name.replace('\0', "")).unwrap_or_default();
        Self {
            app_name,
            app_version,
            engine_name: c"lumen".to_owned(),
            engine_version: make_version(0, 1, 0, 0),
        }
    }
}

pub const fn make_version(variant: u32, major: u32, minor: u32, patch: u32) -> u32 {
    (variant << 29) | (major << 22) | (minor << 12) | patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn version_packing_matches_vulkan() {
        assert_eq!(make_version(0, 1, 3, 0), vk::API_VERSION_1_3);
        assert_eq!(make_version(0, 1, 2, 7), vk::make_api_version(0, 1, 2, 7));
    }

    #[test]
    fn names_strip_interior_nul() {
        let info = Info::new("vie\0wer", 1);
        assert_eq!(info.app_name.to_str().unwrap(), "viewer");
    }
}
