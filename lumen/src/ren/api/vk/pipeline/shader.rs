use crate::{Error, Result};

use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Produces SPIR-V for a shader source. `include_root` resolves `#include` directives.
pub trait ShaderCompiler {
    fn compile(&self, source: &Path, include_root: &Path) -> Result<Vec<u32>>;
}

/// Reads SPIR-V compiled ahead of time, looking for `<source>.spv` next to the source.
#[derive(Clone, Copy, Debug, Default)]
pub struct Precompiled;

pub fn spirv_path(source: &Path) -> PathBuf {
    let mut path = source.as_os_str().to_owned();
    path.push(".spv");
    PathBuf::from(path)
}

impl ShaderCompiler for Precompiled {
    fn compile(&self, source: &Path, include_root: &Path) -> Result<Vec<u32>> {
        let path = include_root.join(spirv_path(source));
        let shader_error = |message: String| {
            log::error!("shader {} unavailable: {message}", path.display());
            Error::Shader { path: path.clone(), message }
        };

        let mut file = File::open(&path).map_err(|error| shader_error(error.to_string()))?;
        let code = ash::util::read_spv(&mut file).map_err(|error| shader_error(error.to_string()))?;
        log::debug!("loaded {} ({} words)", path.display(), code.len());
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn spirv_sits_next_to_the_source() {
        assert_eq!(spirv_path(Path::new("mesh.vert")), PathBuf::from("mesh.vert.spv"));
    }

    #[test]
    fn missing_binary_names_the_path() {
        let error = Precompiled.compile(Path::new("nowhere.frag"), Path::new("/definitely/not/here")).unwrap_err();
        match error {
            Error::Shader { path, .. } => assert_eq!(path, PathBuf::from("/definitely/not/here/nowhere.frag.spv")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reads_words_and_rejects_truncated_files() {
        let dir = std::env::temp_dir().join(format!("lumen-shader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        let mut file = File::create(dir.join("ok.comp.spv")).unwrap();
        file.write_all(bytemuck::cast_slice(&words)).unwrap();
        drop(file);
        assert_eq!(Precompiled.compile(Path::new("ok.comp"), &dir).unwrap(), words);

        std::fs::write(dir.join("bad.comp.spv"), [1u8, 2, 3]).unwrap();
        assert!(matches!(Precompiled.compile(Path::new("bad.comp"), &dir), Err(Error::Shader { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
