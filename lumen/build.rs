use glob::glob;
use std::{error::Error, process::Command};

const SHADER_DIR: &str = "../shaders";
const STAGES: [&str; 3] = ["vert", "frag", "comp"];

/// Compiles every shader stage source to `<source>.spv` beside it, which is where the
/// renderer's precompiled shader loader looks.
fn main() -> Result<(), Box<dyn Error>> {
    for include in glob(&format!("{SHADER_DIR}/*.glsl"))?.filter_map(Result::ok) {
        println!("cargo:rerun-if-changed={}", include.display());
    }

    let sources = glob(&format!("{SHADER_DIR}/*"))?
        .filter_map(Result::ok)
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| STAGES.contains(&extension))
        });

    for source in sources {
        println!("cargo:rerun-if-changed={}", source.display());

        let mut output = source.clone().into_os_string();
        output.push(".spv");

        let status = Command::new("glslc")
            .arg("--target-env=vulkan1.3")
            .arg("-I")
            .arg(SHADER_DIR)
            .arg(&source)
            .arg("-o")
            .arg(&output)
            .status();

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => return Err(format!("glslc failed on {}: {status}", source.display()).into()),
            Err(error) => {
                println!("cargo:warning=glslc unavailable ({error}), shaders in {SHADER_DIR} were not compiled");
                return Ok(());
            }
        }
    }
    Ok(())
}
