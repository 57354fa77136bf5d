// build.rs
// Compiles the GLSL sources in resources/shaders to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 3] = ["vert", "frag", "comp"];

fn glslc_path() -> Option<PathBuf> {
    let vulkan_sdk = env::var("VULKAN_SDK").ok()?;
    let glslc = if cfg!(target_os = "windows") {
        Path::new(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        Path::new(&vulkan_sdk).join("bin").join("glslc")
    };
    glslc.exists().then_some(glslc)
}

fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(glslc) = glslc_path() else {
        println!("cargo:warning=glslc not found (is VULKAN_SDK set?); shaders not compiled");
        return;
    };

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {}: {e}", target_dir.display());
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at {}", shader_dir.display());
            return;
        }
    };

    let mut compiled_count = 0;
    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let is_shader = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_shader {
            continue;
        }

        // gradient.comp -> gradient.comp.spv keeps stages of one name apart
        let out_file = target_dir.join(format!("{file_name}.spv"));
        if !is_stale(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg("--target-env=vulkan1.3")
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {file_name}");
                compiled_count += 1;
            }
            Ok(s) => panic!("glslc failed for {file_name} with exit code {:?}", s.code()),
            Err(e) => panic!("Failed to run glslc for {file_name}: {e}"),
        }
    }

    eprintln!("info: Compiled {compiled_count} shader(s)");
}
