//! vk_engine demo
//!
//! Opens a window and renders the default scene over a compute background.
//! Press space to cycle background effects and escape to quit.
//!
//! Usage: `vk_demo [config.toml | config.ron]`

use std::error::Error;
use std::path::PathBuf;

use vk_engine::foundation::math::{Transform, Vec3};
use vk_engine::prelude::*;
use vk_engine::render::{MeshAsset, MeshData, NodeKind};

fn load_config() -> Result<EngineConfig, ConfigError> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => EngineConfig::load_from_file(&path),
        None => Ok(EngineConfig::new().with_title("vk_engine demo")),
    }
}

/// Upload a quad and hang it above the default scene
fn add_panel(engine: &mut VulkanEngine) -> Result<(), Box<dyn Error>> {
    let data = MeshData::rectangle();
    let mesh_buffers = engine.upload_mesh(&data.indices, &data.vertices)?;

    let scene = engine.scene_mut();
    let mesh = scene.add_mesh(MeshAsset {
        name: "panel".to_string(),
        surfaces: vec![data.whole_surface()],
        mesh_buffers,
    });
    let panel = Transform::from_position(Vec3::new(0.0, 1.5, 0.0)).to_matrix();
    scene.add_node("panel", NodeKind::Mesh(mesh), panel, None)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    vk_engine::foundation::logging::init_with_level(config.effective_log_level());
    log::info!("Starting vk_engine demo");

    let mut engine = match VulkanEngine::new(config) {
        Ok(engine) => engine,
        Err(EngineError::Vulkan(err)) => abort_on_fatal(&err),
        Err(err) => return Err(err.into()),
    };
    add_panel(&mut engine)?;

    log::info!("Running \"{}\"", engine.config().window.title);
    engine.run();

    Ok(())
}
