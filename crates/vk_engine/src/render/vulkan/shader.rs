//! SPIR-V shader loading

use std::ffi::CStr;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point every shader in the renderer uses
pub const SHADER_ENTRY: &CStr = c"main";

fn shader_error(path: &Path, reason: impl ToString) -> VulkanError {
    VulkanError::ShaderLoad {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Parse SPIR-V words from raw bytes
///
/// Rejects input whose length is not a multiple of four or that lacks the
/// SPIR-V magic number.
pub fn parse_spirv(bytes: &[u8]) -> std::io::Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
}

/// Load a compiled shader binary from `path` and create a module from it
pub fn load_shader_module(device: &Device, path: &Path) -> VulkanResult<vk::ShaderModule> {
    let mut file = File::open(path).map_err(|e| shader_error(path, e))?;
    let code = ash::util::read_spv(&mut file).map_err(|e| shader_error(path, e))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
    let module = unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| shader_error(path, format!("{e:?}")))?;

    log::debug!("Loaded shader module {}", path.display());
    Ok(module)
}

/// Stage info for `module` with the standard entry point
pub fn stage_info(
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
) -> vk::PipelineShaderStageCreateInfo {
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(stage)
        .module(module)
        .name(SHADER_ENTRY)
        .build()
}
