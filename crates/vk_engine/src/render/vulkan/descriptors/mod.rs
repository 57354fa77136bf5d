//! Descriptor set layouts, allocators and writes
//!
//! Two allocators share one ratio table format:
//!
//! - [`DescriptorAllocator`] owns a single fixed pool, for small sets that
//!   live as long as the engine.
//! - [`GrowableDescriptorAllocator`] manages a pool of pools and creates new,
//!   larger pools on demand. Each frame slot owns one and resets it every time
//!   the slot comes around again.

pub mod allocator;
pub mod growable;
pub mod layout;
pub mod writer;

pub use allocator::DescriptorAllocator;
pub use growable::GrowableDescriptorAllocator;
pub use layout::DescriptorLayoutBuilder;
pub use writer::DescriptorWriter;

use ash::vk;
use serde::{Deserialize, Serialize};

/// Descriptor types a pool can be sized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Standalone sampler
    Sampler,
    /// Image view and sampler in one descriptor
    CombinedImageSampler,
    /// Image read through a separate sampler
    SampledImage,
    /// Image written from shaders
    StorageImage,
    /// Uniform buffer
    UniformBuffer,
    /// Storage buffer
    StorageBuffer,
    /// Uniform buffer with a dynamic offset
    UniformBufferDynamic,
    /// Storage buffer with a dynamic offset
    StorageBufferDynamic,
    /// Subpass input attachment
    InputAttachment,
}

impl From<DescriptorKind> for vk::DescriptorType {
    fn from(kind: DescriptorKind) -> Self {
        match kind {
            DescriptorKind::Sampler => Self::SAMPLER,
            DescriptorKind::CombinedImageSampler => Self::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::SampledImage => Self::SAMPLED_IMAGE,
            DescriptorKind::StorageImage => Self::STORAGE_IMAGE,
            DescriptorKind::UniformBuffer => Self::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => Self::STORAGE_BUFFER,
            DescriptorKind::UniformBufferDynamic => Self::UNIFORM_BUFFER_DYNAMIC,
            DescriptorKind::StorageBufferDynamic => Self::STORAGE_BUFFER_DYNAMIC,
            DescriptorKind::InputAttachment => Self::INPUT_ATTACHMENT,
        }
    }
}

/// Relative weight of one descriptor kind in a pool
///
/// A ratio `r` for a pool of `n` sets reserves `r * n` descriptors of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolSizeRatio {
    /// Descriptor kind
    pub kind: DescriptorKind,
    /// Descriptors per set
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Shorthand constructor
    pub const fn new(kind: DescriptorKind, ratio: f32) -> Self {
        Self { kind, ratio }
    }
}

/// Per-kind descriptor counts for a pool holding `max_sets` sets
///
/// Every kind gets at least one descriptor; a zero-sized entry is invalid.
pub fn pool_sizes(ratios: &[PoolSizeRatio], max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.kind.into(),
            descriptor_count: ((ratio.ratio * max_sets as f32) as u32).max(1),
        })
        .collect()
}
