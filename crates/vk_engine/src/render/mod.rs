//! Rendering
//!
//! [`vulkan`] holds the GPU-facing machinery; [`mesh`] and [`scene`] describe
//! what gets drawn.

pub mod mesh;
pub mod scene;
pub mod vulkan;

pub use mesh::{GeoSurface, GpuDrawPushConstants, GpuMeshBuffers, GpuSceneData, MeshAsset, MeshData, Vertex};
pub use scene::{DrawContext, MeshKey, NodeKey, NodeKind, RenderObject, SceneError, SceneGraph};
