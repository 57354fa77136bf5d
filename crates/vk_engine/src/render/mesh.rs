//! Mesh data and GPU upload
//!
//! Vertices are never bound as vertex buffers. The vertex buffer is a storage
//! buffer whose device address is pushed with each draw, and the vertex
//! shader reads `Vertex` records through that pointer. The layouts here must
//! therefore match the shader structs exactly, std430 rules included.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_cols_array, Mat4, Vec3, Vec4};
use crate::render::vulkan::buffer::AllocatedBuffer;
use crate::render::vulkan::commands::ImmediateSubmit;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::deletion_queue::{DeferredRelease, DeletionQueue};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One vertex as the mesh shader reads it
///
/// UVs are split across the padding slots of the two `vec3`s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture U, packed after `position`
    pub uv_x: f32,
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture V, packed after `normal`
    pub uv_y: f32,
    /// Linear RGBA colour
    pub color: [f32; 4],
}

impl Vertex {
    /// Vertex with a position, normal and colour and zero UVs
    pub fn new(position: Vec3, normal: Vec3, color: Vec4) -> Self {
        Self {
            position: position.into(),
            uv_x: 0.0,
            normal: normal.into(),
            uv_y: 0.0,
            color: color.into(),
        }
    }
}

/// Per-draw push constants for the mesh pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuDrawPushConstants {
    /// Column-major model matrix
    pub world_matrix: [[f32; 4]; 4],
    /// Device address of the vertex storage buffer
    pub vertex_buffer: vk::DeviceAddress,
}

impl GpuDrawPushConstants {
    /// Push constants drawing the vertices at `vertex_buffer` with `world_matrix`
    pub fn new(world_matrix: &Mat4, vertex_buffer: vk::DeviceAddress) -> Self {
        Self {
            world_matrix: to_cols_array(world_matrix),
            vertex_buffer,
        }
    }
}

/// Per-frame scene uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuSceneData {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip, reversed Z
    pub proj: [[f32; 4]; 4],
    /// `proj * view`
    pub view_proj: [[f32; 4]; 4],
    /// Ambient light
    pub ambient_color: [f32; 4],
    /// `w` holds the sun power
    pub sunlight_direction: [f32; 4],
    /// Sun colour
    pub sunlight_color: [f32; 4],
}

impl GpuSceneData {
    /// Scene data for a camera; lighting takes the renderer's fixed defaults
    pub fn from_camera(view: &Mat4, proj: &Mat4) -> Self {
        Self {
            view: to_cols_array(view),
            proj: to_cols_array(proj),
            view_proj: to_cols_array(&(proj * view)),
            ambient_color: [0.1, 0.1, 0.1, 1.0],
            sunlight_direction: [0.0, 1.0, 0.5, 1.0],
            sunlight_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// A contiguous index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoSurface {
    /// First index of the range
    pub start_index: u32,
    /// Number of indices
    pub count: u32,
}

/// Device-local buffers of one uploaded mesh
#[derive(Debug)]
pub struct GpuMeshBuffers {
    /// `u32` indices
    pub index_buffer: AllocatedBuffer,
    /// [`Vertex`] storage buffer, fetched by address
    pub vertex_buffer: AllocatedBuffer,
    /// Device address of `vertex_buffer`
    pub vertex_buffer_address: vk::DeviceAddress,
}

impl GpuMeshBuffers {
    /// Queue both buffers for release
    pub fn release_into(self, queue: &mut DeletionQueue) {
        queue.push(DeferredRelease::Buffer(self.index_buffer));
        queue.push(DeferredRelease::Buffer(self.vertex_buffer));
    }
}

/// A named mesh and its surfaces
#[derive(Debug)]
pub struct MeshAsset {
    /// Name used for lookups
    pub name: String,
    /// Index ranges drawn separately
    pub surfaces: Vec<GeoSurface>,
    /// GPU copy of the geometry
    pub mesh_buffers: GpuMeshBuffers,
}

/// CPU-side geometry waiting to be uploaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// One surface covering every index
    pub fn whole_surface(&self) -> GeoSurface {
        GeoSurface {
            start_index: 0,
            count: self.indices.len() as u32,
        }
    }

    /// Unit quad in the XY plane, one colour per corner
    pub fn rectangle() -> Self {
        let normal = Vec3::z();
        let corners = [
            (Vec3::new(0.5, -0.5, 0.0), Vec4::new(0.0, 0.0, 0.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.0), Vec4::new(0.5, 0.5, 0.5, 1.0)),
            (Vec3::new(-0.5, -0.5, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            (Vec3::new(-0.5, 0.5, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
        ];
        Self {
            vertices: corners
                .iter()
                .map(|&(position, color)| Vertex::new(position, normal, color))
                .collect(),
            indices: vec![0, 1, 2, 2, 1, 3],
        }
    }

    /// Unit cube centred on the origin, four vertices per face
    ///
    /// Faces are coloured by their normal so orientation is visible.
    pub fn cube() -> Self {
        let faces = [
            Vec3::x(),
            -Vec3::x(),
            Vec3::y(),
            -Vec3::y(),
            Vec3::z(),
            -Vec3::z(),
        ];

        let mut mesh = Self::default();
        for normal in faces {
            let tangent = if normal.x.abs() > 0.5 { Vec3::y() } else { Vec3::x() };
            let bitangent = normal.cross(&tangent);
            let color = Vec4::new(normal.x.abs(), normal.y.abs(), normal.z.abs(), 1.0);
            let base = mesh.vertices.len() as u32;

            for (u, v) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = normal * 0.5 + tangent * u + bitangent * v;
                mesh.vertices.push(Vertex::new(position, normal, color));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }
}

/// Copy `indices` and `vertices` into new device-local buffers
///
/// Both arrays go through one host-visible staging buffer and a blocking
/// transfer on `immediate`. The vertex buffer is a storage buffer with a
/// device address for pointer-based vertex fetch.
pub fn upload_mesh(
    context: &VulkanContext,
    immediate: &ImmediateSubmit,
    indices: &[u32],
    vertices: &[Vertex],
) -> VulkanResult<GpuMeshBuffers> {
    if indices.is_empty() || vertices.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "cannot upload an empty mesh".to_string(),
        });
    }

    let device = context.raw();
    let memory = context.memory_properties();
    let vertex_size = std::mem::size_of_val(vertices) as vk::DeviceSize;
    let index_size = std::mem::size_of_val(indices) as vk::DeviceSize;

    let vertex_buffer = AllocatedBuffer::new(
        device,
        memory,
        vertex_size,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let index_buffer = match AllocatedBuffer::new(
        device,
        memory,
        index_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            vertex_buffer.destroy(device);
            return Err(err);
        }
    };

    let staged = stage_and_copy(
        context,
        immediate,
        (&vertex_buffer, vertices),
        (&index_buffer, indices),
    );
    if let Err(err) = staged {
        vertex_buffer.destroy(device);
        index_buffer.destroy(device);
        return Err(err);
    }

    let vertex_buffer_address = vertex_buffer.device_address(device);
    log::debug!(
        "Uploaded mesh: {} vertices, {} indices",
        vertices.len(),
        indices.len()
    );
    Ok(GpuMeshBuffers {
        index_buffer,
        vertex_buffer,
        vertex_buffer_address,
    })
}

fn stage_and_copy(
    context: &VulkanContext,
    immediate: &ImmediateSubmit,
    (vertex_buffer, vertices): (&AllocatedBuffer, &[Vertex]),
    (index_buffer, indices): (&AllocatedBuffer, &[u32]),
) -> VulkanResult<()> {
    let device = context.raw();
    let vertex_size = vertex_buffer.size;
    let index_size = index_buffer.size;

    let staging = AllocatedBuffer::new(
        device,
        context.memory_properties(),
        vertex_size + index_size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let result = staging
        .write_at(device, 0, vertices)
        .and_then(|()| staging.write_at(device, vertex_size, indices))
        .and_then(|()| {
            immediate.submit(context, |device, cmd| unsafe {
                let vertex_copy = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: vertex_size,
                };
                device.cmd_copy_buffer(cmd, staging.buffer, vertex_buffer.buffer, &[vertex_copy]);

                let index_copy = vk::BufferCopy {
                    src_offset: vertex_size,
                    dst_offset: 0,
                    size: index_size,
                };
                device.cmd_copy_buffer(cmd, staging.buffer, index_buffer.buffer, &[index_copy]);
            })
        });

    staging.destroy(device);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gpu_struct_sizes_match_shader_layouts() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(std::mem::size_of::<GpuDrawPushConstants>(), 72);
        assert_eq!(std::mem::size_of::<GpuSceneData>(), 240);
    }

    #[test]
    fn test_vertex_field_offsets() {
        let vertex = Vertex {
            uv_x: 1.0,
            uv_y: 2.0,
            ..Default::default()
        };
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        assert_eq!(floats[3], 1.0);
        assert_eq!(floats[7], 2.0);
    }

    #[test]
    fn test_push_constants_place_address_after_matrix() {
        let push = GpuDrawPushConstants::new(&Mat4::identity(), 0xdead_beef);
        let bytes = bytemuck::bytes_of(&push);

        assert_eq!(&bytes[64..72], &0xdead_beef_u64.to_ne_bytes());
    }

    #[test]
    fn test_scene_data_combines_view_and_projection() {
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0));
        let proj = Mat4::new_scaling(2.0);
        let data = GpuSceneData::from_camera(&view, &proj);

        assert_relative_eq!(data.view_proj[3][2], -10.0);
        assert_eq!(data.view[3], [0.0, 0.0, -5.0, 1.0]);
    }

    #[test]
    fn test_rectangle_geometry() {
        let mesh = MeshData::rectangle();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(mesh.whole_surface(), GeoSurface { start_index: 0, count: 6 });
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let mesh = MeshData::cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));

        for vertex in &mesh.vertices {
            let position = Vec3::from(vertex.position);
            let normal = Vec3::from(vertex.normal);
            assert_relative_eq!(position.dot(&normal), 0.5, epsilon = 1e-6);
            assert_relative_eq!(position.abs().max(), 0.5, epsilon = 1e-6);
        }
    }
}
