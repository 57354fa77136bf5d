//! Engine lifecycle and the frame loop
//!
//! [`VulkanEngine::new`] brings everything up in order: window, Vulkan
//! context, swapchain, render targets, frame ring, immediate submit,
//! descriptors, pipelines and the default scene. [`VulkanEngine::run`] polls
//! the window and draws until asked to quit. Dropping the engine waits for the
//! device to go idle, releases the frame slots, flushes the main deletion
//! queue and destroys the swapchain; the context then tears down the surface,
//! device and instance.

use std::thread;
use std::time::Duration;

use ash::{vk, Device};
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig, ShaderConfig};
use crate::foundation::math::{perspective_reversed_z, Mat4, Transform, Vec3};
use crate::render::mesh::{
    upload_mesh, GpuDrawPushConstants, GpuMeshBuffers, GpuSceneData, MeshAsset, MeshData, Vertex,
};
use crate::render::scene::{DrawContext, NodeKey, NodeKind, SceneError, SceneGraph};
use crate::render::vulkan::buffer::AllocatedBuffer;
use crate::render::vulkan::commands::{begin_one_time, end_recording, ImmediateSubmit};
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::deletion_queue::{DeferredRelease, DeletionQueue};
use crate::render::vulkan::descriptors::{
    DescriptorAllocator, DescriptorLayoutBuilder, DescriptorWriter,
};
use crate::render::vulkan::error::abort_on_fatal;
use crate::render::vulkan::frame::{shutdown, FrameRing, FrameSettings};
use crate::render::vulkan::images::{
    copy_image_to_image, subresource_range, transition_image, AllocatedImage,
};
use crate::render::vulkan::pipeline::{
    create_compute_layout, create_pipeline_layout, load_compute_effects, ComputeEffect,
    ComputePushConstants, EffectSource, GraphicsPipelineBuilder,
};
use crate::render::vulkan::shader::load_shader_module;
use crate::render::vulkan::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use crate::render::vulkan::sync::{semaphore_submit_info, submit_commands};
use crate::render::vulkan::window::{Window, WindowSignal};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Format of the off-screen colour target
pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Format of the depth target
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const MINIMIZED_SLEEP: Duration = Duration::from_millis(100);

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graphics API or window failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// The default scene could not be assembled
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Brightness of the fallback clear colour for `frame_number`
pub fn clear_flash(frame_number: u64) -> f32 {
    (frame_number as f32 / 120.0).sin().abs()
}

/// Region of the draw image rendered this frame
pub fn draw_extent(target: vk::Extent2D, draw_image: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: target.width.min(draw_image.width),
        height: target.height.min(draw_image.height),
    }
}

/// Index of the effect after `current`, wrapping around
pub fn next_effect(current: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        (current + 1) % count
    }
}

/// The background effects, in cycling order
pub fn background_sources(shaders: &ShaderConfig) -> [EffectSource<'_>; 2] {
    [
        EffectSource {
            name: "gradient",
            path: &shaders.gradient,
            push_constants: ComputePushConstants {
                data1: [1.0, 0.0, 0.0, 1.0],
                data2: [0.0, 0.0, 1.0, 1.0],
                ..Default::default()
            },
        },
        EffectSource {
            name: "sky",
            path: &shaders.sky,
            push_constants: ComputePushConstants {
                data1: [0.1, 0.2, 0.4, 0.97],
                ..Default::default()
            },
        },
    ]
}

/// Handles of an image registered on the main deletion queue
#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    image: vk::Image,
    view: vk::ImageView,
    extent: vk::Extent2D,
}

impl RenderTarget {
    fn register(image: AllocatedImage, queue: &mut DeletionQueue) -> Self {
        let target = Self {
            image: image.image,
            view: image.view,
            extent: image.extent_2d(),
        };
        queue.push(DeferredRelease::Image(image));
        target
    }
}

/// The renderer and everything it owns
pub struct VulkanEngine {
    config: EngineConfig,
    frames: FrameRing,
    main_deletion_queue: DeletionQueue,
    immediate: ImmediateSubmit,
    swapchain: Option<Swapchain>,
    draw_target: RenderTarget,
    depth_target: RenderTarget,
    draw_image_descriptors: vk::DescriptorSet,
    scene_data_layout: vk::DescriptorSetLayout,
    effects: Vec<ComputeEffect>,
    current_effect: usize,
    mesh_layout: vk::PipelineLayout,
    mesh_pipeline: vk::Pipeline,
    scene: SceneGraph,
    scene_root: NodeKey,
    draw_context: DrawContext,
    scene_data: GpuSceneData,
    resize_requested: bool,
    minimized: bool,
    // Dropped after every field above, and before the window.
    context: VulkanContext,
    window: Window,
}

impl VulkanEngine {
    /// Bring up the window, the device and every long-lived GPU resource
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let renderer = &config.renderer;
        log::debug!("Initialising engine");

        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)
            .map_err(VulkanError::from)?;
        let context =
            VulkanContext::new(&mut window, &config.window.title, renderer.validation_enabled())?;
        let window_extent = window.framebuffer_extent();
        let swapchain = Swapchain::new(&context, window_extent)?;

        let mut main_deletion_queue = DeletionQueue::new("main deletion queue");
        let (draw_target, depth_target) =
            create_render_targets(&context, window_extent, &mut main_deletion_queue)?;

        let frames = FrameRing::new(
            &context,
            &FrameSettings {
                frames_in_flight: renderer.frames_in_flight,
                fence_timeout_ns: renderer.fence_timeout_ns,
                queue_family: context.graphics_queue_family(),
                descriptor_sets: renderer.frame_descriptors.sets,
                descriptor_ratios: renderer.frame_descriptors.ratios.clone(),
            },
        )?;

        let immediate = ImmediateSubmit::new(
            &context,
            context.graphics_queue_family(),
            renderer.fence_timeout_ns,
        )?;
        immediate.release_into(&mut main_deletion_queue);

        let global_descriptors = DescriptorAllocator::init_pool(
            &context,
            renderer.global_descriptors.sets,
            &renderer.global_descriptors.ratios,
        )?;
        main_deletion_queue.push(DeferredRelease::DescriptorPool(global_descriptors.pool()));

        let draw_image_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                &context,
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        main_deletion_queue.push(DeferredRelease::DescriptorSetLayout(draw_image_layout));

        let draw_image_descriptors = global_descriptors.allocate(&context, draw_image_layout)?;
        DescriptorWriter::new()
            .write_image(
                0,
                draw_target.view,
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            )
            .update_set(&context, draw_image_descriptors);

        let scene_data_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(
                &context,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        main_deletion_queue.push(DeferredRelease::DescriptorSetLayout(scene_data_layout));

        let background_layout = create_compute_layout(context.raw(), draw_image_layout)?;
        main_deletion_queue.push(DeferredRelease::PipelineLayout(background_layout));
        let effects = load_compute_effects(
            context.raw(),
            background_layout,
            &background_sources(&renderer.shaders),
        );
        for effect in &effects {
            main_deletion_queue.push(DeferredRelease::Pipeline(effect.pipeline));
        }
        if effects.is_empty() {
            log::warn!("No background effect loaded; the draw image will be cleared instead");
        }

        let mesh_layout = create_mesh_layout(context.raw(), scene_data_layout)?;
        main_deletion_queue.push(DeferredRelease::PipelineLayout(mesh_layout));
        let mesh_pipeline = create_mesh_pipeline(context.raw(), mesh_layout, &renderer.shaders)?;
        main_deletion_queue.push(DeferredRelease::Pipeline(mesh_pipeline));

        let mut scene = SceneGraph::new();
        let scene_root = build_default_scene(&context, &immediate, &mut scene)?;

        log::info!(
            "Engine initialised: {} frame(s) in flight, {} background effect(s)",
            frames.len(),
            effects.len()
        );
        Ok(Self {
            config,
            frames,
            main_deletion_queue,
            immediate,
            swapchain: Some(swapchain),
            draw_target,
            depth_target,
            draw_image_descriptors,
            scene_data_layout,
            effects,
            current_effect: 0,
            mesh_layout,
            mesh_pipeline,
            scene,
            scene_root,
            draw_context: DrawContext::default(),
            scene_data: GpuSceneData::from_camera(&Mat4::identity(), &Mat4::identity()),
            resize_requested: false,
            minimized: false,
            context,
            window,
        })
    }

    /// Poll the window and draw until a quit is requested
    ///
    /// Any graphics error inside the loop is fatal and aborts the process.
    pub fn run(&mut self) {
        log::info!("Entering main loop");

        loop {
            let mut quit = false;
            for signal in self.window.poll_signals() {
                match signal {
                    WindowSignal::Quit => quit = true,
                    WindowSignal::Minimized => self.minimized = true,
                    WindowSignal::Restored => self.minimized = false,
                    WindowSignal::Resized => self.resize_requested = true,
                    WindowSignal::NextEffect => self.cycle_effect(),
                }
            }
            if quit || self.window.should_close() {
                break;
            }

            if self.minimized {
                thread::sleep(MINIMIZED_SLEEP);
                continue;
            }

            if self.resize_requested {
                if let Err(err) = self.resize_swapchain() {
                    abort_on_fatal(&err);
                }
                if self.resize_requested {
                    // Zero-sized framebuffer: nothing to present into yet.
                    thread::sleep(MINIMIZED_SLEEP);
                    continue;
                }
            }

            if let Err(err) = self.draw() {
                abort_on_fatal(&err);
            }
        }

        log::info!("Leaving main loop after {} frame(s)", self.frames.frame_number());
    }

    /// Upload geometry through the immediate-submit path
    pub fn upload_mesh(&self, indices: &[u32], vertices: &[Vertex]) -> VulkanResult<GpuMeshBuffers> {
        upload_mesh(&self.context, &self.immediate, indices, vertices)
    }

    /// The scene drawn every frame
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    /// Configuration the engine was started with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn cycle_effect(&mut self) {
        self.current_effect = next_effect(self.current_effect, self.effects.len());
        if let Some(effect) = self.effects.get(self.current_effect) {
            log::info!("Background effect: {}", effect.name);
        }
    }

    fn resize_swapchain(&mut self) -> VulkanResult<()> {
        let extent = self.window.framebuffer_extent();
        if extent.width == 0 || extent.height == 0 {
            return Ok(());
        }

        self.context.wait_idle()?;
        if let Some(old) = self.swapchain.take() {
            old.destroy(self.context.raw());
        }
        self.swapchain = Some(Swapchain::new(&self.context, extent)?);
        self.resize_requested = false;

        log::debug!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn update_scene(&mut self, target: vk::Extent2D) {
        let extent = draw_extent(target, self.draw_target.extent);
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let angle = self.frames.frame_number() as f32 * 0.01;

        if let Some(root) = self.scene.node_mut(self.scene_root) {
            root.local_transform = Mat4::from_euler_angles(0.0, angle, 0.0);
        }
        self.scene.refresh_transforms(&Mat4::identity());

        self.draw_context.clear();
        self.scene.draw(&Mat4::identity(), &mut self.draw_context);

        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0));
        let proj = perspective_reversed_z(70f32.to_radians(), aspect, 0.1, 10_000.0);
        self.scene_data = GpuSceneData::from_camera(&view, &proj);
    }

    fn draw(&mut self) -> VulkanResult<()> {
        let timeout_ns = self.config.renderer.fence_timeout_ns;

        let slot = self.frames.begin_frame(&self.context)?;
        let cmd = slot.main_command_buffer;
        let swapchain_semaphore = slot.swapchain_semaphore;
        let render_semaphore = slot.render_semaphore;
        let render_fence = slot.render_fence;

        let swapchain = self.swapchain.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "no swapchain to draw into".to_string(),
        })?;
        let image_index = match swapchain.acquire_next_image(timeout_ns, swapchain_semaphore)? {
            AcquireOutcome::Image(index) => index,
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire; rebuilding next frame");
                self.frames.cancel_recording();
                self.resize_requested = true;
                return Ok(());
            }
        };
        let swapchain_image = swapchain.image(image_index);
        let swapchain_extent = swapchain.extent();

        self.frames.arm_fence(&self.context)?;
        self.update_scene(swapchain_extent);
        self.record_frame(cmd, swapchain_image, swapchain_extent)?;

        submit_commands(
            self.context.raw(),
            self.context.graphics_queue(),
            cmd,
            Some(semaphore_submit_info(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                swapchain_semaphore,
            )),
            Some(semaphore_submit_info(
                vk::PipelineStageFlags2::ALL_GRAPHICS,
                render_semaphore,
            )),
            render_fence,
        )?;
        self.frames.mark_submitted()?;

        let outcome = match self.swapchain.as_ref() {
            Some(swapchain) => {
                swapchain.present(self.context.graphics_queue(), image_index, render_semaphore)?
            }
            None => PresentOutcome::OutOfDate,
        };
        if outcome == PresentOutcome::OutOfDate {
            log::warn!("Swapchain out of date on present; rebuilding next frame");
            self.resize_requested = true;
        }
        Ok(())
    }

    fn record_frame(
        &mut self,
        cmd: vk::CommandBuffer,
        swapchain_image: vk::Image,
        swapchain_extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        let extent = draw_extent(swapchain_extent, self.draw_target.extent);
        let draw_image = self.draw_target.image;

        {
            let device = self.context.raw();
            begin_one_time(device, cmd)?;

            transition_image(device, cmd, draw_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
            self.record_background(device, cmd, extent);
            transition_image(
                device,
                cmd,
                draw_image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            );
            transition_image(
                device,
                cmd,
                self.depth_target.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            );
        }

        self.record_geometry(cmd, extent)?;

        let device = self.context.raw();
        transition_image(
            device,
            cmd,
            draw_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        transition_image(
            device,
            cmd,
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        copy_image_to_image(device, cmd, draw_image, swapchain_image, extent, swapchain_extent);
        transition_image(
            device,
            cmd,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        end_recording(device, cmd)
    }

    fn record_background(&self, device: &Device, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        if let Some(effect) = self.effects.get(self.current_effect) {
            effect.dispatch(device, cmd, self.draw_image_descriptors, extent);
            return;
        }

        let flash = clear_flash(self.frames.frame_number());
        let clear = vk::ClearColorValue {
            float32: [0.0, 0.0, flash, 1.0],
        };
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                self.draw_target.image,
                vk::ImageLayout::GENERAL,
                &clear,
                &[subresource_range(vk::ImageAspectFlags::COLOR)],
            );
        }
    }

    fn record_geometry(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> VulkanResult<()> {
        let context = &self.context;
        let device = context.raw();
        let slot = self.frames.current_mut();

        let scene_buffer = AllocatedBuffer::new(
            device,
            context.memory_properties(),
            std::mem::size_of::<GpuSceneData>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let written = scene_buffer.write(device, std::slice::from_ref(&self.scene_data));
        let (buffer, size) = (scene_buffer.buffer, scene_buffer.size);
        slot.deletion_queue.push(DeferredRelease::Buffer(scene_buffer));
        written?;

        let scene_set = slot.descriptors.allocate(context, self.scene_data_layout, None)?;
        DescriptorWriter::new()
            .write_buffer(0, buffer, size, 0, vk::DescriptorType::UNIFORM_BUFFER)
            .update_set(context, scene_set);

        let color_attachments = [vk::RenderingAttachmentInfo::builder()
            .image_view(self.draw_target.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)
            .build()];
        let depth_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(self.depth_target.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil: 0,
                },
            });
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.mesh_pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.mesh_layout,
                0,
                &[scene_set],
                &[],
            );

            for object in &self.draw_context.opaque_surfaces {
                let push = GpuDrawPushConstants::new(&object.transform, object.vertex_buffer_address);
                device.cmd_push_constants(
                    cmd,
                    self.mesh_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.cmd_bind_index_buffer(cmd, object.index_buffer, 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, object.index_count, 1, object.first_index, 0, 0);
            }

            device.cmd_end_rendering(cmd);
        }
        Ok(())
    }
}

impl Drop for VulkanEngine {
    fn drop(&mut self) {
        log::debug!("Shutting down engine");
        self.scene.release_into(&mut self.main_deletion_queue);
        if let Err(err) = shutdown(&self.context, &mut self.frames, &mut self.main_deletion_queue) {
            log::error!("Device did not go idle; leaking GPU resources at shutdown: {err}");
            return;
        }

        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(self.context.raw());
        }
        log::info!("Engine shut down");
    }
}

fn create_render_targets(
    context: &VulkanContext,
    window_extent: vk::Extent2D,
    queue: &mut DeletionQueue,
) -> VulkanResult<(RenderTarget, RenderTarget)> {
    let extent = vk::Extent3D {
        width: window_extent.width.max(1),
        height: window_extent.height.max(1),
        depth: 1,
    };

    let draw_image = AllocatedImage::new(
        context.raw(),
        context.memory_properties(),
        extent,
        DRAW_FORMAT,
        vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        vk::ImageAspectFlags::COLOR,
    )?;
    let draw_target = RenderTarget::register(draw_image, queue);

    let depth_image = AllocatedImage::new(
        context.raw(),
        context.memory_properties(),
        extent,
        DEPTH_FORMAT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::ImageAspectFlags::DEPTH,
    )?;
    let depth_target = RenderTarget::register(depth_image, queue);

    Ok((draw_target, depth_target))
}

fn create_mesh_layout(
    device: &Device,
    scene_data_layout: vk::DescriptorSetLayout,
) -> VulkanResult<vk::PipelineLayout> {
    let push_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: std::mem::size_of::<GpuDrawPushConstants>() as u32,
    };
    create_pipeline_layout(device, &[scene_data_layout], &[push_range])
}

fn create_mesh_pipeline(
    device: &Device,
    layout: vk::PipelineLayout,
    shaders: &ShaderConfig,
) -> VulkanResult<vk::Pipeline> {
    let vertex = load_shader_module(device, &shaders.mesh_vertex)?;
    let fragment = match load_shader_module(device, &shaders.mesh_fragment) {
        Ok(module) => module,
        Err(err) => {
            unsafe { device.destroy_shader_module(vertex, None) };
            return Err(err);
        }
    };

    let pipeline = GraphicsPipelineBuilder::new()
        .shaders(vertex, fragment)
        .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
        .depth_test(vk::CompareOp::GREATER_OR_EQUAL, true)
        .color_attachment_format(DRAW_FORMAT)
        .depth_format(DEPTH_FORMAT)
        .build(device, layout);

    unsafe {
        device.destroy_shader_module(vertex, None);
        device.destroy_shader_module(fragment, None);
    }
    pipeline
}

fn build_default_scene(
    context: &VulkanContext,
    immediate: &ImmediateSubmit,
    scene: &mut SceneGraph,
) -> Result<NodeKey, EngineError> {
    let mut upload = |name: &str, data: MeshData| -> VulkanResult<_> {
        let mesh_buffers = upload_mesh(context, immediate, &data.indices, &data.vertices)?;
        Ok(scene.add_mesh(MeshAsset {
            name: name.to_string(),
            surfaces: vec![data.whole_surface()],
            mesh_buffers,
        }))
    };
    let rectangle = upload("rectangle", MeshData::rectangle())?;
    let cube = upload("cube", MeshData::cube())?;

    let root = scene.add_node("root", NodeKind::Empty, Mat4::identity(), None)?;
    for (i, x) in [-2.0, 0.0, 2.0].into_iter().enumerate() {
        let transform = Transform::from_position_scale(Vec3::new(x, 0.0, 0.0), 0.8);
        scene.add_node(format!("cube{i}"), NodeKind::Mesh(cube), transform.to_matrix(), Some(root))?;
    }
    let backdrop = Transform::from_position_scale(Vec3::new(0.0, 0.0, -2.0), 4.0);
    scene.add_node("backdrop", NodeKind::Mesh(rectangle), backdrop.to_matrix(), Some(root))?;

    Ok(root)
}
