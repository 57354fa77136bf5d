//! Window management using GLFW
//!
//! Provides the single Vulkan-capable window the renderer presents into and
//! translates GLFW events into the few signals the frame loop cares about.

use ash::vk;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Events the frame loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// The user asked to close the window
    Quit,
    /// The window was minimized; rendering should pause
    Minimized,
    /// The window was restored; rendering may resume
    Restored,
    /// The framebuffer changed size
    Resized,
    /// The user asked for the next background effect
    NextEffect,
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window without a client API
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|_| WindowError::InitializationFailed)?;

        // Configure for Vulkan (no OpenGL context)
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_iconify_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// Whether a close has been requested
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Poll GLFW and collect the signals raised since the last call
    pub fn poll_signals(&mut self) -> Vec<WindowSignal> {
        self.glfw.poll_events();

        let mut signals = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            let signal = match event {
                glfw::WindowEvent::Close => Some(WindowSignal::Quit),
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                    Some(WindowSignal::Quit)
                }
                glfw::WindowEvent::Key(glfw::Key::Space, _, glfw::Action::Press, _) => {
                    Some(WindowSignal::NextEffect)
                }
                glfw::WindowEvent::Iconify(true) => Some(WindowSignal::Minimized),
                glfw::WindowEvent::Iconify(false) => Some(WindowSignal::Restored),
                glfw::WindowEvent::FramebufferSize(_, _) => Some(WindowSignal::Resized),
                _ => None,
            };
            signals.extend(signal);
        }
        signals
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.get_framebuffer_size();
        vk::Extent2D {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }
}
