//! Error types for physarum.
//!
//! All setup failures are fatal: there is no fallback rendering path, so
//! errors carry the full diagnostic text and propagate up to the run loop,
//! which prints them and exits with a failure status.

use std::fmt;

use crate::shader::StageKind;

/// Errors that can occur while acquiring or using the GPU device.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map a buffer for readback.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors from compiling, linking or parameterizing shader stages.
///
/// Compile and validation failures carry the complete diagnostic log; the
/// `Display` impl emits it verbatim, never truncated.
#[derive(Debug)]
pub enum ShaderError {
    /// WGSL parsing failed. `log` is the full front-end diagnostic.
    Parse { label: String, log: String },
    /// The module parsed but failed validation. `log` is the full report.
    Validation { label: String, log: String },
    /// The source has no entry point for the declared stage kind.
    MissingEntryPoint { label: String, kind: StageKind },
    /// A pipeline was used for a role its attached stages cannot fill.
    MissingStage(StageKind),
    /// A pipeline was dispatched or drawn before being linked.
    NotLinked(String),
    /// `set_parameter` on a name the stage does not declare (strict mode only).
    UnknownParameter { stage: String, name: String },
    /// `set_parameter` with a value whose size does not match the declared
    /// member (strict mode only).
    ParameterSizeMismatch {
        stage: String,
        name: String,
        expected: u32,
        got: u32,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::Parse { label, log } => {
                write!(f, "Could not compile shader '{}':\n{}", label, log)
            }
            ShaderError::Validation { label, log } => {
                write!(f, "Shader '{}' failed validation:\n{}", label, log)
            }
            ShaderError::MissingEntryPoint { label, kind } => {
                write!(f, "Shader '{}' has no {} entry point", label, kind)
            }
            ShaderError::MissingStage(kind) => {
                write!(f, "Pipeline is missing a {} stage", kind)
            }
            ShaderError::NotLinked(label) => {
                write!(f, "Pipeline '{}' was used before linking", label)
            }
            ShaderError::UnknownParameter { stage, name } => {
                write!(f, "Stage '{}' has no parameter named '{}'", stage, name)
            }
            ShaderError::ParameterSizeMismatch {
                stage,
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Stage '{}' parameter '{}' expects {} bytes, got {}",
                    stage, name, expected, got
                )
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// Errors that can occur when running the simulation window.
#[derive(Debug)]
pub enum RunError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// GPU initialization failed.
    Gpu(GpuError),
    /// Shader compilation or pipeline setup failed.
    Shader(ShaderError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            RunError::Window(e) => write!(f, "Failed to create window: {}", e),
            RunError::Gpu(e) => write!(f, "GPU error: {}", e),
            RunError::Shader(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::EventLoop(e) => Some(e),
            RunError::Window(e) => Some(e),
            RunError::Gpu(e) => Some(e),
            RunError::Shader(e) => Some(e),
        }
    }
}

impl From<winit::error::EventLoopError> for RunError {
    fn from(e: winit::error::EventLoopError) -> Self {
        RunError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for RunError {
    fn from(e: winit::error::OsError) -> Self {
        RunError::Window(e)
    }
}

impl From<GpuError> for RunError {
    fn from(e: GpuError) -> Self {
        RunError::Gpu(e)
    }
}

impl From<ShaderError> for RunError {
    fn from(e: ShaderError) -> Self {
        RunError::Shader(e)
    }
}
