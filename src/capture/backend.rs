use async_trait::async_trait;
use thiserror::Error;

use crate::image::{Frame, FrameError, Histogram, HistogramError};

mod gpu;
pub use gpu::*;

mod software;
pub use software::*;

/// Threads per workgroup along each axis of the reduction shader
pub const WORKGROUP_SIZE: u32 = 16;

/// Storage and uniform buffer sizes are rounded to this many bytes
pub const BUFFER_ALIGNMENT: u64 = 16;

/// Required alignment of rows in a texture to buffer copy
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no graphics adapter available: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("graphics adapter does not support compute shaders")]
    NoCompute,
    #[error("failed to open graphics device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("failed to wait for the graphics device: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("failed to map buffer: {0}")]
    Map(String),
    #[error("graphics validation error: {0}")]
    Validation(String),
    #[error("graphics device lost")]
    DeviceLost,
    #[error("resources not prepared for {width}x{height} frames")]
    NotPrepared { width: u32, height: u32 },
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("invalid reduction output: {0}")]
    Histogram(#[from] HistogramError),
}

impl BackendError {
    /// Fatal errors invalidate the backend: capture must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::Poll(_))
    }
}

/// Device-side half of the capture pipeline
#[async_trait]
pub trait ComputeBackend: Send {
    /// Allocate the resources needed for frames of the given size
    fn prepare(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    /// Run the reduction pass over a frame
    async fn reduce(&mut self, frame: &Frame) -> Result<Histogram, BackendError>;

    /// Produce a CPU-readable copy of a frame, with the same format and size
    async fn stage(&mut self, frame: &Frame) -> Result<Frame, BackendError>;

    /// `true` once the underlying device has been lost
    fn is_lost(&self) -> bool;

    /// Release every device-side resource. The backend must be prepared again before use.
    fn release(&mut self);
}

/// Round a buffer size up to the next multiple of [BUFFER_ALIGNMENT]
pub fn padded_buffer_size(bytes: u64) -> u64 {
    ((bytes + BUFFER_ALIGNMENT - 1) / BUFFER_ALIGNMENT).max(1) * BUFFER_ALIGNMENT
}

/// Number of workgroups needed to cover `extent` invocations
pub fn dispatch_size(extent: u32, group: u32) -> u32 {
    (extent + group - 1) / group
}

/// Length in bytes of one 32-bit pixel row in a readback buffer
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * crate::image::PixelFormat::BYTES_PER_PIXEL;
    let align = COPY_BYTES_PER_ROW_ALIGNMENT;
    (unpadded + align - 1) / align * align
}
