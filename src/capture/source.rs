use async_trait::async_trait;
use parse_display::Display;
use thiserror::Error;

use crate::{
    image::{Frame, FrameError},
    models::SourceConfig,
};

mod channel;
pub use channel::*;

mod screen;
pub use screen::*;

mod still;
pub use still::*;

/// Capture target selected for a source
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{name} ({width}x{height})")]
pub struct DisplayInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no display at index {0}")]
    NoDisplay(usize),
    #[error("screen capture error: {0}")]
    Capture(#[from] xcap::XCapError),
    #[error("failed to load image: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture thread exited unexpectedly")]
    Disconnected,
}

/// Producer of frames for the capture pipeline
#[async_trait]
pub trait CaptureSource: Send {
    /// The display this source captures
    fn display(&self) -> &DisplayInfo;

    async fn start(&mut self) -> Result<(), SourceError>;

    /// Wait for the next frame
    ///
    /// Frames the pipeline was too busy to receive are dropped by the source, never queued.
    /// Returns `Ok(None)` once the source has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    async fn stop(&mut self);
}

#[instrument(skip(config))]
pub fn from_config(config: &SourceConfig) -> Result<Box<dyn CaptureSource>, SourceError> {
    let source: Box<dyn CaptureSource> = match config {
        SourceConfig::Screen { display, fps } => Box::new(ScreenSource::new(*display, *fps)?),
        SourceConfig::Still { path, fps } => Box::new(StillSource::new(path, *fps)?),
    };

    info!(
        kind = %<&'static str>::from(config),
        display = %source.display(),
        "opened capture source"
    );

    Ok(source)
}

/// Time between two frames at the given rate
fn source_interval(fps: u32) -> std::time::Duration {
    std::time::Duration::from_secs(1) / fps.max(1)
}
