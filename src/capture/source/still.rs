use std::path::Path;

use async_trait::async_trait;

use super::{source_interval, CaptureSource, DisplayInfo, SourceError};
use crate::image::{Frame, PixelFormat};

/// Replays a single image at a fixed rate
#[derive(Debug)]
pub struct StillSource {
    info: DisplayInfo,
    frame: Frame,
    interval: std::time::Duration,
    ticker: Option<tokio::time::Interval>,
    sequence: u64,
}

impl StillSource {
    pub fn new(path: &Path, fps: u32) -> Result<Self, SourceError> {
        let image = ::image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();

        Ok(Self::from_frame(
            path.display().to_string(),
            Frame::new(image.into_raw(), width, height, PixelFormat::Rgba8)?,
            fps,
        ))
    }

    pub fn from_frame(name: String, frame: Frame, fps: u32) -> Self {
        Self {
            info: DisplayInfo {
                name,
                width: frame.width(),
                height: frame.height(),
            },
            frame,
            interval: source_interval(fps),
            ticker: None,
            sequence: 0,
        }
    }
}

#[async_trait]
impl CaptureSource for StillSource {
    fn display(&self) -> &DisplayInfo {
        &self.info
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let ticker = match self.ticker.as_mut() {
            Some(ticker) => ticker,
            None => return Ok(None),
        };

        ticker.tick().await;
        self.sequence += 1;

        Ok(Some(self.frame.clone().with_sequence(self.sequence)))
    }

    async fn stop(&mut self) {
        self.ticker = None;
    }
}
