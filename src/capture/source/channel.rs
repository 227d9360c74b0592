use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CaptureSource, DisplayInfo, SourceError};
use crate::image::Frame;

/// Frames pushed by an embedding application
#[derive(Debug)]
pub struct ChannelSource {
    info: DisplayInfo,
    rx: mpsc::Receiver<Frame>,
    started: bool,
}

/// Sending half of a [ChannelSource]
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    sequence: Arc<AtomicU64>,
}

impl ChannelSource {
    pub fn new(info: DisplayInfo) -> (Self, FrameSender) {
        // Single slot: the pipeline never has more than one frame waiting
        let (tx, rx) = mpsc::channel(1);

        (
            Self {
                info,
                rx,
                started: false,
            },
            FrameSender {
                tx,
                sequence: Arc::new(AtomicU64::new(0)),
            },
        )
    }
}

impl FrameSender {
    fn sequenced(&self, frame: Frame) -> Frame {
        frame.with_sequence(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Offer a frame without waiting
    ///
    /// Returns `false` if the frame was dropped because the pipeline is busy or gone.
    pub fn try_push(&self, frame: Frame) -> bool {
        match self.tx.try_send(self.sequenced(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("pipeline busy, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Wait until the pipeline can take a frame
    ///
    /// Returns `false` if the source was dropped.
    pub async fn push(&self, frame: Frame) -> bool {
        self.tx.send(self.sequenced(frame)).await.is_ok()
    }
}

#[async_trait]
impl CaptureSource for ChannelSource {
    fn display(&self) -> &DisplayInfo {
        &self.info
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        self.started = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.started {
            return Ok(None);
        }

        Ok(self.rx.recv().await)
    }

    async fn stop(&mut self) {
        self.started = false;
    }
}
