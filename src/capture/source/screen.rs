use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use xcap::Monitor;

use super::{source_interval, CaptureSource, DisplayInfo, SourceError};
use crate::image::{Frame, PixelFormat};

type FrameMessage = Result<Frame, SourceError>;

/// Desktop capture of one monitor
///
/// Frames are grabbed on a dedicated thread. The handoff channel holds a single frame: while
/// the pipeline is busy, newer frames are dropped so the capture thread never waits.
pub struct ScreenSource {
    index: usize,
    info: DisplayInfo,
    interval: Duration,
    running: Arc<AtomicBool>,
    rx: Option<mpsc::Receiver<FrameMessage>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScreenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenSource")
            .field("index", &self.index)
            .field("info", &self.info)
            .finish()
    }
}

impl ScreenSource {
    pub fn new(index: usize, fps: u32) -> Result<Self, SourceError> {
        let monitor = Self::monitor(index)?;

        let info = DisplayInfo {
            name: monitor.name().unwrap_or_else(|_| format!("display {}", index)),
            width: monitor.width()?,
            height: monitor.height()?,
        };

        Ok(Self {
            index,
            info,
            interval: source_interval(fps),
            running: Arc::new(AtomicBool::new(false)),
            rx: None,
            thread: None,
        })
    }

    fn monitor(index: usize) -> Result<Monitor, SourceError> {
        Monitor::all()?
            .into_iter()
            .nth(index)
            .ok_or(SourceError::NoDisplay(index))
    }

    fn capture_loop(index: usize, interval: Duration, running: Arc<AtomicBool>, tx: mpsc::Sender<FrameMessage>) {
        // Monitor handles stay on the capture thread
        let monitor = match Self::monitor(index) {
            Ok(monitor) => monitor,
            Err(error) => {
                let _ = tx.blocking_send(Err(error));
                return;
            }
        };

        let mut sequence = 0u64;
        let mut next = Instant::now();

        while running.load(Ordering::Relaxed) {
            let image = match monitor.capture_image() {
                Ok(image) => image,
                Err(error) => {
                    let _ = tx.blocking_send(Err(error.into()));
                    break;
                }
            };

            let (width, height) = image.dimensions();
            sequence += 1;

            let message = Frame::new(image.into_raw(), width, height, PixelFormat::Rgba8)
                .map(|frame| frame.with_sequence(sequence))
                .map_err(SourceError::from);

            match tx.try_send(message) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(sequence, "pipeline busy, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }

            next += interval;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                next = now;
            }
        }

        debug!(index, "capture thread exiting");
    }
}

#[async_trait]
impl CaptureSource for ScreenSource {
    fn display(&self) -> &DisplayInfo {
        &self.info
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(1);
        self.running.store(true, Ordering::Relaxed);

        let index = self.index;
        let interval = self.interval;
        let running = self.running.clone();

        self.thread = Some(
            std::thread::Builder::new()
                .name(format!("edgelight-capture-{}", index))
                .spawn(move || Self::capture_loop(index, interval, running, tx))?,
        );
        self.rx = Some(rx);

        info!(display = %self.info, "started screen capture");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => return Ok(None),
        };

        match rx.recv().await {
            Some(message) => message.map(Some),
            None if self.running.load(Ordering::Relaxed) => Err(SourceError::Disconnected),
            None => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        // Unblocks a pending send on the capture thread
        self.rx = None;

        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                _ => warn!(display = %self.info, "capture thread panicked"),
            }
        }

        info!(display = %self.info, "stopped screen capture");
    }
}
