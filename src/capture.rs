use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use thiserror::Error;
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use validator::Validate;

use crate::{
    image::{ColorAlgorithm, Frame, ZoneColorExtractor},
    models::{Color, ZoneConfiguration, ZoneLayout},
};

mod backend;
pub use backend::*;

mod events;
pub use events::*;

mod smoothing;
pub use smoothing::*;

pub mod source;
pub use source::{CaptureSource, ChannelSource, DisplayInfo, FrameSender, SourceError};

mod throttle;
pub use throttle::*;

/// Frame counters since the manager was created
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames that went through the pipeline
    pub accepted: u64,
    /// Frames discarded by the throttle
    pub dropped: u64,
}

/// State shared between the manager and its handles
#[derive(Debug, Default)]
struct Shared {
    supported: AtomicBool,
    stop_requested: AtomicBool,
    /// Set while [CaptureManager::run] is looping
    running: AtomicBool,
    subscribers: Subscribers,
}

#[derive(Debug)]
enum CaptureMessage {
    SetZoneConfiguration(ZoneConfiguration, oneshot::Sender<Result<(), validator::ValidationErrors>>),
    SetZoneCapture(bool, oneshot::Sender<()>),
    Stats(oneshot::Sender<CaptureStats>),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CaptureControl {
    Continue,
    Break,
}

/// Owns the capture session and the compute device, and runs one pipeline tick per accepted
/// frame
pub struct CaptureManager {
    source: Option<Box<dyn CaptureSource>>,
    backend: Option<Box<dyn ComputeBackend>>,
    display: Option<DisplayInfo>,
    shared: Arc<Shared>,
    handle_rx: mpsc::Receiver<CaptureMessage>,
    zone_config: ZoneConfiguration,
    use_zone_capture: bool,
    layout: ZoneLayout,
    extractor: ZoneColorExtractor,
    smoother: ZoneColorSmoother,
    algorithm: ColorAlgorithm,
    throttle: FrameThrottle,
    stats: CaptureStats,
    capturing: bool,
}

impl CaptureManager {
    /// Set up the pipeline for the given source and backend
    ///
    /// Never fails: if the source or the backend is unavailable, or if device resources cannot
    /// be allocated, the manager is created with capture unsupported.
    pub fn initialize(
        zone_config: ZoneConfiguration,
        zone_capture: bool,
        source: Result<Box<dyn CaptureSource>, SourceError>,
        backend: Result<Box<dyn ComputeBackend>, BackendError>,
    ) -> (Self, CaptureHandle) {
        let shared = Arc::new(Shared::default());
        let (tx, handle_rx) = mpsc::channel(4);

        let source = match source {
            Ok(source) => Some(source),
            Err(error) => {
                error!(error = %error, "capture source unavailable");
                None
            }
        };

        let backend = match backend {
            Ok(backend) => Some(backend),
            Err(error) => {
                error!(error = %error, "compute backend unavailable");
                None
            }
        };
        let display = source.as_ref().map(|source| source.display().clone());

        let mut this = Self {
            source,
            backend: None,
            display,
            shared: shared.clone(),
            handle_rx,
            layout: ZoneLayout::new(&zone_config),
            smoother: ZoneColorSmoother::new(zone_config.total_zone_count() as usize),
            throttle: FrameThrottle::new(zone_config.frame_interval()),
            zone_config,
            use_zone_capture: zone_capture,
            extractor: ZoneColorExtractor::new(),
            algorithm: ColorAlgorithm,
            stats: CaptureStats::default(),
            capturing: false,
        };

        if let (Some(display_info), Some(mut backend)) = (this.display.as_ref(), backend) {
            match backend.prepare(display_info.width, display_info.height) {
                Ok(()) => {
                    info!(display = %display_info, zones = %this.layout.zone_count(), "capture initialized");
                    this.backend = Some(backend);
                    shared.supported.store(true, Ordering::SeqCst);
                }
                Err(error) => {
                    error!(display = %display_info, error = %error, "allocating capture resources failed");
                    backend.release();
                }
            }
        }

        (this, CaptureHandle { tx, shared })
    }

    pub fn is_capture_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn display(&self) -> Option<&DisplayInfo> {
        self.display.as_ref()
    }

    pub fn zone_layout(&self) -> &ZoneLayout {
        &self.layout
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Begin the capture session
    ///
    /// Does nothing if capture is unsupported: check [Self::is_capture_supported].
    pub async fn start_capture(&mut self) {
        if !self.is_capture_supported() {
            warn!("capture not supported, not starting");
            return;
        }

        if self.capturing {
            return;
        }

        let result = match self.source.as_mut() {
            Some(source) => source.start().await,
            None => return,
        };

        match result {
            Ok(()) => {
                self.shared.stop_requested.store(false, Ordering::SeqCst);
                self.throttle.reset();
                self.capturing = true;
            }
            Err(error) => self.disable(&error),
        }
    }

    /// End the capture session, the manager stays usable
    pub async fn stop_capture(&mut self) {
        if !self.capturing {
            return;
        }

        if let Some(source) = self.source.as_mut() {
            source.stop().await;
        }

        self.capturing = false;
        info!("capture stopped");
    }

    /// Replace the zone configuration
    ///
    /// Zones are regenerated, smoothing restarts and the throttle follows the new frame rate.
    pub fn set_zone_configuration(&mut self, config: ZoneConfiguration) -> Result<(), validator::ValidationErrors> {
        config.validate()?;

        self.layout.generate_zones(&config);
        self.smoother.initialize(self.layout.zone_count());
        self.throttle.set_interval(config.frame_interval());

        debug!(
            zones = %self.layout.zone_count(),
            fps = %config.target_fps,
            "updated zone configuration"
        );

        self.zone_config = config;
        Ok(())
    }

    pub fn set_zone_capture(&mut self, enabled: bool) {
        if enabled && !self.use_zone_capture {
            self.smoother.initialize(self.layout.zone_count());
        }

        self.use_zone_capture = enabled;
    }

    /// Called for every frame the source delivers
    ///
    /// Frames are ignored unless capture is running. Frames arriving before the next tick is
    /// due are dropped. Otherwise the frame goes through the pipeline and the result is
    /// returned once subscribers have been notified.
    pub async fn on_frame_arrived(&mut self, frame: Frame, now: Instant) -> Option<Arc<CaptureResult>> {
        if !self.capturing || self.backend.is_none() {
            trace!(sequence = %frame.sequence(), "not capturing, ignoring frame");
            return None;
        }

        if !self.throttle.accept(now) {
            self.stats.dropped += 1;
            trace!(sequence = %frame.sequence(), "throttled frame");
            return None;
        }

        self.stats.accepted += 1;
        self.process_frame(&frame).await
    }

    async fn process_frame(&mut self, frame: &Frame) -> Option<Arc<CaptureResult>> {
        let histogram = match self.backend.as_mut() {
            Some(backend) => backend.reduce(frame).await,
            None => return None,
        };

        let predominant = match histogram {
            Ok(histogram) => self.algorithm.predominant_color(&histogram),
            Err(error) if error.is_fatal() => {
                self.fail(error).await;
                return None;
            }
            Err(error) => {
                warn!(error = %error, "frame reduction failed, skipping frame");
                return None;
            }
        };

        let zone_colors = if self.use_zone_capture {
            self.zone_colors(frame).await
        } else {
            Vec::new()
        };

        if self.backend.as_ref().map(|backend| backend.is_lost()).unwrap_or(false) {
            self.fail(BackendError::DeviceLost).await;
            return None;
        }

        let result = Arc::new(CaptureResult {
            predominant,
            zone_colors,
        });

        if self.shared.stop_requested.load(Ordering::SeqCst) {
            debug!(sequence = %frame.sequence(), "capture stopping, result not dispatched");
        } else {
            self.shared.subscribers.dispatch(&result);
        }

        Some(result)
    }

    async fn zone_colors(&mut self, frame: &Frame) -> Vec<Color> {
        let backend = match self.backend.as_mut() {
            Some(backend) => backend,
            None => return Vec::new(),
        };

        let colors = self
            .extractor
            .extract_zone_colors(
                &mut **backend,
                frame,
                self.layout.zones(),
                frame.width(),
                frame.height(),
            )
            .await;

        if colors.is_empty() {
            // Extraction unavailable this tick
            return colors;
        }

        self.smoother.smooth_colors(
            &colors,
            self.zone_config.smoothing_alpha,
            self.zone_config.smoothing_enabled,
        )
    }

    /// Capability loss: capture stays unsupported for the lifetime of this manager
    fn disable(&mut self, reason: &dyn std::fmt::Display) {
        error!(reason = %reason, "capture failed, disabling capture");

        self.shared.supported.store(false, Ordering::SeqCst);

        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
    }

    async fn fail(&mut self, error: BackendError) {
        self.disable(&error);
        self.stop_capture().await;
    }

    async fn handle_message(&mut self, message: CaptureMessage) -> CaptureControl {
        // ok: the manager shouldn't care if the receiver dropped

        match message {
            CaptureMessage::SetZoneConfiguration(config, tx) => {
                tx.send(self.set_zone_configuration(config)).ok();
            }
            CaptureMessage::SetZoneCapture(enabled, tx) => {
                self.set_zone_capture(enabled);
                tx.send(()).ok();
            }
            CaptureMessage::Stats(tx) => {
                tx.send(self.stats).ok();
            }
            CaptureMessage::Stop(tx) => {
                self.stop_capture().await;
                tx.send(()).ok();
                return CaptureControl::Break;
            }
        }

        CaptureControl::Continue
    }

    /// Start capturing and process frames until capture stops
    ///
    /// Capture stops when requested through a [CaptureHandle], when every handle is dropped,
    /// when the source ends, or when the pipeline fails.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        self.start_capture().await;

        while self.capturing {
            select! {
                event = next_frame(&mut self.source) => {
                    match event {
                        SourceEvent::Frame(frame) => {
                            self.on_frame_arrived(frame, Instant::now()).await;
                        },
                        SourceEvent::Ended => {
                            info!("capture source ended");
                            self.stop_capture().await;
                        },
                        SourceEvent::Failed(reason) => {
                            self.disable(&reason);
                            self.stop_capture().await;
                        },
                    }
                },
                message = self.handle_rx.recv() => {
                    trace!(message = ?message, "handle_rx msg");

                    if let Some(message) = message {
                        if CaptureControl::Break == self.handle_message(message).await {
                            break;
                        }
                    } else {
                        self.stop_capture().await;
                    }
                }
            }
        }

        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }

        self.shared.running.store(false, Ordering::SeqCst);
        debug!(stats = ?self.stats, "capture loop exited");
    }
}

enum SourceEvent {
    Frame(Frame),
    Ended,
    Failed(String),
}

async fn next_frame(source: &mut Option<Box<dyn CaptureSource>>) -> SourceEvent {
    let source = match source {
        Some(source) => source,
        None => return futures::future::pending().await,
    };

    match source.next_frame().await {
        Ok(Some(frame)) => SourceEvent::Frame(frame),
        Ok(None) => SourceEvent::Ended,
        Err(error) => SourceEvent::Failed(error.to_string()),
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("display", &self.display)
            .field("supported", &self.is_capture_supported())
            .field("capturing", &self.capturing)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CaptureHandleError {
    #[error("the capture manager is no longer running")]
    Dropped,
    #[error("invalid zone configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl<T> From<mpsc::error::SendError<T>> for CaptureHandleError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Dropped
    }
}

impl From<oneshot::error::RecvError> for CaptureHandleError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Dropped
    }
}

/// Control and subscription handle to a [CaptureManager]
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<CaptureMessage>,
    shared: Arc<Shared>,
}

impl CaptureHandle {
    pub fn is_capture_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    /// Register a callback for every processed frame
    ///
    /// Callbacks run on the capture task, in registration order, and must not block.
    pub fn subscribe(&self, callback: impl Fn(&Arc<CaptureResult>) + Send + Sync + 'static) -> SubscriptionId {
        self.shared.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    pub async fn set_zone_configuration(&self, config: ZoneConfiguration) -> Result<(), CaptureHandleError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CaptureMessage::SetZoneConfiguration(config, tx)).await?;
        Ok(rx.await??)
    }

    pub async fn set_zone_capture(&self, enabled: bool) -> Result<(), CaptureHandleError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CaptureMessage::SetZoneCapture(enabled, tx)).await?;
        Ok(rx.await?)
    }

    pub async fn stats(&self) -> Result<CaptureStats, CaptureHandleError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CaptureMessage::Stats(tx)).await?;
        Ok(rx.await?)
    }

    /// Wait until the capture loop has exited
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Stop capturing
    ///
    /// Safe to call during a tick: the tick completes but its result is not dispatched. Returns
    /// once the capture loop has exited. If the manager is driven without
    /// [CaptureManager::run], results stop being dispatched and this returns immediately.
    pub async fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        if !self.shared.running.load(Ordering::SeqCst) {
            // Picked up if the loop starts later
            self.tx.try_send(CaptureMessage::Stop(tx)).ok();
            return;
        }

        if self.tx.send(CaptureMessage::Stop(tx)).await.is_ok() {
            rx.await.ok();
        }
    }
}
