use async_trait::async_trait;

use super::{BackendError, ComputeBackend};
use crate::image::{Frame, Histogram};

/// Runs the reduction pass on the CPU
///
/// Used when no compute-capable adapter is available, and in tests.
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    size: Option<(u32, u32)>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_size(&mut self, frame: &Frame) -> Result<(), BackendError> {
        let size = (frame.width(), frame.height());
        if self.size != Some(size) {
            self.prepare(size.0, size.1)?;
        }

        Ok(())
    }
}

#[async_trait]
impl ComputeBackend for SoftwareBackend {
    fn prepare(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        debug!(width, height, "preparing software backend");
        self.size = Some((width, height));
        Ok(())
    }

    async fn reduce(&mut self, frame: &Frame) -> Result<Histogram, BackendError> {
        self.check_size(frame)?;
        Ok(Histogram::from_frame(frame))
    }

    async fn stage(&mut self, frame: &Frame) -> Result<Frame, BackendError> {
        self.check_size(frame)?;
        Ok(frame.clone())
    }

    fn is_lost(&self) -> bool {
        false
    }

    fn release(&mut self) {
        self.size = None;
    }
}
