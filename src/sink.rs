use async_trait::async_trait;
use thiserror::Error;

use crate::{
    capture::CaptureResult,
    models::{self, Color, SinkConfig},
};

// Sink implementation modules

mod dummy;
mod file;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(#[from] std::fmt::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Colors a consumer should display for a result
///
/// Zone colors when there are any, otherwise the predominant color alone.
pub fn output_colors(result: &CaptureResult) -> &[Color] {
    if result.zone_colors.is_empty() {
        std::slice::from_ref(&result.predominant)
    } else {
        &result.zone_colors
    }
}

#[async_trait]
trait SinkImpl: Send {
    /// Output the colors of a processed frame
    async fn write(&mut self, result: &CaptureResult) -> Result<(), SinkError>;
}

/// Consumer of capture results
pub struct Sink {
    kind: &'static str,
    inner: Box<dyn SinkImpl>,
    color_count: Option<usize>,
}

impl Sink {
    fn build_inner(config: SinkConfig) -> Result<Box<dyn SinkImpl>, SinkError> {
        let inner: Box<dyn SinkImpl> = match config {
            models::SinkConfig::Dummy { mode } => Box::new(dummy::DummySink::new(mode)),
            models::SinkConfig::File {
                output,
                print_timestamp,
            } => Box::new(file::FileSink::new(&output, print_timestamp)?),
        };

        Ok(inner)
    }

    #[instrument(skip(config))]
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        let kind: &'static str = (&config).into();
        let inner = Self::build_inner(config)?;

        Ok(Self {
            kind,
            inner,
            color_count: None,
        })
    }

    #[instrument(skip(result))]
    pub async fn write_result(&mut self, result: &CaptureResult) -> Result<(), SinkError> {
        let count = output_colors(result).len();

        if self.color_count != Some(count) {
            debug!(
                colors = %count,
                zones = %result.zone_colors.len(),
                "sink color count changed"
            );
            self.color_count = Some(count);
        }

        self.inner.write(result).await
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::opaque;

    #[test]
    fn zone_colors_take_precedence() {
        let result = CaptureResult {
            predominant: opaque(1, 1, 1),
            zone_colors: vec![opaque(2, 2, 2), opaque(3, 3, 3)],
        };
        assert_eq!(output_colors(&result), &[opaque(2, 2, 2), opaque(3, 3, 3)]);

        let result = CaptureResult {
            predominant: opaque(1, 1, 1),
            zone_colors: vec![],
        };
        assert_eq!(output_colors(&result), &[opaque(1, 1, 1)]);
    }

    #[tokio::test]
    async fn dummy_sink_modes() {
        let result = CaptureResult {
            predominant: opaque(10, 20, 30),
            zone_colors: vec![opaque(255, 0, 0); 3],
        };

        for mode in [models::DummySinkMode::Text, models::DummySinkMode::Ansi] {
            let mut sink = Sink::new(SinkConfig::Dummy { mode }).unwrap();
            sink.write_result(&result).await.unwrap();
        }
    }
}
