use std::fmt::Write;

use async_trait::async_trait;

use super::{output_colors, SinkError, SinkImpl};
use crate::{capture::CaptureResult, models};

pub struct DummySink {
    mode: models::DummySinkMode,
    ansi_buf: String,
}

impl DummySink {
    pub fn new(mode: models::DummySinkMode) -> Self {
        Self {
            mode,
            ansi_buf: String::new(),
        }
    }
}

#[async_trait]
impl SinkImpl for DummySink {
    async fn write(&mut self, result: &CaptureResult) -> Result<(), SinkError> {
        // Write to log when we get new data
        match self.mode {
            models::DummySinkMode::Text => {
                for (i, color) in output_colors(result).iter().enumerate() {
                    info!(
                        zone = %format_args!("{:3}", i),
                        red = %format_args!("{:3}", color.red),
                        green = %format_args!("{:3}", color.green),
                        blue = %format_args!("{:3}", color.blue),
                    );
                }
            }

            models::DummySinkMode::Ansi => {
                // Build a truecolor ANSI sequence for all zones
                self.ansi_buf.clear();

                for color in output_colors(result) {
                    write!(
                        &mut self.ansi_buf,
                        "\x1B[38;2;{red};{green};{blue}m█",
                        red = color.red,
                        green = color.green,
                        blue = color.blue
                    )?;
                }

                // Reset
                write!(&mut self.ansi_buf, "\x1B[0m")?;

                info!("{}", &self.ansi_buf);
            }
        }

        Ok(())
    }
}
