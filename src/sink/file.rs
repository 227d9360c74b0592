use std::{path::Path, time};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use tokio::{fs::File, io::AsyncWriteExt};

use super::{SinkError, SinkImpl};
use crate::{capture::CaptureResult, color};

/// One line of output
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u64>,
    predominant: [u8; 3],
    zone_count: usize,
    /// Zone colors as consecutive red, green, blue bytes
    zones: Vec<u8>,
}

/// Appends results to a file as JSON lines
pub struct FileSink {
    print_timestamp: bool,
    file_handle: File,
    last_write_time: time::Instant,
    buf: Vec<u8>,
}

impl FileSink {
    pub fn new(output: &Path, print_timestamp: bool) -> Result<Self, SinkError> {
        let file_handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(output)?;

        Ok(Self {
            print_timestamp,
            file_handle: File::from_std(file_handle),
            last_write_time: time::Instant::now(),
            buf: Vec::new(),
        })
    }
}

#[async_trait]
impl SinkImpl for FileSink {
    async fn write(&mut self, result: &CaptureResult) -> Result<(), SinkError> {
        let (timestamp, elapsed_ms) = if self.print_timestamp {
            let elapsed = self.last_write_time.elapsed().as_millis() as u64;
            self.last_write_time = time::Instant::now();
            (Some(Utc::now()), Some(elapsed))
        } else {
            (None, None)
        };

        let predominant = result.predominant;
        let record = Record {
            timestamp,
            elapsed_ms,
            predominant: [predominant.red, predominant.green, predominant.blue],
            zone_count: result.zone_colors.len(),
            zones: color::to_flat_rgb(&result.zone_colors),
        };

        self.buf.clear();
        serde_json::to_writer(&mut self.buf, &record)?;
        self.buf.push(b'\n');

        self.file_handle.write_all(&self.buf).await?;
        self.file_handle.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::opaque;

    #[tokio::test]
    async fn appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colors.jsonl");

        let mut sink = FileSink::new(&path, false).unwrap();
        sink.write(&CaptureResult {
            predominant: opaque(1, 2, 3),
            zone_colors: vec![opaque(4, 5, 6), opaque(7, 8, 9)],
        })
        .await
        .unwrap();
        sink.write(&CaptureResult {
            predominant: opaque(10, 11, 12),
            zone_colors: vec![],
        })
        .await
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            serde_json::json!({
                "predominant": [1, 2, 3],
                "zoneCount": 2,
                "zones": [4, 5, 6, 7, 8, 9],
            })
        );
        assert_eq!(lines[1]["zoneCount"], 0);
        assert!(lines[1].get("timestamp").is_none());
    }

    #[tokio::test]
    async fn timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colors.jsonl");

        let mut sink = FileSink::new(&path, true).unwrap();
        sink.write(&CaptureResult {
            predominant: opaque(1, 2, 3),
            zone_colors: vec![],
        })
        .await
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert!(line["timestamp"].is_string());
        assert!(line["elapsedMs"].is_u64());
    }
}
