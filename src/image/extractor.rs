use super::Frame;
use crate::{
    capture::ComputeBackend,
    color,
    models::{Color, Zone},
};

/// Only every `SAMPLE_STRIDE`-th pixel of each row and column is sampled
pub const SAMPLE_STRIDE: usize = 4;

/// Pixel-space bounds of a zone, end-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ZoneBounds {
    start_x: u32,
    start_y: u32,
    end_x: u32,
    end_y: u32,
}

impl ZoneBounds {
    fn new(zone: &Zone, width: u32, height: u32) -> Self {
        let fwidth = width as f32;
        let fheight = height as f32;

        // Saturating float casts: negative values become 0
        let start_x = (zone.x * fwidth) as u32;
        let start_y = (zone.y * fheight) as u32;
        let end_x = ((zone.x + zone.width) * fwidth) as u32;
        let end_y = ((zone.y + zone.height) * fheight) as u32;

        Self {
            start_x: start_x.min(width.saturating_sub(1)),
            start_y: start_y.min(height.saturating_sub(1)),
            end_x: end_x.min(width),
            end_y: end_y.min(height),
        }
    }
}

/// Averages the pixels of each zone on a CPU-readable copy of the frame
#[derive(Debug, Default)]
pub struct ZoneColorExtractor {
    notified_failure: bool,
}

impl ZoneColorExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample one color per zone, index-aligned with `zones`
    ///
    /// Returns an empty vector if the staging copy could not be obtained: this means
    /// extraction is unavailable for this frame, not that no zones are configured.
    pub async fn extract_zone_colors(
        &mut self,
        backend: &mut dyn ComputeBackend,
        frame: &Frame,
        zones: &[Zone],
        screen_width: u32,
        screen_height: u32,
    ) -> Vec<Color> {
        let staging = match backend.stage(frame).await {
            Ok(staging) => {
                self.notified_failure = false;
                staging
            }
            Err(error) => {
                if !self.notified_failure {
                    self.notified_failure = true;
                    warn!(error = %error, "staging copy failed, skipping zone extraction");
                }

                return Vec::new();
            }
        };

        // The staging copy is released when it goes out of scope
        Self::sample_zones(&staging, zones, screen_width, screen_height)
    }

    /// Average every zone over a readable frame
    pub fn sample_zones(frame: &Frame, zones: &[Zone], screen_width: u32, screen_height: u32) -> Vec<Color> {
        // Never read outside the mapped frame, even if the caller's screen size disagrees
        let width = screen_width.min(frame.width());
        let height = screen_height.min(frame.height());

        zones
            .iter()
            .map(|zone| Self::sample_zone(frame, ZoneBounds::new(zone, width, height)))
            .collect()
    }

    fn sample_zone(frame: &Frame, bounds: ZoneBounds) -> Color {
        let mut r_acc = 0u64;
        let mut g_acc = 0u64;
        let mut b_acc = 0u64;
        let mut cnt = 0u64;

        let format = frame.format();
        let bpp = super::PixelFormat::BYTES_PER_PIXEL as usize;

        for y in (bounds.start_y..bounds.end_y).step_by(SAMPLE_STRIDE) {
            let row = frame.row(y);

            for x in (bounds.start_x..bounds.end_x).step_by(SAMPLE_STRIDE) {
                let offset = x as usize * bpp;
                let (r, g, b) = format.rgb(&row[offset..offset + bpp]);

                r_acc += r as u64;
                g_acc += g as u64;
                b_acc += b as u64;
                cnt += 1;
            }
        }

        if cnt == 0 {
            // Degenerate zone
            return color::black();
        }

        color::opaque(
            (r_acc / cnt) as u8,
            (g_acc / cnt) as u8,
            (b_acc / cnt) as u8,
        )
    }
}
