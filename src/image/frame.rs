use thiserror::Error;

use crate::models::Color;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid data ({data} bytes) for the given dimensions ({width} x {height}, {row_pitch} bytes per row)")]
    InvalidData {
        data: usize,
        width: u32,
        height: u32,
        row_pitch: u32,
    },
    #[error("row pitch {row_pitch} is smaller than a row of {width} pixels")]
    InvalidRowPitch { row_pitch: u32, width: u32 },
    #[error("empty frame")]
    Empty,
}

/// Byte order of a 32-bit pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Native desktop surface order
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Read the red, green and blue channels from a pixel in this format
    #[inline]
    pub fn rgb(self, pixel: &[u8]) -> (u8, u8, u8) {
        match self {
            Self::Bgra8 => (pixel[2], pixel[1], pixel[0]),
            Self::Rgba8 => (pixel[0], pixel[1], pixel[2]),
        }
    }

    #[inline]
    fn write(self, color: Color, pixel: &mut [u8]) {
        let (r, g, b, a) = color.into_components();
        let bytes = match self {
            Self::Bgra8 => [b, g, r, a],
            Self::Rgba8 => [r, g, b, a],
        };

        pixel.copy_from_slice(&bytes);
    }
}

/// A captured frame, or a CPU-readable staging copy of one
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    row_pitch: u32,
    format: PixelFormat,
    sequence: u64,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("Frame");
        f.field("width", &self.width);
        f.field("height", &self.height);
        f.field("row_pitch", &self.row_pitch);
        f.field("format", &self.format);
        f.field("sequence", &self.sequence);

        if self.data.len() > 32 {
            f.field("data", &format!("[{} bytes]", self.data.len()));
        } else {
            f.field("data", &self.data);
        }

        f.finish()
    }
}

impl Frame {
    /// Create a frame from tightly packed pixel rows
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self, FrameError> {
        Self::with_row_pitch(data, width, height, width * PixelFormat::BYTES_PER_PIXEL, format)
    }

    /// Create a frame whose rows are `row_pitch` bytes apart
    pub fn with_row_pitch(
        data: Vec<u8>,
        width: u32,
        height: u32,
        row_pitch: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }

        if row_pitch < width * PixelFormat::BYTES_PER_PIXEL {
            return Err(FrameError::InvalidRowPitch { row_pitch, width });
        }

        // The last row does not need its padding
        let expected = (height as usize - 1) * row_pitch as usize
            + (width * PixelFormat::BYTES_PER_PIXEL) as usize;

        if data.len() < expected {
            return Err(FrameError::InvalidData {
                data: data.len(),
                width,
                height,
                row_pitch,
            });
        }

        Ok(Self {
            data,
            width,
            height,
            row_pitch,
            format,
            sequence: 0,
        })
    }

    /// Build a frame by evaluating `f` at every pixel
    pub fn from_fn(
        width: u32,
        height: u32,
        format: PixelFormat,
        mut f: impl FnMut(u32, u32) -> Color,
    ) -> Result<Self, FrameError> {
        let mut data = vec![0u8; (width * height * PixelFormat::BYTES_PER_PIXEL) as usize];

        for (i, pixel) in data
            .chunks_exact_mut(PixelFormat::BYTES_PER_PIXEL as usize)
            .enumerate()
        {
            let x = i as u32 % width;
            let y = i as u32 / width;
            format.write(f(x, y), pixel);
        }

        Self::new(data, width, height, format)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number assigned by the capture source, increasing with every delivered frame
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_pitch as usize;
        &self.data[start..start + (self.width * PixelFormat::BYTES_PER_PIXEL) as usize]
    }

    /// Red, green and blue channels at the given location
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` is out of bounds.
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        assert!(x < self.width && y < self.height);

        let offset = y as usize * self.row_pitch as usize + (x * PixelFormat::BYTES_PER_PIXEL) as usize;
        self.format
            .rgb(&self.data[offset..offset + PixelFormat::BYTES_PER_PIXEL as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::opaque;

    #[test]
    fn reject_short_data() {
        assert_eq!(
            Frame::new(vec![0; 15], 2, 2, PixelFormat::Bgra8).unwrap_err(),
            FrameError::InvalidData {
                data: 15,
                width: 2,
                height: 2,
                row_pitch: 8
            }
        );
        assert_eq!(
            Frame::new(vec![], 0, 4, PixelFormat::Bgra8).unwrap_err(),
            FrameError::Empty
        );
        assert!(matches!(
            Frame::with_row_pitch(vec![0; 64], 4, 2, 8, PixelFormat::Rgba8),
            Err(FrameError::InvalidRowPitch { .. })
        ));
    }

    #[test]
    fn channel_order() {
        let bgra = Frame::new(vec![10, 20, 30, 255], 1, 1, PixelFormat::Bgra8).unwrap();
        let rgba = Frame::new(vec![10, 20, 30, 255], 1, 1, PixelFormat::Rgba8).unwrap();

        assert_eq!(bgra.rgb_at(0, 0), (30, 20, 10));
        assert_eq!(rgba.rgb_at(0, 0), (10, 20, 30));
    }

    #[test]
    fn padded_rows() {
        // 2x2 frame with 4 padding bytes per row, last row unpadded
        let data = vec![
            1, 2, 3, 255, 4, 5, 6, 255, 0, 0, 0, 0, //
            7, 8, 9, 255, 10, 11, 12, 255,
        ];
        let frame = Frame::with_row_pitch(data, 2, 2, 12, PixelFormat::Rgba8).unwrap();

        assert_eq!(frame.rgb_at(1, 0), (4, 5, 6));
        assert_eq!(frame.rgb_at(0, 1), (7, 8, 9));
        assert_eq!(frame.row(1), &[7, 8, 9, 255, 10, 11, 12, 255]);
    }

    #[test]
    fn from_fn_writes_native_order() {
        let frame = Frame::from_fn(3, 2, PixelFormat::Bgra8, |x, _| opaque(x as u8, 0, 200)).unwrap();

        assert_eq!(&frame.data()[4..8], &[200, 0, 1, 255]);
        assert_eq!(frame.rgb_at(2, 1), (2, 0, 200));
        assert_eq!(frame.num_pixels(), 6);
    }
}
