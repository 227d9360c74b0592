//! Color helpers

use crate::models::Color;

/// Fully opaque color from 8-bit channels
pub fn opaque(red: u8, green: u8, blue: u8) -> Color {
    Color::new(red, green, blue, u8::MAX)
}

/// Fallback color for zones that sampled no pixels
pub fn black() -> Color {
    opaque(0, 0, 0)
}

/// Flatten colors into `[r, g, b, r, g, b, ...]`
pub fn to_flat_rgb(colors: &[Color]) -> Vec<u8> {
    colors
        .iter()
        .flat_map(|c| [c.red, c.green, c.blue])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_encoding() {
        assert_eq!(
            to_flat_rgb(&[opaque(1, 2, 3), black(), opaque(255, 128, 0)]),
            vec![1, 2, 3, 0, 0, 0, 255, 128, 0]
        );
        assert!(to_flat_rgb(&[]).is_empty());
    }
}
