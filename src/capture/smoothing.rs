use crate::{color, models::Color};

/// Per-zone exponential moving average of zone colors
///
/// The history is owned by the smoother: mutating a returned vector has no effect on the
/// next update.
#[derive(Debug, Default)]
pub struct ZoneColorSmoother {
    previous_colors: Vec<Color>,
    initialized: bool,
}

impl ZoneColorSmoother {
    pub fn new(zone_count: usize) -> Self {
        let mut smoother = Self::default();
        smoother.initialize(zone_count);
        smoother
    }

    /// Reset the history to `zone_count` black entries, the next update is not filtered
    pub fn initialize(&mut self, zone_count: usize) {
        self.previous_colors.clear();
        self.previous_colors.resize(zone_count, color::black());
        self.initialized = false;
    }

    pub fn smooth_colors(&mut self, current_colors: &[Color], alpha: f32, enabled: bool) -> Vec<Color> {
        if !enabled || !self.initialized {
            // Pass-through, but keep the history for when smoothing gets enabled
            self.previous_colors.clear();
            self.previous_colors.extend_from_slice(current_colors);
            self.initialized = true;
            return current_colors.to_vec();
        }

        if self.previous_colors.len() != current_colors.len() {
            debug!(
                previous = %self.previous_colors.len(),
                current = %current_colors.len(),
                "zone count changed, resetting smoothing history"
            );

            self.initialize(current_colors.len());
            self.previous_colors.copy_from_slice(current_colors);
            self.initialized = true;
            return current_colors.to_vec();
        }

        let alpha = alpha.clamp(0., 1.);

        for (prev, curr) in self.previous_colors.iter_mut().zip(current_colors.iter()) {
            *prev = color::opaque(
                Self::ema(prev.red, curr.red, alpha),
                Self::ema(prev.green, curr.green, alpha),
                Self::ema(prev.blue, curr.blue, alpha),
            );
        }

        self.previous_colors.clone()
    }

    /// One EMA step, rounded to the nearest level
    ///
    /// Truncating instead would leave a channel stuck one level below its target (0 to 255
    /// at alpha 0.5 would give 127 and never reach 255).
    #[inline]
    fn ema(prev: u8, curr: u8, alpha: f32) -> u8 {
        let prev = prev as f32;
        (prev + alpha * (curr as f32 - prev)).round().clamp(0., 255.) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::opaque;

    fn colors() -> Vec<Color> {
        vec![opaque(255, 0, 0), opaque(10, 20, 30), opaque(0, 0, 255)]
    }

    #[test]
    fn first_update_is_not_filtered() {
        let mut smoother = ZoneColorSmoother::new(3);
        assert_eq!(smoother.smooth_colors(&colors(), 0., true), colors());
    }

    #[test]
    fn alpha_one_tracks_instantly() {
        let mut smoother = ZoneColorSmoother::new(3);
        smoother.smooth_colors(&colors(), 1., true);

        let next = vec![opaque(1, 2, 3), opaque(250, 251, 252), opaque(0, 0, 0)];
        assert_eq!(smoother.smooth_colors(&next, 1., true), next);
        assert_eq!(smoother.smooth_colors(&colors(), 1., true), colors());
    }

    #[test]
    fn alpha_zero_holds_history() {
        let mut smoother = ZoneColorSmoother::new(3);
        smoother.smooth_colors(&colors(), 0.5, true);

        let next = vec![opaque(0, 0, 0); 3];
        assert_eq!(smoother.smooth_colors(&next, 0., true), colors());
    }

    #[test]
    fn moving_average() {
        let mut smoother = ZoneColorSmoother::new(1);
        smoother.smooth_colors(&[opaque(0, 100, 200)], 0.5, true);

        assert_eq!(
            smoother.smooth_colors(&[opaque(100, 100, 0)], 0.5, true),
            vec![opaque(50, 100, 100)]
        );
        assert_eq!(
            smoother.smooth_colors(&[opaque(100, 100, 0)], 0.5, true),
            vec![opaque(75, 100, 50)]
        );
    }

    #[test]
    fn rounding_reaches_target() {
        let mut smoother = ZoneColorSmoother::new(1);
        smoother.smooth_colors(&[opaque(0, 0, 0)], 0.5, true);

        let steps: Vec<u8> = (0..9)
            .map(|_| smoother.smooth_colors(&[opaque(255, 0, 0)], 0.5, true)[0].red)
            .collect();

        assert_eq!(steps, vec![128, 192, 224, 240, 248, 252, 254, 255, 255]);
    }

    #[test]
    fn identical_input_is_stable() {
        let mut smoother = ZoneColorSmoother::new(3);

        for _ in 0..10 {
            assert_eq!(smoother.smooth_colors(&colors(), 0.3, true), colors());
        }
    }

    #[test]
    fn disabled_passes_through_and_records_history() {
        let mut smoother = ZoneColorSmoother::new(1);
        smoother.smooth_colors(&[opaque(0, 0, 0)], 0.5, true);

        assert_eq!(
            smoother.smooth_colors(&[opaque(200, 200, 200)], 0.5, false),
            vec![opaque(200, 200, 200)]
        );

        // History was updated while disabled
        assert_eq!(
            smoother.smooth_colors(&[opaque(100, 100, 100)], 0.5, true),
            vec![opaque(150, 150, 150)]
        );
    }

    #[test]
    fn length_change_resets_history() {
        let mut smoother = ZoneColorSmoother::new(3);
        smoother.smooth_colors(&colors(), 0.5, true);

        let shorter = vec![opaque(7, 7, 7)];
        assert_eq!(smoother.smooth_colors(&shorter, 0.5, true), shorter);

        // Filtering resumes with the new history
        assert_eq!(
            smoother.smooth_colors(&[opaque(9, 9, 9)], 0.5, true),
            vec![opaque(8, 8, 8)]
        );
    }

    #[test]
    fn returned_vector_is_detached() {
        let mut smoother = ZoneColorSmoother::new(1);
        let mut first = smoother.smooth_colors(&[opaque(0, 0, 0)], 0.5, true);
        first[0] = opaque(255, 255, 255);

        assert_eq!(
            smoother.smooth_colors(&[opaque(0, 0, 0)], 0.5, true),
            vec![opaque(0, 0, 0)]
        );
    }
}
