use std::time::{Duration, Instant};

/// Decides which arriving frames get processed to honor a target frame rate
///
/// A frame is processed only if at least one interval has elapsed since the last processed
/// frame. Frames arriving sooner are dropped, never deferred.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the target interval, the schedule restarts with the next frame
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
        self.last = None;
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Returns `true` if a frame arriving at `now` should be processed
    pub fn accept(&mut self, now: Instant) -> bool {
        let last = match self.last {
            Some(last) => last,
            None => {
                self.last = Some(now);
                return true;
            }
        };

        if now.saturating_duration_since(last) < self.interval {
            return false;
        }

        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulate(interval: Duration, spacing: Duration, frames: u32) -> u32 {
        let mut throttle = FrameThrottle::new(interval);
        let start = Instant::now();

        (0..frames)
            .filter(|&i| throttle.accept(start + spacing * i))
            .count() as u32
    }

    #[test]
    fn first_frame_is_accepted() {
        let mut throttle = FrameThrottle::new(Duration::from_millis(33));
        let now = Instant::now();

        assert!(throttle.accept(now));
        assert!(!throttle.accept(now));
        assert!(!throttle.accept(now + Duration::from_millis(32)));
        assert!(throttle.accept(now + Duration::from_millis(33)));
    }

    #[test]
    fn rate_matches_target() {
        // 1ms arrivals over 10s at 30 fps
        let interval = Duration::from_millis(33);
        let spacing = Duration::from_millis(1);
        let frames = 10_000;
        let ticks = simulate(interval, spacing, frames);

        let elapsed = spacing * (frames - 1);
        let expected = (elapsed.as_secs_f64() / interval.as_secs_f64()) as i64;
        assert!(
            (ticks as i64 - expected).abs() <= 1,
            "{} ticks, expected {}",
            ticks,
            expected
        );
    }

    #[test]
    fn odd_arrival_spacing() {
        // 7ms arrivals at 60 fps: the first arrival at least one interval later wins
        let interval = Duration::from_secs(1) / 60;
        let spacing = Duration::from_millis(7);
        let frames = 5000;
        let ticks = simulate(interval, spacing, frames);

        let elapsed = spacing * (frames - 1);
        let effective = spacing * 3;
        let expected = (elapsed.as_secs_f64() / effective.as_secs_f64()) as i64;
        assert!(
            (ticks as i64 - expected).abs() <= 1,
            "{} ticks, expected {}",
            ticks,
            expected
        );
        assert!(ticks as f64 <= elapsed.as_secs_f64() / interval.as_secs_f64() + 1.);
    }

    #[test]
    fn processed_frames_are_an_interval_apart() {
        let interval = Duration::from_millis(10);
        let mut throttle = FrameThrottle::new(interval);
        let start = Instant::now();

        assert!(throttle.accept(start));
        assert!(throttle.accept(start + Duration::from_millis(19)));
        assert!(!throttle.accept(start + Duration::from_millis(21)));
        assert!(!throttle.accept(start + Duration::from_millis(28)));
        assert!(throttle.accept(start + Duration::from_millis(29)));

        // Irregular arrivals never yield two processed frames closer than the interval
        let mut last: Option<Instant> = None;
        let mut throttle = FrameThrottle::new(interval);
        for i in 0..2000u64 {
            let now = start + Duration::from_micros(i * 3700 + (i * 7) % 3000);
            if throttle.accept(now) {
                if let Some(last) = last {
                    assert!(now - last >= interval);
                }
                last = Some(now);
            }
        }
    }

    #[test]
    fn slow_source_is_never_throttled() {
        let interval = Duration::from_millis(10);
        assert_eq!(simulate(interval, Duration::from_millis(25), 100), 100);
    }

    #[test]
    fn resync_after_stall() {
        let interval = Duration::from_millis(10);
        let mut throttle = FrameThrottle::new(interval);
        let start = Instant::now();

        assert!(throttle.accept(start));

        // No burst of catch-up frames after a long pause
        let resumed = start + Duration::from_secs(1);
        assert!(throttle.accept(resumed));
        assert!(!throttle.accept(resumed + Duration::from_millis(1)));
        assert!(!throttle.accept(resumed + Duration::from_millis(9)));
        assert!(throttle.accept(resumed + Duration::from_millis(10)));
    }

    #[test]
    fn set_interval_restarts_schedule() {
        let mut throttle = FrameThrottle::new(Duration::from_millis(100));
        let now = Instant::now();

        assert!(throttle.accept(now));
        throttle.set_interval(Duration::from_millis(10));
        assert!(throttle.accept(now + Duration::from_millis(1)));
        assert_eq!(throttle.interval(), Duration::from_millis(10));
    }
}
