//! Frame display durations for animated sources

/// Used when a frame carries no delay or an unusable one
pub const DEFAULT_FRAME_DURATION: f64 = 0.100;

/// Delays at or below this are treated as broken encoder output
pub const MIN_FRAME_DURATION: f64 = 0.011;

/// Per-frame timing metadata as reported by the container, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameProperties {
    pub unclamped_delay: Option<f64>,
    pub delay: Option<f64>,
}

/// Display duration of one frame of a multi-frame source.
///
/// The unclamped delay wins over the plain delay. Near-zero delays would play
/// back far too fast, so anything not above [`MIN_FRAME_DURATION`] falls back
/// to [`DEFAULT_FRAME_DURATION`].
pub fn frame_duration(properties: &FrameProperties) -> f64 {
    match properties.unclamped_delay.or(properties.delay) {
        Some(delay) if delay > MIN_FRAME_DURATION => delay,
        _ => DEFAULT_FRAME_DURATION,
    }
}

/// Duration of a frame inside a source of `frame_count` frames. A single
/// frame is a still image and displays forever.
pub fn duration_for(frame_count: usize, properties: &FrameProperties) -> f64 {
    if frame_count == 1 {
        f64::INFINITY
    } else {
        frame_duration(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(seconds: f64) -> FrameProperties {
        FrameProperties {
            unclamped_delay: None,
            delay: Some(seconds),
        }
    }

    #[test]
    fn near_zero_delay_uses_default() {
        assert_eq!(frame_duration(&delay(0.005)), DEFAULT_FRAME_DURATION);
        assert_eq!(frame_duration(&delay(0.011)), DEFAULT_FRAME_DURATION);
        assert_eq!(frame_duration(&delay(0.0)), DEFAULT_FRAME_DURATION);
        assert_eq!(frame_duration(&delay(-1.0)), DEFAULT_FRAME_DURATION);
    }

    #[test]
    fn valid_delay_is_kept() {
        assert_eq!(frame_duration(&delay(0.05)), 0.05);
        assert_eq!(frame_duration(&delay(0.012)), 0.012);
    }

    #[test]
    fn unclamped_delay_takes_precedence() {
        let props = FrameProperties {
            unclamped_delay: Some(0.02),
            delay: Some(0.1),
        };
        assert_eq!(frame_duration(&props), 0.02);

        // a broken unclamped delay is not rescued by the plain one
        let props = FrameProperties {
            unclamped_delay: Some(0.0),
            delay: Some(0.5),
        };
        assert_eq!(frame_duration(&props), DEFAULT_FRAME_DURATION);
    }

    #[test]
    fn missing_delay_uses_default() {
        assert_eq!(
            frame_duration(&FrameProperties::default()),
            DEFAULT_FRAME_DURATION
        );
    }

    #[test]
    fn single_frame_is_infinite() {
        assert_eq!(duration_for(1, &delay(0.05)), f64::INFINITY);
        assert_eq!(duration_for(1, &FrameProperties::default()), f64::INFINITY);
        assert_eq!(duration_for(2, &delay(0.05)), 0.05);
    }
}
