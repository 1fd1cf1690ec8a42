//! The value carried through the sampling pipeline

use core::fmt;

/// One combined reading of the pulse oximeter and the thermometer.
///
/// Readings are `Copy` and travel by value: the store, the queue and the
/// display each hold their own copy, never a reference to the sampler's.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    /// Heart rate in beats per minute
    pub pulse_rate: i32,
    /// Blood oxygen saturation in percent
    pub spo2: i32,
    /// Body temperature in degrees Fahrenheit
    pub temperature_f: f32,
}

impl SensorReading {
    /// All-zero reading, what the store holds before the first sample.
    pub const ZERO: Self = Self::new(0, 0, 0.0);

    pub const fn new(pulse_rate: i32, spo2: i32, temperature_f: f32) -> Self {
        Self {
            pulse_rate,
            spo2,
            temperature_f,
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PulseRate: {} /Min, SpO2: {} %, Temperature: {:.2} *F",
            self.pulse_rate, self.spo2, self.temperature_f
        )
    }
}

/// Convert a Celsius temperature to Fahrenheit (`F = C * 9 / 5 + 32`).
#[inline]
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freezing_point() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
    }

    #[test]
    fn test_boiling_point() {
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    }

    #[test]
    fn test_body_temperature() {
        let f = celsius_to_fahrenheit(37.0);
        assert!((f - 98.6).abs() < 1e-4, "37 C converted to {f}");
    }

    #[test]
    fn test_negative_forty_is_the_same_in_both_scales() {
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
    }

    #[test]
    fn test_display_matches_serial_log_layout() {
        let reading = SensorReading::new(72, 97, 98.6);
        assert_eq!(
            format!("{reading}"),
            "PulseRate: 72 /Min, SpO2: 97 %, Temperature: 98.60 *F"
        );
    }
}
